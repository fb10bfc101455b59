//! NEAT genome: an evolvable directed graph of nodes and connection genes.
//!
//! A [`Dna`] exclusively owns its nodes (keyed by population-wide [`NodeId`])
//! and its genes (keyed by [`Innovation`]). Structural mutations borrow the
//! population's [`InnovationRegistry`] so that equal structural changes in
//! different genomes get equal innovation numbers.
//!
//! Invariants kept by every operation here:
//! - every gene's endpoints exist as nodes of the same genome
//! - no gene targets an input node
//! - no two genes share a `(source, target)` pair

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::PopulationConfig;
use crate::gene::{ConnectionGene, Innovation, NodeGene, NodeId, NodeRole};
use crate::innovation::InnovationRegistry;
use crate::phenotype::Phenotype;
use crate::snapshot;

/// Identifier of a genome within its population.
pub type GenomeId = u32;

/// Crossover needs both parents to carry a reported fitness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CrossoverError {
    #[error("crossover parent {0} has no reported fitness")]
    Unevaluated(GenomeId),
}

/// Gene-by-gene comparison of two genomes, aligned by innovation number.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GeneAlignment {
    /// Innovations present in both genomes.
    pub matching: usize,
    /// Innovations present in one genome, inside the shared innovation range.
    pub disjoint: usize,
    /// Innovations beyond the lower genome's highest innovation.
    pub excess: usize,
    /// Sum of absolute weight differences over matching genes.
    pub weight_difference: f64,
}

impl GeneAlignment {
    /// Mean absolute weight difference over matching genes (0 when none match).
    #[must_use]
    pub fn average_weight_difference(&self) -> f64 {
        if self.matching == 0 {
            0.0
        } else {
            self.weight_difference / self.matching as f64
        }
    }

    /// No disjoint and no excess genes: same structural class.
    #[must_use]
    pub fn structurally_identical(&self) -> bool {
        self.disjoint == 0 && self.excess == 0
    }
}

/// A NEAT genome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dna {
    /// Population-assigned identifier.
    pub id: GenomeId,
    /// Fitness reported for this genome's phenotype, `None` until evaluated.
    pub fitness: Option<f64>,
    nodes: BTreeMap<NodeId, NodeGene>,
    genes: BTreeMap<Innovation, ConnectionGene>,
    highest: Innovation,
}

/// Uniform weight in `[-1, 1]`.
pub(crate) fn random_weight<R: Rng>(rng: &mut R) -> f64 {
    rng.random_range(-1.0..=1.0)
}

impl Dna {
    /// A genome with no nodes and no genes.
    #[must_use]
    pub fn empty(id: GenomeId) -> Self {
        Self {
            id,
            fitness: None,
            nodes: BTreeMap::new(),
            genes: BTreeMap::new(),
            highest: 0,
        }
    }

    /// A genome with every input fully connected to every output.
    ///
    /// Node ids follow the population layout: inputs `1..=num_inputs`, then
    /// outputs. The population hands those ids out before any genome exists.
    pub fn initialized<R: Rng>(
        id: GenomeId,
        num_inputs: usize,
        num_outputs: usize,
        registry: &mut InnovationRegistry,
        rng: &mut R,
    ) -> Self {
        let mut dna = Self::empty(id);
        dna.initialize(num_inputs, num_outputs, registry, rng);
        dna
    }

    /// Add the input and output nodes and connect every input to every output
    /// with a random weight in `[-1, 1]`.
    pub fn initialize<R: Rng>(
        &mut self,
        num_inputs: usize,
        num_outputs: usize,
        registry: &mut InnovationRegistry,
        rng: &mut R,
    ) {
        let inputs: Vec<NodeId> = (1..=num_inputs).map(|i| NodeId(i as u32)).collect();
        let outputs: Vec<NodeId> = (num_inputs + 1..=num_inputs + num_outputs)
            .map(|i| NodeId(i as u32))
            .collect();

        for &id in &inputs {
            self.insert_node(NodeGene::input(id));
        }
        for &id in &outputs {
            self.insert_node(NodeGene::output(id));
        }

        for &source in &inputs {
            for &target in &outputs {
                let innovation = registry.innovation(source, target);
                let weight = random_weight(rng);
                self.insert_gene(ConnectionGene::new(innovation, source, target, weight));
            }
        }
    }

    /// Insert a copy of `node`. Existing nodes with the same id are kept.
    pub(crate) fn insert_node(&mut self, node: NodeGene) {
        self.nodes.entry(node.id).or_insert(node);
    }

    /// Insert a copy of `gene`, tracking the highest innovation.
    pub(crate) fn insert_gene(&mut self, gene: ConnectionGene) {
        self.highest = self.highest.max(gene.innovation);
        self.genes.insert(gene.innovation, gene);
    }

    /// Copy `gene` in along with any endpoint node not yet present, taken from `parent`.
    fn adopt(&mut self, gene: ConnectionGene, parent: &Dna) {
        for endpoint in [gene.source, gene.target] {
            if !self.nodes.contains_key(&endpoint) {
                if let Some(node) = parent.nodes.get(&endpoint) {
                    self.insert_node(*node);
                }
            }
        }
        self.insert_gene(gene);
    }

    // --- Queries ---

    #[must_use]
    pub fn num_genes(&self) -> usize {
        self.genes.len()
    }

    #[must_use]
    pub fn num_enabled_genes(&self) -> usize {
        self.genes.values().filter(|g| g.enabled).count()
    }

    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes with the given role.
    #[must_use]
    pub fn count_role(&self, role: NodeRole) -> usize {
        self.nodes.values().filter(|n| n.role == role).count()
    }

    /// Highest innovation number carried, 0 for a genome without genes.
    #[must_use]
    pub fn highest_innovation(&self) -> Innovation {
        self.highest
    }

    #[must_use]
    pub fn gene(&self, innovation: Innovation) -> Option<&ConnectionGene> {
        self.genes.get(&innovation)
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&NodeGene> {
        self.nodes.get(&id)
    }

    /// Genes in ascending innovation order.
    pub fn genes(&self) -> impl Iterator<Item = &ConnectionGene> + '_ {
        self.genes.values()
    }

    /// Nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeGene> + '_ {
        self.nodes.values()
    }

    /// Innovation numbers in ascending order.
    pub fn innovations(&self) -> impl Iterator<Item = Innovation> + '_ {
        self.genes.keys().copied()
    }

    /// Whether some gene links `source -> target`, enabled or not.
    #[must_use]
    pub fn has_connection(&self, source: NodeId, target: NodeId) -> bool {
        self.genes
            .values()
            .any(|g| g.source == source && g.target == target)
    }

    /// Theoretical maximum gene count: links may start anywhere but never end
    /// at an input, so `(inputs + outputs + hidden) * (outputs + hidden)`.
    #[must_use]
    pub fn max_genes(&self) -> usize {
        let inputs = self.count_role(NodeRole::Input);
        let non_inputs = self.nodes.len() - inputs;
        self.nodes.len() * non_inputs
    }

    /// Align this genome against `other` by innovation number.
    #[must_use]
    pub fn align(&self, other: &Dna) -> GeneAlignment {
        let boundary = self.highest.min(other.highest);
        let mut alignment = GeneAlignment::default();

        for (innovation, gene) in &self.genes {
            match other.genes.get(innovation) {
                Some(theirs) => {
                    alignment.matching += 1;
                    alignment.weight_difference += (gene.weight - theirs.weight).abs();
                }
                None if *innovation > boundary => alignment.excess += 1,
                None => alignment.disjoint += 1,
            }
        }
        for innovation in other.genes.keys() {
            if self.genes.contains_key(innovation) {
                continue;
            }
            if *innovation > boundary {
                alignment.excess += 1;
            } else {
                alignment.disjoint += 1;
            }
        }

        alignment
    }

    // --- Mutation ---

    /// Split a random enabled gene with a new hidden node.
    ///
    /// The split gene is disabled and replaced by `source -> new` (weight 1.0)
    /// and `new -> target` (the original weight). No-op when every gene is disabled.
    pub fn mutate_add_node<R: Rng>(&mut self, registry: &mut InnovationRegistry, rng: &mut R) {
        let enabled: Vec<Innovation> = self
            .genes
            .values()
            .filter(|g| g.enabled)
            .map(|g| g.innovation)
            .collect();
        if enabled.is_empty() {
            return;
        }

        let chosen = enabled[rng.random_range(0..enabled.len())];
        let Some(split) = self.genes.get_mut(&chosen) else {
            return;
        };
        split.enabled = false;
        let (source, target, weight) = (split.source, split.target, split.weight);

        let hidden = registry.next_node_id();
        self.insert_node(NodeGene::hidden(hidden));

        let early = registry.innovation(source, hidden);
        self.insert_gene(ConnectionGene::new(early, source, hidden, 1.0));
        let late = registry.innovation(hidden, target);
        self.insert_gene(ConnectionGene::new(late, hidden, target, weight));

        debug!(
            genome = self.id,
            split = chosen,
            early,
            late,
            node = %hidden,
            "node mutation"
        );
    }

    /// Add a random new link whose target is not an input.
    ///
    /// Picks uniformly among all missing `(source, target)` pairs. No-op once
    /// the genome holds [`max_genes`](Self::max_genes) genes.
    pub fn mutate_add_link<R: Rng>(&mut self, registry: &mut InnovationRegistry, rng: &mut R) {
        if self.genes.len() >= self.max_genes() {
            return;
        }

        let existing: HashSet<(NodeId, NodeId)> =
            self.genes.values().map(|g| (g.source, g.target)).collect();
        let candidates: Vec<(NodeId, NodeId)> = self
            .nodes
            .keys()
            .flat_map(|&source| {
                self.nodes
                    .values()
                    .filter(|n| n.role != NodeRole::Input)
                    .map(move |n| (source, n.id))
            })
            .filter(|pair| !existing.contains(pair))
            .collect();
        if candidates.is_empty() {
            return;
        }

        let (source, target) = candidates[rng.random_range(0..candidates.len())];
        let innovation = registry.innovation(source, target);
        let weight = random_weight(rng);
        self.insert_gene(ConnectionGene::new(innovation, source, target, weight));
        debug!(genome = self.id, innovation, %source, %target, "link mutation");
    }

    /// Replace each weight with a fresh value in `[-1, 1]` with probability
    /// `per_weight_rate`, independently per gene.
    pub fn mutate_weights<R: Rng>(&mut self, per_weight_rate: f64, rng: &mut R) {
        for gene in self.genes.values_mut() {
            if rng.random_bool(per_weight_rate) {
                gene.weight = random_weight(rng);
            }
        }
    }

    /// Disable one uniformly random gene, possibly one already disabled.
    pub fn mutate_disable_link<R: Rng>(&mut self, rng: &mut R) {
        if self.genes.is_empty() {
            return;
        }
        let index = rng.random_range(0..self.genes.len());
        if let Some(gene) = self.genes.values_mut().nth(index) {
            gene.enabled = false;
            debug!(genome = self.id, innovation = gene.innovation, "link disable mutation");
        }
    }

    /// Apply each offspring mutation independently, gated by its own rate.
    pub fn mutate_offspring<R: Rng>(
        &mut self,
        config: &PopulationConfig,
        registry: &mut InnovationRegistry,
        rng: &mut R,
    ) {
        if rng.random_bool(config.weight_mutation_rate) {
            self.mutate_weights(config.per_weight_mutation_rate, rng);
        }
        if rng.random_bool(config.link_mutation_rate) {
            self.mutate_add_link(registry, rng);
        }
        if rng.random_bool(config.node_mutation_rate) {
            self.mutate_add_node(registry, rng);
        }
        if rng.random_bool(config.link_disable_rate) {
            self.mutate_disable_link(rng);
        }
    }

    // --- Crossover ---

    /// Recombine two evaluated genomes into a child with id `child_id`.
    ///
    /// The child starts with every input and output node of the fitter parent,
    /// whether or not a gene references it, then walks the fitter parent's
    /// genes in innovation order. Matching genes come
    /// from the fitter parent with probability `inherit_from_higher_fit_rate`,
    /// otherwise from the other one; if either parent has the gene disabled, the
    /// child's copy is disabled with probability `disabled_rate`. Genes only the
    /// fitter parent has are inherited as they are. With equal fitness the other
    /// parent's unmatched genes are inherited as well.
    pub fn crossover<R: Rng>(
        &self,
        other: &Dna,
        child_id: GenomeId,
        config: &PopulationConfig,
        rng: &mut R,
    ) -> Result<Dna, CrossoverError> {
        let mine = self.fitness.ok_or(CrossoverError::Unevaluated(self.id))?;
        let theirs = other.fitness.ok_or(CrossoverError::Unevaluated(other.id))?;

        let (fitter, weaker) = if theirs > mine {
            (other, self)
        } else {
            (self, other)
        };

        let mut child = Dna::empty(child_id);
        // inputs and outputs are fixed per population, linked or not
        for node in fitter.nodes.values().filter(|n| n.role != NodeRole::Hidden) {
            child.insert_node(*node);
        }
        for gene in fitter.genes.values() {
            let inherited = match weaker.genes.get(&gene.innovation) {
                None => gene.clone(),
                Some(counterpart) => {
                    let mut chosen = if rng.random_bool(config.inherit_from_higher_fit_rate) {
                        gene.clone()
                    } else {
                        counterpart.clone()
                    };
                    if !gene.enabled || !counterpart.enabled {
                        chosen.enabled = !rng.random_bool(config.disabled_rate);
                    }
                    chosen
                }
            };
            child.adopt(inherited, fitter);
        }

        if mine == theirs {
            for gene in weaker.genes.values() {
                if !fitter.genes.contains_key(&gene.innovation) {
                    child.adopt(gene.clone(), weaker);
                }
            }
        }

        Ok(child)
    }

    /// Crossover followed by [`mutate_offspring`](Self::mutate_offspring).
    pub fn breed<R: Rng>(
        &self,
        other: &Dna,
        child_id: GenomeId,
        config: &PopulationConfig,
        registry: &mut InnovationRegistry,
        rng: &mut R,
    ) -> Result<Dna, CrossoverError> {
        let mut child = self.crossover(other, child_id, config, rng)?;
        child.mutate_offspring(config, registry, rng);
        Ok(child)
    }

    // --- Phenotype ---

    /// Build a frozen, activatable network from this genome's current topology.
    #[must_use]
    pub fn to_phenotype(&self, sigmoid_coefficient: f64) -> Phenotype {
        Phenotype::build(self.id, self.nodes(), self.genes(), sigmoid_coefficient)
    }
}

impl fmt::Display for Dna {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        snapshot::write_genome(f, self.id, self.nodes(), self.genes())
    }
}
