//! The population protocol.
//!
//! A [`Population`] owns every genome of the current generation plus the
//! innovation registry they share. Collaborators drive it with three calls:
//! [`request_phenotype`](Population::request_phenotype) hands out a network,
//! [`report_fitness`](Population::report_fitness) returns its score, and
//! [`kill`](Population::kill) stops issuance for good. Each genome moves
//! `unevaluated -> issued -> evaluated` exactly once per generation; once the
//! whole generation is evaluated the next request triggers reproduction.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use slotmap::{new_key_type, SlotMap};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, PopulationConfig};
use crate::gene::{ConnectionGene, NodeGene, NodeId};
use crate::genome::{Dna, GenomeId};
use crate::innovation::InnovationRegistry;
use crate::phenotype::Phenotype;
use crate::reproduction::{Breeding, Reproduction, TribeReproduction};

new_key_type! {
    /// Arena key of a genome held by a population.
    pub struct GenomeKey;
}

static NEXT_POPULATION: AtomicU32 = AtomicU32::new(1);

/// Process-unique population identity, stamped on every issued phenotype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PopulationId(u32);

impl PopulationId {
    fn next() -> Self {
        Self(NEXT_POPULATION.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PopulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rejected protocol calls. None of them harm the population.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PopulationError {
    #[error("population was killed: {reason}")]
    Killed { reason: String },

    #[error("requested {requested} phenotypes but only {available} can be issued before outstanding reports arrive")]
    Exhausted { requested: usize, available: usize },

    #[error("genome {genome} is not currently issued")]
    NotIssued { genome: GenomeId },

    #[error("phenotype of genome {genome} was not issued by this population")]
    ForeignPhenotype { genome: GenomeId },
}

/// Summary of one finished generation, recorded before reproduction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationReport {
    /// Generation number, starting at 1.
    pub generation: u32,
    /// Mean raw fitness over the whole generation.
    pub average_fitness: f64,
    /// Highest raw fitness reported in the generation.
    pub best_fitness: f64,
    /// Live species while the generation was evaluated.
    pub species_count: usize,
}

/// A NEAT population.
pub struct Population<S: Reproduction = TribeReproduction> {
    id: PopulationId,
    config: PopulationConfig,
    killed: Option<String>,
    generation: u32,
    next_genome_id: GenomeId,
    registry: InnovationRegistry,
    rng: ChaCha8Rng,
    genomes: SlotMap<GenomeKey, Dna>,
    unevaluated: VecDeque<GenomeKey>,
    issued: HashMap<GenomeId, GenomeKey>,
    evaluated: Vec<GenomeKey>,
    strategy: S,
    history: Vec<GenerationReport>,
}

impl Population<TribeReproduction> {
    /// A population of fully connected random genomes.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when `config` fails validation.
    pub fn new(config: PopulationConfig) -> Result<Self, ConfigError> {
        Self::with_strategy(config, TribeReproduction::new())
    }

    /// A population whose every genome copies the network of `template`.
    ///
    /// Input and output counts are taken from the template. Node ids and
    /// innovations are registered afresh, so the template may come from a
    /// snapshot of any other population.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when `config`, with the template's input and
    /// output counts, fails validation.
    pub fn seeded(config: PopulationConfig, template: &Phenotype) -> Result<Self, ConfigError> {
        Self::seeded_with_strategy(config, template, TribeReproduction::new())
    }
}

impl<S: Reproduction> Population<S> {
    /// A population of fully connected random genomes bred by `strategy`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when `config` fails validation.
    pub fn with_strategy(config: PopulationConfig, strategy: S) -> Result<Self, ConfigError> {
        let mut population = Self::empty(config, strategy)?;
        // inputs and outputs take the first node ids in every genome
        for _ in 0..population.config.num_inputs + population.config.num_outputs {
            population.registry.next_node_id();
        }

        for _ in 0..population.config.population_size {
            let id = population.claim_genome_id();
            let dna = Dna::initialized(
                id,
                population.config.num_inputs,
                population.config.num_outputs,
                &mut population.registry,
                &mut population.rng,
            );
            population.register(dna);
        }
        population.strategy.settle();
        population.log_created();
        Ok(population)
    }

    /// [`seeded`](Population::seeded) with a custom strategy.
    ///
    /// # Errors
    ///
    /// Same as [`seeded`](Population::seeded).
    pub fn seeded_with_strategy(
        mut config: PopulationConfig,
        template: &Phenotype,
        strategy: S,
    ) -> Result<Self, ConfigError> {
        config.num_inputs = template.num_inputs();
        config.num_outputs = template.num_outputs();
        let mut population = Self::empty(config, strategy)?;

        let snapshot = template.snapshot();
        let mut nodes = snapshot.nodes;
        // inputs, then outputs, then hidden nodes; role codes follow that order
        nodes.sort_by_key(|n| (n.role.code(), n.id));
        let mut genes = snapshot.genes;
        genes.sort_by_key(|g| g.innovation);

        let mut remap: HashMap<NodeId, NodeId> = HashMap::with_capacity(nodes.len());
        let mut prototype = Dna::empty(0);
        for node in &nodes {
            let id = population.registry.next_node_id();
            remap.insert(node.id, id);
            prototype.insert_node(NodeGene { id, role: node.role });
        }
        for gene in &genes {
            let (Some(&source), Some(&target)) = (remap.get(&gene.source), remap.get(&gene.target))
            else {
                continue;
            };
            let innovation = population.registry.innovation(source, target);
            prototype.insert_gene(ConnectionGene {
                innovation,
                source,
                target,
                weight: gene.weight,
                enabled: gene.enabled,
            });
        }

        for _ in 0..population.config.population_size {
            let mut dna = prototype.clone();
            dna.id = population.claim_genome_id();
            population.register(dna);
        }
        population.strategy.settle();
        population.log_created();
        Ok(population)
    }

    fn empty(config: PopulationConfig, strategy: S) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };

        Ok(Self {
            id: PopulationId::next(),
            unevaluated: VecDeque::with_capacity(config.population_size),
            issued: HashMap::with_capacity(config.population_size),
            evaluated: Vec::with_capacity(config.population_size),
            config,
            killed: None,
            generation: 1,
            next_genome_id: 1,
            registry: InnovationRegistry::new(),
            rng,
            genomes: SlotMap::with_key(),
            strategy,
            history: Vec::new(),
        })
    }

    fn log_created(&self) {
        info!(
            population = %self.id,
            size = self.config.population_size,
            inputs = self.config.num_inputs,
            outputs = self.config.num_outputs,
            species = self.strategy.group_count(),
            "population created"
        );
    }

    fn claim_genome_id(&mut self) -> GenomeId {
        let id = self.next_genome_id;
        self.next_genome_id += 1;
        id
    }

    /// Add a genome to the current generation as unevaluated.
    fn register(&mut self, dna: Dna) {
        let genome = dna.id;
        let key = self.genomes.insert(dna);
        self.unevaluated.push_back(key);
        self.strategy.assign(key, &self.genomes[key], &self.config);
        debug!(population = %self.id, genome, "genome registered");
    }

    // --- Protocol ---

    /// Hand out the next unevaluated genome's phenotype.
    ///
    /// Advances the generation first when every genome has been evaluated.
    ///
    /// # Errors
    ///
    /// [`PopulationError::Killed`] after [`kill`](Self::kill), and
    /// [`PopulationError::Exhausted`] while the rest of the generation is still
    /// out for evaluation.
    pub fn request_phenotype(&mut self) -> Result<Phenotype, PopulationError> {
        self.ensure_alive()?;
        self.advance_if_complete();
        self.issue().ok_or(PopulationError::Exhausted {
            requested: 1,
            available: 0,
        })
    }

    /// Hand out `count` phenotypes at once, or none at all.
    ///
    /// # Errors
    ///
    /// [`PopulationError::Killed`] after [`kill`](Self::kill), and
    /// [`PopulationError::Exhausted`] when fewer than `count` genomes are
    /// waiting to be issued.
    pub fn request_batch(&mut self, count: usize) -> Result<Vec<Phenotype>, PopulationError> {
        self.ensure_alive()?;
        self.advance_if_complete();
        if count > self.unevaluated.len() {
            return Err(PopulationError::Exhausted {
                requested: count,
                available: self.unevaluated.len(),
            });
        }
        Ok((0..count).filter_map(|_| self.issue()).collect())
    }

    /// Record the fitness of an issued phenotype.
    ///
    /// Reports for phenotypes this population did not issue, or already
    /// reported, are rejected and leave every queue untouched.
    ///
    /// # Errors
    ///
    /// [`PopulationError::ForeignPhenotype`] when another population (or no
    /// population) issued `phenotype`, and [`PopulationError::NotIssued`] when
    /// its genome is not currently out for evaluation.
    pub fn report_fitness(&mut self, phenotype: &Phenotype, fitness: f64) -> Result<(), PopulationError> {
        let genome = phenotype.genome_id();
        if phenotype.origin() != Some(self.id) {
            warn!(population = %self.id, genome, "rejected fitness report for foreign phenotype");
            return Err(PopulationError::ForeignPhenotype { genome });
        }
        let Some(key) = self.issued.remove(&genome) else {
            warn!(population = %self.id, genome, "rejected fitness report for genome not issued");
            return Err(PopulationError::NotIssued { genome });
        };

        if let Some(dna) = self.genomes.get_mut(key) {
            dna.fitness = Some(fitness);
        }
        self.evaluated.push(key);
        debug!(population = %self.id, genome, fitness, "fitness reported");
        Ok(())
    }

    /// Permanently stop issuing phenotypes. Outstanding reports are still accepted.
    pub fn kill(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        info!(population = %self.id, generation = self.generation, %reason, "population killed");
        self.killed = Some(reason);
    }

    fn ensure_alive(&self) -> Result<(), PopulationError> {
        match &self.killed {
            Some(reason) => Err(PopulationError::Killed {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn issue(&mut self) -> Option<Phenotype> {
        let key = self.unevaluated.pop_front()?;
        let dna = self.genomes.get(key)?;
        self.issued.insert(dna.id, key);
        Some(
            dna.to_phenotype(self.config.sigmoid_coefficient)
                .with_origin(self.id),
        )
    }

    fn advance_if_complete(&mut self) {
        if self.evaluated.len() == self.config.population_size
            && self.unevaluated.is_empty()
            && self.issued.is_empty()
        {
            self.advance_generation();
        }
    }

    fn advance_generation(&mut self) {
        let report = self.summarize();
        info!(
            population = %self.id,
            generation = report.generation,
            average = report.average_fitness,
            best = report.best_fitness,
            species = report.species_count,
            "generation finished"
        );
        self.history.push(report);

        let mut breeding = Breeding::new(
            &self.config,
            &mut self.registry,
            &mut self.rng,
            &mut self.next_genome_id,
        );
        let offspring = self.strategy.reproduce(&mut self.genomes, &mut breeding);
        if offspring.len() != self.config.population_size {
            warn!(
                population = %self.id,
                bred = offspring.len(),
                expected = self.config.population_size,
                "reproduction produced an unexpected generation size"
            );
        }

        for key in self.evaluated.drain(..) {
            self.genomes.remove(key);
        }
        self.generation += 1;
        for child in offspring {
            self.register(child);
        }
        self.strategy.settle();
    }

    fn summarize(&self) -> GenerationReport {
        let scores: Vec<f64> = self
            .evaluated
            .iter()
            .filter_map(|key| self.genomes.get(*key).and_then(|d| d.fitness))
            .collect();
        let average_fitness = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        let best_fitness = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        GenerationReport {
            generation: self.generation,
            average_fitness,
            best_fitness,
            species_count: self.strategy.group_count(),
        }
    }

    // --- Accessors ---

    #[must_use]
    pub fn id(&self) -> PopulationId {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> &PopulationConfig {
        &self.config
    }

    /// Current generation, starting at 1.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.killed.is_none()
    }

    /// Genomes still waiting to be issued in this generation.
    #[must_use]
    pub fn available(&self) -> usize {
        self.unevaluated.len()
    }

    /// Phenotypes handed out and not yet reported.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.issued.len()
    }

    /// Genomes of this generation with a reported fitness.
    #[must_use]
    pub fn evaluated(&self) -> usize {
        self.evaluated.len()
    }

    #[must_use]
    pub fn species_count(&self) -> usize {
        self.strategy.group_count()
    }

    #[must_use]
    pub fn registry(&self) -> &InnovationRegistry {
        &self.registry
    }

    #[must_use]
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Genomes of the current generation, in no particular order.
    pub fn genomes(&self) -> impl Iterator<Item = &Dna> + '_ {
        self.genomes.values()
    }

    /// Reports of every finished generation, oldest first.
    #[must_use]
    pub fn history(&self) -> &[GenerationReport] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gene::NodeRole;

    fn small(size: usize) -> Population {
        Population::new(PopulationConfig::new(size, 2, 1).with_seed(42)).unwrap()
    }

    fn evaluate_generation(population: &mut Population, score: impl Fn(&Phenotype) -> f64) {
        let batch = population.request_batch(population.available()).unwrap();
        for phenotype in &batch {
            population.report_fitness(phenotype, score(phenotype)).unwrap();
        }
    }

    #[test]
    fn test_new_population() {
        let population = small(10);
        assert!(population.is_alive());
        assert_eq!(population.generation(), 1);
        assert_eq!(population.available(), 10);
        assert_eq!(population.species_count(), 1);
        assert_eq!(population.registry().node_count(), 3);
        assert_eq!(population.registry().innovation_count(), 2);
        assert!(population.genomes().all(|g| g.num_genes() == 2));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PopulationConfig {
            link_mutation_rate: 2.0,
            ..PopulationConfig::new(10, 2, 1)
        };
        assert!(Population::new(config).is_err());
        assert!(Population::new(PopulationConfig::new(10, 0, 1)).is_err());
    }

    #[test]
    fn test_queues_partition_generation() {
        let mut population = small(5);
        let first = population.request_phenotype().unwrap();
        let second = population.request_phenotype().unwrap();
        assert_ne!(first.genome_id(), second.genome_id());
        assert_eq!(population.available(), 3);
        assert_eq!(population.outstanding(), 2);

        population.report_fitness(&first, 1.0).unwrap();
        assert_eq!(population.outstanding(), 1);
        assert_eq!(population.evaluated(), 1);
        assert_eq!(
            population.available() + population.outstanding() + population.evaluated(),
            5
        );
    }

    #[test]
    fn test_exhausted_until_all_reported() {
        let mut population = small(3);
        let batch = population.request_batch(3).unwrap();
        assert_eq!(
            population.request_phenotype().unwrap_err(),
            PopulationError::Exhausted {
                requested: 1,
                available: 0
            }
        );

        population.report_fitness(&batch[0], 1.0).unwrap();
        population.report_fitness(&batch[1], 1.0).unwrap();
        assert!(population.request_phenotype().is_err());
        assert_eq!(population.generation(), 1);

        population.report_fitness(&batch[2], 1.0).unwrap();
        let next = population.request_phenotype().unwrap();
        assert_eq!(population.generation(), 2);
        assert!(next.genome_id() > 3);
        assert_eq!(population.history().len(), 1);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let mut population = small(4);
        population.request_phenotype().unwrap();
        assert_eq!(
            population.request_batch(4).unwrap_err(),
            PopulationError::Exhausted {
                requested: 4,
                available: 3
            }
        );
        assert_eq!(population.available(), 3);
        assert_eq!(population.request_batch(3).unwrap().len(), 3);
    }

    #[test]
    fn test_double_report_is_rejected() {
        let mut population = small(3);
        let phenotype = population.request_phenotype().unwrap();
        population.report_fitness(&phenotype, 2.0).unwrap();
        assert_eq!(
            population.report_fitness(&phenotype, 5.0).unwrap_err(),
            PopulationError::NotIssued {
                genome: phenotype.genome_id()
            }
        );
        assert_eq!(population.evaluated(), 1);
        let stored = population
            .genomes()
            .find(|g| g.id == phenotype.genome_id())
            .unwrap();
        assert_eq!(stored.fitness, Some(2.0));
    }

    #[test]
    fn test_foreign_phenotype_is_rejected() {
        let mut ours = small(3);
        let mut theirs = small(3);
        let foreign = theirs.request_phenotype().unwrap();
        ours.request_phenotype().unwrap();

        assert!(matches!(
            ours.report_fitness(&foreign, 1.0),
            Err(PopulationError::ForeignPhenotype { .. })
        ));
        assert_eq!(ours.evaluated(), 0);

        let detached = ours
            .genomes()
            .next()
            .unwrap()
            .to_phenotype(-4.9);
        assert!(matches!(
            ours.report_fitness(&detached, 1.0),
            Err(PopulationError::ForeignPhenotype { .. })
        ));
    }

    #[test]
    fn test_kill_stops_issuance() {
        let mut population = small(3);
        let phenotype = population.request_phenotype().unwrap();
        population.kill("solved");

        assert!(!population.is_alive());
        assert_eq!(
            population.request_phenotype().unwrap_err(),
            PopulationError::Killed {
                reason: "solved".to_string()
            }
        );
        assert!(population.request_batch(1).is_err());
        // late reports still land
        population.report_fitness(&phenotype, 1.0).unwrap();
    }

    #[test]
    fn test_generations_keep_size() {
        let mut population = small(12);
        for generation in 1..=5 {
            assert_eq!(population.generation(), generation);
            evaluate_generation(&mut population, |p| p.genome_id() as f64 % 4.0);
            population.request_batch(0).unwrap();
            assert_eq!(population.available(), 12);
            assert_eq!(population.genomes().count(), 12);
        }
        assert_eq!(population.history().len(), 5);
        for (i, report) in population.history().iter().enumerate() {
            assert_eq!(report.generation, i as u32 + 1);
            assert!(report.best_fitness >= report.average_fitness);
        }
    }

    #[test]
    fn test_negative_fitness_is_supported() {
        let mut population = small(8);
        for _ in 0..3 {
            evaluate_generation(&mut population, |p| -(p.genome_id() as f64));
        }
        population.request_batch(0).unwrap();
        assert_eq!(population.available(), 8);
        assert!(population.history()[0].best_fitness < 0.0);
    }

    #[test]
    fn test_same_seed_same_run() {
        let run = || {
            let mut population = small(10);
            for _ in 0..4 {
                evaluate_generation(&mut population, |p| {
                    p.clone().activate(&[1.0, 0.0]).unwrap()[0]
                });
            }
            population.request_batch(0).unwrap();
            let mut genomes: Vec<String> = population.genomes().map(|g| g.to_string()).collect();
            genomes.sort();
            genomes
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_seeded_population_copies_template() {
        let source = small(4);
        let mut template_dna = source.genomes().next().unwrap().clone();
        let mut registry = source.registry().clone();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        template_dna.mutate_add_node(&mut registry, &mut rng);
        let template = template_dna.to_phenotype(-4.9);

        let config = PopulationConfig::new(6, 5, 5).with_seed(3);
        let population = Population::seeded(config, &template).unwrap();

        assert_eq!(population.config().num_inputs, 2);
        assert_eq!(population.config().num_outputs, 1);
        assert_eq!(population.available(), 6);
        assert_eq!(population.species_count(), 1);
        assert_eq!(population.registry().node_count(), 4);
        assert_eq!(population.registry().innovation_count(), 4);
        for genome in population.genomes() {
            assert_eq!(genome.num_genes(), 4);
            assert_eq!(genome.count_role(NodeRole::Hidden), 1);
            assert_eq!(genome.num_enabled_genes(), 3);
        }
    }

    fn template(text: &str) -> Phenotype {
        text.parse::<crate::snapshot::Snapshot>()
            .unwrap()
            .to_phenotype(-4.9)
    }

    #[test]
    fn test_seeded_unlinked_input_survives_breeding() {
        let template = template(
            "genomestart 1\nnode 1 1\nnode 2 1\nnode 3 2\ngene 1 1 3 0.5 1\ngenomeend\n",
        );
        assert_eq!(template.num_inputs(), 2);

        let config = PopulationConfig::new(6, 2, 1).with_seed(4);
        let mut population = Population::seeded(config, &template).unwrap();
        evaluate_generation(&mut population, |p| p.genome_id() as f64);
        for generation in 2..=4 {
            let mut batch = population.request_batch(6).unwrap();
            assert_eq!(population.generation(), generation);
            for phenotype in &mut batch {
                assert_eq!(phenotype.num_inputs(), 2);
                assert_eq!(phenotype.num_outputs(), 1);
                assert!(phenotype.activate(&[1.0, 0.0]).is_ok());
            }
            for phenotype in &batch {
                population
                    .report_fitness(phenotype, phenotype.genome_id() as f64)
                    .unwrap();
            }
        }
    }

    #[test]
    fn test_seeded_ids_follow_role_layout() {
        // the output carries a higher id than the hidden node
        let template = template(
            "genomestart 1\nnode 1 1\nnode 2 1\nnode 3 3\nnode 9 2\n\
             gene 1 1 3 1 1\ngene 2 3 9 0.5 1\ngene 3 2 9 -0.5 1\ngenomeend\n",
        );

        let config = PopulationConfig::new(3, 2, 1).with_seed(6);
        let population = Population::seeded(config, &template).unwrap();
        for genome in population.genomes() {
            assert_eq!(genome.node(NodeId(1)).unwrap().role, NodeRole::Input);
            assert_eq!(genome.node(NodeId(2)).unwrap().role, NodeRole::Input);
            assert_eq!(genome.node(NodeId(3)).unwrap().role, NodeRole::Output);
            assert_eq!(genome.node(NodeId(4)).unwrap().role, NodeRole::Hidden);
            assert!(genome.has_connection(NodeId(4), NodeId(3)));
            assert!(genome.has_connection(NodeId(1), NodeId(4)));
        }
    }

    #[test]
    fn test_population_ids_are_distinct() {
        assert_ne!(small(2).id(), small(2).id());
    }
}
