//! Activatable networks built from genomes.
//!
//! A [`Phenotype`] is a frozen copy of a genome's topology and weights, laid out
//! for cheap repeated activation. Incoming genes are stored per target node in
//! Compressed Sparse Row (CSR) form, sorted by innovation so summation order is
//! deterministic. Later mutation of the source genome never affects a
//! phenotype that was already built.
//!
//! ## Activation contract
//!
//! One call to [`Phenotype::activate`] is one relaxation step of a possibly
//! recurrent graph. Inputs are written first. Every hidden and output node then
//! sums `weight * output` over its enabled incoming genes, reading the `output`
//! values as they stood at the start of the step (with the new inputs). Only
//! after all sums are taken are outputs recomputed through the sigmoid. The
//! result does not depend on node iteration order. Signal needs one step per
//! graph hop, so callers drive deep networks with repeated calls and keep the
//! transient state between them.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;
use tracing::warn;

use crate::gene::{ConnectionGene, Innovation, NodeGene, NodeId, NodeRole};
use crate::genome::GenomeId;
use crate::population::PopulationId;
use crate::snapshot::{self, Snapshot, SnapshotError};

/// Activation was called with the wrong number of inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ActivationError {
    #[error("expected {expected} inputs, got {actual}")]
    InputArity { expected: usize, actual: usize },
}

/// `1 / (1 + e^(x * coefficient))`. A negative coefficient makes the output
/// grow with `x`.
#[inline]
#[must_use]
pub fn sigmoid(x: f64, coefficient: f64) -> f64 {
    1.0 / (1.0 + (x * coefficient).exp())
}

/// One incoming gene in CSR storage.
#[derive(Debug, Clone, Copy)]
struct Synapse {
    innovation: Innovation,
    /// Dense index of the source node.
    source: usize,
    weight: f64,
    enabled: bool,
}

/// A frozen, activatable network.
#[derive(Debug, Clone)]
pub struct Phenotype {
    genome_id: GenomeId,
    /// Population that issued this phenotype, `None` for loaded or detached ones.
    origin: Option<PopulationId>,
    sigmoid_coefficient: f64,
    /// Node ids in ascending order; position is the dense index.
    node_ids: Vec<NodeId>,
    roles: Vec<NodeRole>,
    activity: Vec<f64>,
    output: Vec<f64>,
    // For node i, incoming genes are at incoming[offsets[i]..offsets[i + 1]].
    offsets: Vec<usize>,
    incoming: Vec<Synapse>,
    input_indices: Vec<usize>,
    hidden_indices: Vec<usize>,
    output_indices: Vec<usize>,
}

impl Phenotype {
    /// Build a phenotype from node and gene lists.
    ///
    /// Genes whose endpoints are missing from `nodes` are ignored; genomes and
    /// validated snapshots never contain such genes.
    pub(crate) fn build<'a>(
        genome_id: GenomeId,
        nodes: impl IntoIterator<Item = &'a NodeGene>,
        genes: impl IntoIterator<Item = &'a ConnectionGene>,
        sigmoid_coefficient: f64,
    ) -> Self {
        let mut nodes: Vec<NodeGene> = nodes.into_iter().copied().collect();
        nodes.sort_by_key(|n| n.id);
        nodes.dedup_by_key(|n| n.id);

        let index: HashMap<NodeId, usize> =
            nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();

        let mut input_indices = Vec::new();
        let mut hidden_indices = Vec::new();
        let mut output_indices = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            match node.role {
                NodeRole::Input => input_indices.push(i),
                NodeRole::Hidden => hidden_indices.push(i),
                NodeRole::Output => output_indices.push(i),
            }
        }

        // (target, synapse), sorted by target then innovation
        let mut edges: Vec<(usize, Synapse)> = genes
            .into_iter()
            .filter_map(|g| {
                let source = *index.get(&g.source)?;
                let target = *index.get(&g.target)?;
                Some((
                    target,
                    Synapse {
                        innovation: g.innovation,
                        source,
                        weight: g.weight,
                        enabled: g.enabled,
                    },
                ))
            })
            .collect();
        edges.sort_by_key(|(target, s)| (*target, s.innovation));

        let mut offsets = vec![0; nodes.len() + 1];
        for (target, _) in &edges {
            offsets[target + 1] += 1;
        }
        for i in 0..nodes.len() {
            offsets[i + 1] += offsets[i];
        }
        let incoming = edges.into_iter().map(|(_, s)| s).collect();

        Self {
            genome_id,
            origin: None,
            sigmoid_coefficient,
            node_ids: nodes.iter().map(|n| n.id).collect(),
            roles: nodes.iter().map(|n| n.role).collect(),
            activity: vec![0.0; nodes.len()],
            output: vec![0.0; nodes.len()],
            offsets,
            incoming,
            input_indices,
            hidden_indices,
            output_indices,
        }
    }

    pub(crate) fn with_origin(mut self, origin: PopulationId) -> Self {
        self.origin = Some(origin);
        self
    }

    pub(crate) fn origin(&self) -> Option<PopulationId> {
        self.origin
    }

    /// Id of the genome this phenotype was built from.
    #[must_use]
    pub fn genome_id(&self) -> GenomeId {
        self.genome_id
    }

    #[must_use]
    pub fn num_inputs(&self) -> usize {
        self.input_indices.len()
    }

    #[must_use]
    pub fn num_outputs(&self) -> usize {
        self.output_indices.len()
    }

    #[must_use]
    pub fn num_hidden(&self) -> usize {
        self.hidden_indices.len()
    }

    #[must_use]
    pub fn sigmoid_coefficient(&self) -> f64 {
        self.sigmoid_coefficient
    }

    /// Current transient output of a node.
    #[must_use]
    pub fn node_output(&self, id: NodeId) -> Option<f64> {
        let idx = self.node_ids.binary_search(&id).ok()?;
        Some(self.output[idx])
    }

    /// Run one relaxation step and return the output nodes' values in id order.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::InputArity`] when `inputs` does not match the
    /// number of input nodes; the network state is left untouched.
    pub fn activate(&mut self, inputs: &[f64]) -> Result<Vec<f64>, ActivationError> {
        if inputs.len() != self.input_indices.len() {
            warn!(
                genome = self.genome_id,
                expected = self.input_indices.len(),
                actual = inputs.len(),
                "activation rejected"
            );
            return Err(ActivationError::InputArity {
                expected: self.input_indices.len(),
                actual: inputs.len(),
            });
        }

        for (&idx, &value) in self.input_indices.iter().zip(inputs) {
            self.output[idx] = value;
        }

        for &idx in self.hidden_indices.iter().chain(&self.output_indices) {
            self.activity[idx] = self.weighted_sum(idx);
        }

        for &idx in self.hidden_indices.iter().chain(&self.output_indices) {
            self.output[idx] = sigmoid(self.activity[idx], self.sigmoid_coefficient);
            self.activity[idx] = 0.0;
        }

        Ok(self.output_indices.iter().map(|&i| self.output[i]).collect())
    }

    /// Sum of `weight * output` over the enabled incoming genes of node `idx`.
    fn weighted_sum(&self, idx: usize) -> f64 {
        self.incoming[self.offsets[idx]..self.offsets[idx + 1]]
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.weight * self.output[s.source])
            .sum()
    }

    /// Zero every node's transient state, erasing recurrent memory.
    pub fn reset_activity(&mut self) {
        self.activity.fill(0.0);
        self.output.fill(0.0);
    }

    /// Zero the transient state of output nodes only.
    pub fn reset_output_activity(&mut self) {
        for &idx in &self.output_indices {
            self.activity[idx] = 0.0;
            self.output[idx] = 0.0;
        }
    }

    /// The defining nodes and genes, in snapshot order.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let nodes = self
            .node_ids
            .iter()
            .zip(&self.roles)
            .map(|(&id, &role)| NodeGene { id, role })
            .collect();

        let mut genes: Vec<ConnectionGene> = Vec::with_capacity(self.incoming.len());
        for target in 0..self.node_ids.len() {
            for synapse in &self.incoming[self.offsets[target]..self.offsets[target + 1]] {
                genes.push(ConnectionGene {
                    innovation: synapse.innovation,
                    source: self.node_ids[synapse.source],
                    target: self.node_ids[target],
                    weight: synapse.weight,
                    enabled: synapse.enabled,
                });
            }
        }
        genes.sort_by_key(|g| g.innovation);

        Snapshot {
            genome_id: self.genome_id,
            nodes,
            genes,
        }
    }

    /// Text form of [`snapshot`](Self::snapshot).
    #[must_use]
    pub fn to_snapshot_string(&self) -> String {
        self.snapshot().to_string()
    }

    /// Write this phenotype's defining genome to `path` as text.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Io`] when the file cannot be written.
    pub fn save_text(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        snapshot::save(&self.snapshot(), path.as_ref())
    }

    /// Load a phenotype saved with [`save_text`](Self::save_text).
    ///
    /// The result carries no population context and can only be activated.
    ///
    /// # Errors
    ///
    /// Returns a [`SnapshotError`] when the file cannot be read, a line fails
    /// to parse, or the node and gene lists do not form a valid network.
    pub fn load_text(path: impl AsRef<Path>, sigmoid_coefficient: f64) -> Result<Self, SnapshotError> {
        let snapshot = snapshot::load(path.as_ref())?;
        Ok(snapshot.to_phenotype(sigmoid_coefficient))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COEFFICIENT: f64 = -4.9;

    fn node(id: u32, role: NodeRole) -> NodeGene {
        NodeGene {
            id: NodeId(id),
            role,
        }
    }

    fn gene(innovation: Innovation, source: u32, target: u32, weight: f64) -> ConnectionGene {
        ConnectionGene::new(innovation, NodeId(source), NodeId(target), weight)
    }

    /// in(1) -> hidden(3) -> hidden(4) -> out(2)
    fn chain() -> Phenotype {
        let nodes = [
            node(1, NodeRole::Input),
            node(2, NodeRole::Output),
            node(3, NodeRole::Hidden),
            node(4, NodeRole::Hidden),
        ];
        let mut split = gene(1, 1, 2, 0.7);
        split.enabled = false;
        let genes = [split, gene(2, 1, 3, 1.0), gene(3, 3, 4, 1.0), gene(4, 4, 2, 1.0)];
        Phenotype::build(1, &nodes, &genes, COEFFICIENT)
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0, COEFFICIENT) - 0.5).abs() < 1e-12);
        assert!(sigmoid(5.0, COEFFICIENT) > 0.99);
        assert!(sigmoid(-5.0, COEFFICIENT) < 0.01);
        assert!(sigmoid(1e6, COEFFICIENT) <= 1.0);
        assert!(sigmoid(-1e6, COEFFICIENT) >= 0.0);
    }

    #[test]
    fn test_single_layer_activation() {
        let nodes = [
            node(1, NodeRole::Input),
            node(2, NodeRole::Input),
            node(3, NodeRole::Output),
        ];
        let genes = [gene(1, 1, 3, 0.5), gene(2, 2, 3, -0.25)];
        let mut phenotype = Phenotype::build(7, &nodes, &genes, COEFFICIENT);

        let out = phenotype.activate(&[1.0, 1.0]).unwrap();
        assert_eq!(out.len(), 1);
        assert!((out[0] - sigmoid(0.25, COEFFICIENT)).abs() < 1e-12);
        assert_eq!(phenotype.node_output(NodeId(1)), Some(1.0));
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        let mut phenotype = chain();
        assert_eq!(
            phenotype.activate(&[1.0, 2.0]),
            Err(ActivationError::InputArity {
                expected: 1,
                actual: 2
            })
        );
        assert_eq!(
            phenotype.activate(&[]),
            Err(ActivationError::InputArity {
                expected: 1,
                actual: 0
            })
        );
        assert_eq!(phenotype.node_output(NodeId(3)), Some(0.0));
    }

    #[test]
    fn test_signal_moves_one_hop_per_step() {
        let mut phenotype = chain();

        phenotype.activate(&[1.0]).unwrap();
        let h1 = sigmoid(1.0, COEFFICIENT);
        assert!((phenotype.node_output(NodeId(3)).unwrap() - h1).abs() < 1e-12);
        // hidden 4 read hidden 3's previous output (0)
        assert!((phenotype.node_output(NodeId(4)).unwrap() - 0.5).abs() < 1e-12);

        phenotype.activate(&[1.0]).unwrap();
        let h2 = sigmoid(h1, COEFFICIENT);
        assert!((phenotype.node_output(NodeId(4)).unwrap() - h2).abs() < 1e-12);

        let out = phenotype.activate(&[1.0]).unwrap();
        assert!((out[0] - sigmoid(h2, COEFFICIENT)).abs() < 1e-12);
    }

    #[test]
    fn test_disabled_genes_carry_no_signal() {
        let nodes = [node(1, NodeRole::Input), node(2, NodeRole::Output)];
        let mut off = gene(1, 1, 2, 3.0);
        off.enabled = false;
        let mut phenotype = Phenotype::build(1, &nodes, &[off], COEFFICIENT);
        let out = phenotype.activate(&[1.0]).unwrap();
        assert!((out[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_reset_activity() {
        let mut a = chain();
        let mut b = chain();
        for _ in 0..3 {
            a.activate(&[1.0]).unwrap();
        }
        a.reset_activity();
        assert_eq!(a.activate(&[0.3]).unwrap(), b.activate(&[0.3]).unwrap());
    }

    #[test]
    fn test_reset_output_activity_keeps_hidden_state() {
        let mut phenotype = chain();
        phenotype.activate(&[1.0]).unwrap();
        phenotype.activate(&[1.0]).unwrap();
        let hidden = phenotype.node_output(NodeId(4)).unwrap();

        phenotype.reset_output_activity();
        assert_eq!(phenotype.node_output(NodeId(2)), Some(0.0));
        assert_eq!(phenotype.node_output(NodeId(4)), Some(hidden));
    }

    #[test]
    fn test_recurrent_self_loop_is_order_independent() {
        let nodes = [
            node(1, NodeRole::Input),
            node(2, NodeRole::Output),
            node(3, NodeRole::Hidden),
        ];
        let genes = [
            gene(1, 1, 3, 1.0),
            gene(2, 3, 3, 0.5),
            gene(3, 3, 2, 1.0),
            gene(4, 2, 3, -1.0),
        ];
        let mut forward = Phenotype::build(1, &nodes, &genes, COEFFICIENT);
        let reversed: Vec<ConnectionGene> = genes.iter().rev().cloned().collect();
        let mut backward = Phenotype::build(1, nodes.iter().rev(), &reversed, COEFFICIENT);

        for _ in 0..5 {
            assert_eq!(
                forward.activate(&[0.8]).unwrap(),
                backward.activate(&[0.8]).unwrap()
            );
        }
    }

    #[test]
    fn test_snapshot_lists_all_genes() {
        let phenotype = chain();
        let snapshot = phenotype.snapshot();
        assert_eq!(snapshot.genome_id, 1);
        assert_eq!(snapshot.nodes.len(), 4);
        let innovations: Vec<Innovation> = snapshot.genes.iter().map(|g| g.innovation).collect();
        assert_eq!(innovations, vec![1, 2, 3, 4]);
        assert!(!snapshot.genes[0].enabled);
    }
}
