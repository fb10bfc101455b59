//! Innovation and node-id bookkeeping for one population.
//!
//! Every genome in a population borrows the same [`InnovationRegistry`] while it
//! mutates. Two genomes that independently grow the same `source -> target`
//! connection therefore receive the same innovation number, which is what makes
//! crossover alignment meaningful. Each population owns its own registry, so
//! populations evolving side by side never share state.

use std::collections::HashMap;

use tracing::debug;

use crate::gene::{Innovation, NodeId};

/// Population-owned registry of connection innovations and node ids.
#[derive(Debug, Clone, Default)]
pub struct InnovationRegistry {
    connections: HashMap<(NodeId, NodeId), Innovation>,
    last_innovation: Innovation,
    last_node: u32,
}

impl InnovationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Innovation number for `source -> target`, assigning the next free number
    /// the first time the pair is seen.
    pub fn innovation(&mut self, source: NodeId, target: NodeId) -> Innovation {
        if let Some(&existing) = self.connections.get(&(source, target)) {
            return existing;
        }
        self.last_innovation += 1;
        let innovation = self.last_innovation;
        self.connections.insert((source, target), innovation);
        debug!(innovation, %source, %target, "innovation registered");
        innovation
    }

    /// Look up an innovation without registering it.
    #[must_use]
    pub fn existing(&self, source: NodeId, target: NodeId) -> Option<Innovation> {
        self.connections.get(&(source, target)).copied()
    }

    /// Allocate the next node id. Ids strictly increase with creation order.
    pub fn next_node_id(&mut self) -> NodeId {
        self.last_node += 1;
        let id = NodeId(self.last_node);
        debug!(node = %id, "node registered");
        id
    }

    /// Number of distinct connections seen so far.
    #[must_use]
    pub fn innovation_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of node ids handed out so far.
    #[must_use]
    pub fn node_count(&self) -> u32 {
        self.last_node
    }
}
