//! Gene types for NEAT genomes.
//!
//! This module defines the fundamental building blocks of a genome:
//! - [`NodeGene`]: a neuron, identified by a population-wide [`NodeId`]
//! - [`ConnectionGene`]: a weighted directed link carrying a historical [`Innovation`] marker

use std::fmt;

use serde::{Deserialize, Serialize};

/// Population-wide historical marker for a `source -> target` connection.
///
/// The first genome to grow a given connection gets a fresh number; every later
/// genome that independently grows the same pair reuses it.
pub type Innovation = u32;

/// Population-wide node identifier.
///
/// Ids are handed out in a fixed layout: inputs first (`1..=num_inputs`), then
/// outputs, then hidden nodes in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// Receives external values; never the target of a connection.
    Input,
    /// Produces network output.
    Output,
    /// Internal node introduced by splitting a connection.
    Hidden,
}

impl NodeRole {
    /// Numeric code used by the text snapshot format.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Input => 1,
            Self::Output => 2,
            Self::Hidden => 3,
        }
    }

    /// Inverse of [`code`](Self::code).
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Input),
            2 => Some(Self::Output),
            3 => Some(Self::Hidden),
            _ => None,
        }
    }
}

/// A node gene. Immutable once created and never deleted from a genome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGene {
    /// Population-wide identifier.
    pub id: NodeId,
    /// Input, output or hidden.
    pub role: NodeRole,
}

impl NodeGene {
    #[must_use]
    pub fn input(id: NodeId) -> Self {
        Self {
            id,
            role: NodeRole::Input,
        }
    }

    #[must_use]
    pub fn output(id: NodeId) -> Self {
        Self {
            id,
            role: NodeRole::Output,
        }
    }

    #[must_use]
    pub fn hidden(id: NodeId) -> Self {
        Self {
            id,
            role: NodeRole::Hidden,
        }
    }
}

/// A connection gene: a weighted link from `source` to `target`.
///
/// Two genes describe the same connection iff their endpoints match; weight,
/// enabled state and innovation play no part in that identity (see
/// [`same_connection`](Self::same_connection)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionGene {
    /// Historical marker used to align genomes during crossover.
    pub innovation: Innovation,
    /// Node the signal is read from.
    pub source: NodeId,
    /// Node the weighted signal is added to; never an input.
    pub target: NodeId,
    /// Multiplier applied to the source node's output.
    pub weight: f64,
    /// Disabled genes are skipped during activation but kept for crossover.
    pub enabled: bool,
}

impl ConnectionGene {
    /// Create a new enabled connection.
    #[must_use]
    pub fn new(innovation: Innovation, source: NodeId, target: NodeId, weight: f64) -> Self {
        Self {
            innovation,
            source,
            target,
            weight,
            enabled: true,
        }
    }

    /// Structural identity: same endpoints, regardless of weight or enabled state.
    #[must_use]
    pub fn same_connection(&self, other: &Self) -> bool {
        self.source == other.source && self.target == other.target
    }
}
