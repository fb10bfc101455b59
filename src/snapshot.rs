//! Line-oriented text snapshots of a single genome.
//!
//! ```text
//! genomestart <id>
//! node <nodeId> <roleCode>                                  (1=input, 2=output, 3=hidden)
//! gene <innovation> <sourceId> <targetId> <weight> <enabled> (enabled: 1/0)
//! genomeend
//! ```
//!
//! Nodes are written in ascending id order and genes in ascending innovation
//! order. Weights use Rust's shortest round-trip float formatting, so a saved
//! and reloaded network activates bit-identically.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

use crate::gene::{ConnectionGene, Innovation, NodeGene, NodeId, NodeRole};
use crate::genome::{Dna, GenomeId};
use crate::phenotype::Phenotype;

/// Snapshot read or write failure.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("could not access snapshot {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("snapshot has no genomestart line")]
    MissingHeader,

    #[error("snapshot lists no {0}")]
    Empty(&'static str),

    #[error("gene {innovation} references unknown node {node}")]
    DanglingGene { innovation: Innovation, node: NodeId },

    #[error("gene {innovation} targets input node {node}")]
    InputTarget { innovation: Innovation, node: NodeId },
}

/// The defining content of one genome: id, nodes and genes.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Id of the genome the snapshot was taken from.
    pub genome_id: GenomeId,
    /// Nodes in the order they were read or collected.
    pub nodes: Vec<NodeGene>,
    /// Genes in the order they were read or collected.
    pub genes: Vec<ConnectionGene>,
}

impl Snapshot {
    /// Check that the snapshot describes a usable network.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::Empty`] for a missing node or gene list, and
    /// [`SnapshotError::DanglingGene`] or [`SnapshotError::InputTarget`] for a
    /// gene whose endpoints do not fit the node list.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.nodes.is_empty() {
            return Err(SnapshotError::Empty("nodes"));
        }
        if self.genes.is_empty() {
            return Err(SnapshotError::Empty("genes"));
        }
        for gene in &self.genes {
            for endpoint in [gene.source, gene.target] {
                if !self.nodes.iter().any(|n| n.id == endpoint) {
                    return Err(SnapshotError::DanglingGene {
                        innovation: gene.innovation,
                        node: endpoint,
                    });
                }
            }
            if self
                .nodes
                .iter()
                .any(|n| n.id == gene.target && n.role == NodeRole::Input)
            {
                return Err(SnapshotError::InputTarget {
                    innovation: gene.innovation,
                    node: gene.target,
                });
            }
        }
        Ok(())
    }

    /// An activation-only phenotype with no population context.
    #[must_use]
    pub fn to_phenotype(&self, sigmoid_coefficient: f64) -> Phenotype {
        Phenotype::build(self.genome_id, &self.nodes, &self.genes, sigmoid_coefficient)
    }

    /// A detached genome with the same nodes and genes.
    #[must_use]
    pub fn to_dna(&self) -> Dna {
        let mut dna = Dna::empty(self.genome_id);
        for node in &self.nodes {
            dna.insert_node(*node);
        }
        for gene in &self.genes {
            dna.insert_gene(gene.clone());
        }
        dna
    }
}

impl From<&Dna> for Snapshot {
    fn from(dna: &Dna) -> Self {
        Self {
            genome_id: dna.id,
            nodes: dna.nodes().copied().collect(),
            genes: dna.genes().cloned().collect(),
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut nodes: Vec<&NodeGene> = self.nodes.iter().collect();
        nodes.sort_by_key(|n| n.id);
        let mut genes: Vec<&ConnectionGene> = self.genes.iter().collect();
        genes.sort_by_key(|g| g.innovation);
        write_genome(f, self.genome_id, nodes, genes)
    }
}

/// Write one genome in snapshot form. Callers pass nodes and genes already sorted.
pub(crate) fn write_genome<'a, W: fmt::Write>(
    out: &mut W,
    genome_id: GenomeId,
    nodes: impl IntoIterator<Item = &'a NodeGene>,
    genes: impl IntoIterator<Item = &'a ConnectionGene>,
) -> fmt::Result {
    writeln!(out, "genomestart {genome_id}")?;
    for node in nodes {
        writeln!(out, "node {} {}", node.id, node.role.code())?;
    }
    for gene in genes {
        writeln!(
            out,
            "gene {} {} {} {} {}",
            gene.innovation,
            gene.source,
            gene.target,
            gene.weight,
            u8::from(gene.enabled)
        )?;
    }
    writeln!(out, "genomeend")
}

fn field<T: FromStr>(parts: &[&str], at: usize, line: usize, name: &str) -> Result<T, SnapshotError> {
    let raw = parts.get(at).ok_or_else(|| SnapshotError::Parse {
        line,
        reason: format!("missing {name}"),
    })?;
    raw.parse().map_err(|_| SnapshotError::Parse {
        line,
        reason: format!("bad {name} {raw:?}"),
    })
}

impl FromStr for Snapshot {
    type Err = SnapshotError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut genome_id = None;
        let mut nodes = Vec::new();
        let mut genes = Vec::new();

        for (i, raw) in text.lines().enumerate() {
            let line = i + 1;
            let parts: Vec<&str> = raw.split_whitespace().collect();
            match parts.first().copied() {
                Some("genomestart") => {
                    let id: GenomeId = field(&parts, 1, line, "genome id")?;
                    genome_id.get_or_insert(id);
                }
                Some("node") => {
                    let id: u32 = field(&parts, 1, line, "node id")?;
                    let code: u8 = field(&parts, 2, line, "role code")?;
                    let role = NodeRole::from_code(code).ok_or_else(|| SnapshotError::Parse {
                        line,
                        reason: format!("unknown role code {code}"),
                    })?;
                    nodes.push(NodeGene {
                        id: NodeId(id),
                        role,
                    });
                }
                Some("gene") => {
                    let innovation: Innovation = field(&parts, 1, line, "innovation")?;
                    let source: u32 = field(&parts, 2, line, "source id")?;
                    let target: u32 = field(&parts, 3, line, "target id")?;
                    let weight: f64 = field(&parts, 4, line, "weight")?;
                    let enabled: i64 = field(&parts, 5, line, "enabled flag")?;
                    genes.push(ConnectionGene {
                        innovation,
                        source: NodeId(source),
                        target: NodeId(target),
                        weight,
                        enabled: enabled != 0,
                    });
                }
                Some("genomeend") => break,
                // blank and unrecognised lines are skipped
                _ => {}
            }
        }

        let snapshot = Self {
            genome_id: genome_id.ok_or(SnapshotError::MissingHeader)?,
            nodes,
            genes,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }
}

/// Write `snapshot` to `path`, replacing any existing file.
///
/// # Errors
///
/// Returns [`SnapshotError::Io`] when the file cannot be written.
pub fn save(snapshot: &Snapshot, path: &Path) -> Result<(), SnapshotError> {
    std::fs::write(path, snapshot.to_string()).map_err(|source| {
        warn!(path = %path.display(), genome = snapshot.genome_id, "could not save snapshot");
        SnapshotError::Io {
            path: path.display().to_string(),
            source,
        }
    })
}

/// Read and parse the snapshot at `path`.
///
/// # Errors
///
/// [`SnapshotError::Io`] when the file cannot be read, otherwise any parse or
/// validation error of the text.
pub fn load(path: &Path) -> Result<Snapshot, SnapshotError> {
    let text = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
        path: path.display().to_string(),
        source,
    });
    let parsed = text.and_then(|text| text.parse::<Snapshot>());
    if let Err(err) = &parsed {
        warn!(path = %path.display(), error = %err, "could not load snapshot");
    }
    parsed
}
