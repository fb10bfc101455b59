//! # Tribal NEAT
//!
//! A NeuroEvolution of Augmenting Topologies (NEAT) engine with speciation,
//! driven through a request/report protocol.
//!
//! ## Features
//!
//! - **Population protocol**: request a phenotype, drive it with your own
//!   inputs, report a scalar fitness. Generations advance on their own once
//!   every genome has been scored.
//! - **Population-owned innovation registry**: equal structural mutations get
//!   equal innovation numbers within one population, and independent
//!   populations never share state.
//! - **Speciation**: explicit fitness sharing, offspring quotas per species and
//!   truncation before in-species crossover.
//! - **Text snapshots**: save a network and load it back for activation.
//!
//! ## Quick Start
//!
//! ```rust
//! use tribal_neat::{Population, PopulationConfig};
//!
//! let config = PopulationConfig::new(20, 2, 1).with_seed(7);
//! let mut population = Population::new(config)?;
//!
//! for _ in 0..200 {
//!     let mut phenotype = population.request_phenotype()?;
//!     let mut score = 0.0;
//!     for (a, b) in [(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)] {
//!         phenotype.reset_activity();
//!         let mut output = 0.0;
//!         for _ in 0..4 {
//!             output = phenotype.activate(&[a, b])?[0];
//!         }
//!         if (output >= 0.5) == (a == 1.0 && b == 1.0) {
//!             score += 1.0;
//!         }
//!     }
//!     population.report_fitness(&phenotype, score)?;
//! }
//! assert_eq!(population.generation(), 10);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ### Genomes and phenotypes
//!
//! A [`Dna`] is the evolvable description: nodes keyed by [`NodeId`] and
//! connection genes keyed by innovation number. A [`Phenotype`] is a frozen
//! network built from it, laid out as flat per-node buffers with each node's
//! incoming synapses stored contiguously. Activation is one synchronous step:
//! inputs are written, then every other node sums the outputs as they stood at
//! the start of the step. Recurrent links therefore need no special casing;
//! signals simply take several steps to travel.
//!
//! ### Generations
//!
//! Each genome moves `unevaluated -> issued -> evaluated` once per
//! generation. When the generation is fully evaluated the next request runs a
//! [`Reproduction`] strategy, by default [`TribeReproduction`], which breeds
//! the next generation's genomes in place of the old ones.

pub mod config;
pub mod gene;
pub mod genome;
pub mod innovation;
pub mod phenotype;
pub mod population;
pub mod reproduction;
pub mod snapshot;
pub mod species;

// Re-exports for convenience
pub use config::{ConfigError, PopulationConfig};
pub use gene::{ConnectionGene, Innovation, NodeGene, NodeId, NodeRole};
pub use genome::{CrossoverError, Dna, GeneAlignment, GenomeId};
pub use innovation::InnovationRegistry;
pub use phenotype::{sigmoid, ActivationError, Phenotype};
pub use population::{GenerationReport, GenomeKey, Population, PopulationError, PopulationId};
pub use reproduction::{Breeding, Reproduction, TribeReproduction};
pub use snapshot::{Snapshot, SnapshotError};
pub use species::{allocate_offspring, compatibility_distance, Species, SpeciesId};
