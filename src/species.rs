//! Speciation: grouping genomes by similarity to a representative.
//!
//! The compatibility measure between two genomes is
//! `c1 * excess / N + c2 * disjoint / N + c3 * avg_weight_diff`, where `N` is
//! the larger gene count, taken as 1 below 20 genes so that small genomes are
//! not over-penalised.

use rand::Rng;
use slotmap::SlotMap;

use crate::config::PopulationConfig;
use crate::genome::Dna;
use crate::population::GenomeKey;

/// Identifier of a species within its population.
pub type SpeciesId = u32;

/// Gene counts below this are normalised with `N = 1`.
const SMALL_GENOME_GENES: usize = 20;

/// Compatibility distance between two genomes.
#[must_use]
pub fn compatibility_distance(a: &Dna, b: &Dna, config: &PopulationConfig) -> f64 {
    let alignment = a.align(b);
    let larger = a.num_genes().max(b.num_genes());
    let n = if larger < SMALL_GENOME_GENES {
        1.0
    } else {
        larger as f64
    };

    config.excess_coefficient * alignment.excess as f64 / n
        + config.disjoint_coefficient * alignment.disjoint as f64 / n
        + config.weight_coefficient * alignment.average_weight_difference()
}

/// Split `population_size` offspring across species by normalised fitness.
///
/// Fitness values are shifted by the most negative one (if any) so all are
/// non-negative. Each species gets `floor(share * population_size)`; the
/// rounding shortfall goes to `champion`. When the shifted total is zero the
/// champion receives everything. The result always sums to `population_size`.
#[must_use]
pub fn allocate_offspring(fitness: &[f64], champion: usize, population_size: usize) -> Vec<usize> {
    if fitness.is_empty() {
        return Vec::new();
    }

    let floor = fitness.iter().fold(0.0_f64, |lowest, &f| lowest.min(f));
    let total: f64 = fitness.iter().map(|f| f - floor).sum();

    let mut quotas: Vec<usize> = if total > 0.0 {
        fitness
            .iter()
            .map(|f| ((f - floor) / total * population_size as f64).floor() as usize)
            .collect()
    } else {
        vec![0; fitness.len()]
    };

    let mut dealt: usize = quotas.iter().sum();
    // float rounding can overshoot by a unit; take it back from the largest quota
    while dealt > population_size {
        if let Some(largest) = quotas.iter_mut().max() {
            *largest -= 1;
        }
        dealt -= 1;
    }
    if let Some(quota) = quotas.get_mut(champion) {
        *quota += population_size - dealt;
    }
    quotas
}

/// A species ("tribe"): genomes compatible with one representative.
#[derive(Debug, Clone)]
pub struct Species {
    /// Identifier, unique within the population.
    pub id: SpeciesId,
    representative: Dna,
    members: Vec<GenomeKey>,
    previous: Vec<GenomeKey>,
    /// Sum of shared member fitness for the pending epoch.
    pub fitness: f64,
    /// Offspring quota for the pending epoch.
    pub offspring: usize,
}

impl Species {
    /// Found a species with `founder` as representative and first member.
    #[must_use]
    pub fn new(id: SpeciesId, founder: &Dna, key: GenomeKey) -> Self {
        Self {
            id,
            representative: founder.clone(),
            members: vec![key],
            previous: Vec::new(),
            fitness: 0.0,
            offspring: 0,
        }
    }

    #[must_use]
    pub fn representative(&self) -> &Dna {
        &self.representative
    }

    pub fn set_representative(&mut self, dna: &Dna) {
        self.representative = dna.clone();
    }

    /// Whether `candidate` belongs here: distance at or above the threshold,
    /// or no disjoint and no excess genes at all.
    #[must_use]
    pub fn is_compatible(&self, candidate: &Dna, config: &PopulationConfig) -> bool {
        let distance = compatibility_distance(&self.representative, candidate, config);
        distance >= config.compatibility_threshold
            || self.representative.align(candidate).structurally_identical()
    }

    pub fn add(&mut self, key: GenomeKey) {
        self.members.push(key);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Current-generation members.
    #[must_use]
    pub fn members(&self) -> &[GenomeKey] {
        &self.members
    }

    /// Previous-generation members, the parent pool while breeding.
    #[must_use]
    pub fn previous(&self) -> &[GenomeKey] {
        &self.previous
    }

    /// Sort members by ascending fitness; unevaluated genomes sort first.
    pub fn sort_by_fitness(&mut self, genomes: &SlotMap<GenomeKey, Dna>) {
        let fitness = |key: &GenomeKey| {
            genomes
                .get(*key)
                .and_then(|d| d.fitness)
                .unwrap_or(f64::NEG_INFINITY)
        };
        self.members.sort_by(|a, b| fitness(a).total_cmp(&fitness(b)));
    }

    /// Drop the lowest `fraction` of members. Assumes they are sorted.
    pub fn cull(&mut self, fraction: f64) {
        let unfit = (fraction * self.members.len() as f64) as usize;
        self.members.drain(..unfit.min(self.members.len()));
    }

    /// Move current members to the parent pool and start an empty generation.
    pub fn archive(&mut self) {
        self.previous = std::mem::take(&mut self.members);
    }

    /// Forget the parent pool once breeding is over.
    pub fn clear_previous(&mut self) {
        self.previous.clear();
    }

    /// Uniformly random parent from the previous generation.
    pub fn random_parent<R: Rng>(&self, rng: &mut R) -> Option<GenomeKey> {
        if self.previous.is_empty() {
            return None;
        }
        Some(self.previous[rng.random_range(0..self.previous.len())])
    }
}
