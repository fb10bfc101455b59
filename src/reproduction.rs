//! Reproduction strategies.
//!
//! A [`Population`](crate::Population) delegates two things to its strategy:
//! placing every newly registered genome, and turning a fully evaluated
//! generation into the genomes of the next one. [`TribeReproduction`] is the
//! speciated NEAT epoch: explicit fitness sharing, offspring quotas by
//! normalised species fitness, truncation and in-species crossover.

use rand::Rng;
use slotmap::SlotMap;
use tracing::{debug, warn};

use crate::config::PopulationConfig;
use crate::genome::{Dna, GenomeId};
use crate::innovation::InnovationRegistry;
use crate::population::GenomeKey;
use crate::species::{allocate_offspring, Species, SpeciesId};

/// Population state lent to a strategy while it breeds.
pub struct Breeding<'a, R: Rng> {
    /// Rates and coefficients of the population.
    pub config: &'a PopulationConfig,
    /// Registry every structural mutation of a child goes through.
    pub registry: &'a mut InnovationRegistry,
    /// The population's random source.
    pub rng: &'a mut R,
    next_genome_id: &'a mut GenomeId,
}

impl<'a, R: Rng> Breeding<'a, R> {
    pub(crate) fn new(
        config: &'a PopulationConfig,
        registry: &'a mut InnovationRegistry,
        rng: &'a mut R,
        next_genome_id: &'a mut GenomeId,
    ) -> Self {
        Self {
            config,
            registry,
            rng,
            next_genome_id,
        }
    }

    /// Claim the next genome id of the population.
    pub fn next_genome_id(&mut self) -> GenomeId {
        let id = *self.next_genome_id;
        *self.next_genome_id += 1;
        id
    }
}

/// How a population groups and breeds its genomes.
pub trait Reproduction {
    /// Place a genome that just joined the current generation.
    fn assign(&mut self, key: GenomeKey, genome: &Dna, config: &PopulationConfig);

    /// Called once after a whole generation has been assigned.
    fn settle(&mut self);

    /// Produce `config.population_size` child genomes from the evaluated
    /// generation in `genomes`. Implementations may rewrite member fitness.
    fn reproduce<R: Rng>(
        &mut self,
        genomes: &mut SlotMap<GenomeKey, Dna>,
        breeding: &mut Breeding<'_, R>,
    ) -> Vec<Dna>;

    /// Number of live groups (species).
    fn group_count(&self) -> usize;
}

/// Speciated reproduction.
#[derive(Debug, Clone, Default)]
pub struct TribeReproduction {
    species: Vec<Species>,
    founded: Vec<Species>,
    next_species_id: SpeciesId,
}

impl TribeReproduction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Live species, founded ones included once settled.
    #[must_use]
    pub fn species(&self) -> &[Species] {
        &self.species
    }

    /// Divide each member's raw fitness by its species size and total it per
    /// species. Returns the species index and key of the best raw genome.
    fn share_fitness(&mut self, genomes: &mut SlotMap<GenomeKey, Dna>) -> Option<(usize, GenomeKey)> {
        let mut champion: Option<(usize, GenomeKey, f64)> = None;

        for (index, species) in self.species.iter_mut().enumerate() {
            let size = species.len() as f64;
            let mut total = 0.0;
            for &key in species.members() {
                let Some(dna) = genomes.get_mut(key) else {
                    continue;
                };
                let raw = dna.fitness.unwrap_or(0.0);
                if champion.map_or(true, |(_, _, best)| raw > best) {
                    champion = Some((index, key, raw));
                }
                let shared = raw / size;
                dna.fitness = Some(shared);
                total += shared;
            }
            species.fitness = total;
        }

        champion.map(|(index, key, _)| (index, key))
    }
}

impl Reproduction for TribeReproduction {
    fn assign(&mut self, key: GenomeKey, genome: &Dna, config: &PopulationConfig) {
        for species in self.species.iter_mut().chain(self.founded.iter_mut()) {
            if species.is_compatible(genome, config) {
                species.add(key);
                return;
            }
        }

        self.next_species_id += 1;
        let id = self.next_species_id;
        self.founded.push(Species::new(id, genome, key));
        debug!(species = id, genome = genome.id, "species founded");
    }

    fn settle(&mut self) {
        self.species.append(&mut self.founded);
        self.species.retain(|species| {
            if species.is_empty() {
                debug!(species = species.id, "species eradicated");
            }
            !species.is_empty()
        });
    }

    fn reproduce<R: Rng>(
        &mut self,
        genomes: &mut SlotMap<GenomeKey, Dna>,
        breeding: &mut Breeding<'_, R>,
    ) -> Vec<Dna> {
        let config = breeding.config;
        let Some((champion, champion_key)) = self.share_fitness(genomes) else {
            return Vec::new();
        };
        if let Some(best) = genomes.get(champion_key) {
            self.species[champion].set_representative(best);
        }

        let fitness: Vec<f64> = self.species.iter().map(|s| s.fitness).collect();
        let quotas = allocate_offspring(&fitness, champion, config.population_size);

        for (species, quota) in self.species.iter_mut().zip(quotas) {
            species.offspring = quota;
            species.sort_by_fitness(genomes);
            species.cull(config.kill_fraction_before_reproduction);
            species.archive();
            debug!(species = species.id, quota, parents = species.previous().len(), "offspring quota");
        }

        let mut offspring = Vec::with_capacity(config.population_size);
        for species in &mut self.species {
            for _ in 0..species.offspring {
                let parents = species
                    .random_parent(breeding.rng)
                    .zip(species.random_parent(breeding.rng));
                let Some((mother, father)) = parents else {
                    break;
                };
                let (Some(mother), Some(father)) = (genomes.get(mother), genomes.get(father)) else {
                    continue;
                };

                let child_id = breeding.next_genome_id();
                let child = father
                    .breed(mother, child_id, config, breeding.registry, breeding.rng)
                    .unwrap_or_else(|err| {
                        warn!(error = %err, genome = child_id, "crossover failed, cloning parent");
                        let mut clone = father.clone();
                        clone.id = child_id;
                        clone.fitness = None;
                        clone
                    });
                offspring.push(child);
            }
            species.offspring = 0;
            species.fitness = 0.0;
            species.clear_previous();
        }

        offspring
    }

    fn group_count(&self) -> usize {
        self.species.len()
    }
}
