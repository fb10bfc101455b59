//! Benchmarks for tribal-neat.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tribal_neat::{compatibility_distance, Dna, InnovationRegistry, Population, PopulationConfig};

fn registry_for(inputs: usize, outputs: usize) -> InnovationRegistry {
    let mut registry = InnovationRegistry::new();
    for _ in 0..inputs + outputs {
        registry.next_node_id();
    }
    registry
}

/// A genome grown by a few rounds of structural mutation.
fn grown(id: u32, registry: &mut InnovationRegistry, rng: &mut ChaCha8Rng) -> Dna {
    let mut dna = Dna::initialized(id, 4, 2, registry, rng);
    for _ in 0..10 {
        dna.mutate_add_node(registry, rng);
        dna.mutate_add_link(registry, rng);
    }
    dna
}

fn bench_genome_creation(c: &mut Criterion) {
    c.bench_function("genome_initialized", |b| {
        let mut registry = registry_for(4, 2);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        b.iter(|| {
            black_box(Dna::initialized(1, 4, 2, &mut registry, &mut rng));
        });
    });
}

fn bench_mutation(c: &mut Criterion) {
    let config = PopulationConfig {
        link_mutation_rate: 0.3,
        node_mutation_rate: 0.1,
        ..PopulationConfig::new(100, 4, 2)
    };
    let mut registry = registry_for(4, 2);
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let genome = Dna::initialized(1, 4, 2, &mut registry, &mut rng);

    c.bench_function("genome_mutation", |b| {
        let mut g = genome.clone();
        b.iter(|| {
            g.mutate_offspring(&config, &mut registry, &mut rng);
            black_box(&g);
        });
    });
}

fn bench_crossover(c: &mut Criterion) {
    let config = PopulationConfig::new(100, 4, 2);
    let mut registry = registry_for(4, 2);
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let mut parent1 = grown(1, &mut registry, &mut rng);
    let mut parent2 = grown(2, &mut registry, &mut rng);
    parent1.fitness = Some(2.0);
    parent2.fitness = Some(1.0);

    c.bench_function("genome_crossover", |b| {
        b.iter(|| {
            black_box(parent1.crossover(&parent2, 3, &config, &mut rng));
        });
    });
}

fn bench_activation(c: &mut Criterion) {
    let mut registry = registry_for(4, 2);
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut phenotype = grown(1, &mut registry, &mut rng).to_phenotype(-4.9);

    c.bench_function("phenotype_activate", |b| {
        b.iter(|| {
            black_box(phenotype.activate(&[0.5, -0.5, 1.0, 0.0]));
        });
    });
}

fn bench_compatibility_distance(c: &mut Criterion) {
    let config = PopulationConfig::default();
    let mut registry = registry_for(4, 2);
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let genome1 = grown(1, &mut registry, &mut rng);
    let genome2 = grown(2, &mut registry, &mut rng);

    c.bench_function("compatibility_distance", |b| {
        b.iter(|| {
            black_box(compatibility_distance(&genome1, &genome2, &config));
        });
    });
}

fn bench_generation(c: &mut Criterion) {
    c.bench_function("population_generation_100", |b| {
        let config = PopulationConfig::new(100, 4, 2).with_seed(42);
        let mut population = Population::new(config).unwrap();
        b.iter(|| {
            let batch = population.request_batch(100).unwrap();
            for mut phenotype in batch {
                let output = phenotype.activate(&[0.5, -0.5, 1.0, 0.0]).unwrap();
                population.report_fitness(&phenotype, output[0]).unwrap();
            }
        });
    });
}

criterion_group!(
    benches,
    bench_genome_creation,
    bench_mutation,
    bench_crossover,
    bench_activation,
    bench_compatibility_distance,
    bench_generation,
);
criterion_main!(benches);
