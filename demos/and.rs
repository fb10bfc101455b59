//! AND gate example.
//!
//! Evolves a network that answers like a two-input AND gate, driving the
//! population through the request/report protocol. The best network is saved
//! as a text snapshot and reloaded to show the persisted form.
//!
//! Run with: `RUST_LOG=info cargo run --example and`

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tribal_neat::{Phenotype, Population, PopulationConfig};

const TRIALS: usize = 20_000;

const TRUTH_TABLE: [(f64, f64, bool); 4] = [
    (0.0, 0.0, false),
    (0.0, 1.0, false),
    (1.0, 0.0, false),
    (1.0, 1.0, true),
];

/// Number of input pairs answered correctly. Outputs below 0.5 read as false.
fn evaluate(phenotype: &mut Phenotype) -> Result<f64, Box<dyn std::error::Error>> {
    let mut fitness = 0.0;
    for (a, b, expected) in TRUTH_TABLE {
        let mut output = Vec::new();
        for _ in 0..4 {
            output = phenotype.activate(&[a, b])?;
        }
        if (output[0] >= 0.5) == expected {
            fitness += 1.0;
        }
        phenotype.reset_activity();
    }
    Ok(fitness)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("NEAT AND Example");
    println!("================\n");

    let config = PopulationConfig {
        link_mutation_rate: 0.2,
        node_mutation_rate: 0.1,
        ..PopulationConfig::new(20, 2, 1).with_seed(42)
    };
    let mut population = Population::new(config)?;

    let mut champion = None;
    for trial in 1..=TRIALS {
        let mut phenotype = population.request_phenotype()?;
        let fitness = evaluate(&mut phenotype)?;
        population.report_fitness(&phenotype, fitness)?;

        if fitness == 4.0 {
            println!("Solved after {trial} trials in generation {}", population.generation());
            champion = Some(phenotype);
            break;
        }
    }

    match &champion {
        Some(_) => population.kill("AND network found"),
        None => population.kill(format!("AND network not produced in {TRIALS} trials")),
    }

    println!();
    for report in population.history().iter().step_by(10) {
        println!(
            "Gen {:4}: best={:.1}, avg={:.3}, species={}",
            report.generation, report.best_fitness, report.average_fitness, report.species_count
        );
    }

    let Some(champion) = champion else {
        println!("\nNo solution found.");
        return Ok(());
    };

    let dir = std::env::temp_dir().join("tribal-neat-and");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("champion.txt");
    champion.save_text(&path)?;
    println!("\nChampion saved to {}", path.display());
    println!("{}", champion.to_snapshot_string());

    let mut loaded = Phenotype::load_text(&path, champion.sigmoid_coefficient())?;
    println!("Reloaded champion outputs:");
    for (a, b, expected) in TRUTH_TABLE {
        let mut output = Vec::new();
        for _ in 0..4 {
            output = loaded.activate(&[a, b])?;
        }
        loaded.reset_activity();
        let status = if (output[0] >= 0.5) == expected { "ok" } else { "wrong" };
        println!("  {a} AND {b} = {:.4} ({status})", output[0]);
    }
    Ok(())
}
