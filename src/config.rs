//! Population configuration.
//!
//! [`PopulationConfig`] carries every rate and coefficient used by genome
//! mutation, crossover, speciation and the reproduction epoch. It can be built
//! in code or loaded from TOML; missing keys fall back to the defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Malformed configuration. Fatal to the run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    RateOutOfRange { name: &'static str, value: f64 },

    #[error("{name} must be finite, got {value}")]
    NotFinite { name: &'static str, value: f64 },

    #[error("{name} must be at least 1")]
    Zero { name: &'static str },

    #[error("kill_fraction_before_reproduction must be below 1, got {0}")]
    KillsEverything(f64),

    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Configuration for one population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    /// Number of genomes per generation.
    pub population_size: usize,
    /// Number of input nodes.
    pub num_inputs: usize,
    /// Number of output nodes.
    pub num_outputs: usize,
    /// Coefficient `c` of `1 / (1 + e^(x * c))`; negative so output grows with activity.
    pub sigmoid_coefficient: f64,
    /// Per-gene chance of weight replacement once a weight mutation fires.
    pub per_weight_mutation_rate: f64,
    /// Chance that an offspring undergoes weight mutation.
    pub weight_mutation_rate: f64,
    /// Chance that an offspring gains a link.
    pub link_mutation_rate: f64,
    /// Chance that an offspring has one link disabled.
    pub link_disable_rate: f64,
    /// Chance that an offspring gains a hidden node.
    pub node_mutation_rate: f64,
    /// Chance that a gene disabled in either parent stays disabled in the child.
    pub disabled_rate: f64,
    /// Chance that a matching gene is inherited from the fitter parent.
    pub inherit_from_higher_fit_rate: f64,
    /// `c1`: weight of excess genes in the compatibility measure.
    pub excess_coefficient: f64,
    /// `c2`: weight of disjoint genes in the compatibility measure.
    pub disjoint_coefficient: f64,
    /// `c3`: weight of the average weight difference in the compatibility measure.
    pub weight_coefficient: f64,
    /// Compatibility threshold for joining a species.
    pub compatibility_threshold: f64,
    /// Fraction of each species discarded, lowest fitness first, before breeding.
    pub kill_fraction_before_reproduction: f64,
    /// Seed for the population RNG. `None` seeds from the thread RNG.
    pub seed: Option<u64>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            num_inputs: 2,
            num_outputs: 1,
            sigmoid_coefficient: -4.9,
            per_weight_mutation_rate: 0.9,
            weight_mutation_rate: 0.8,
            link_mutation_rate: 0.1,
            link_disable_rate: 0.1,
            node_mutation_rate: 0.05,
            disabled_rate: 0.75,
            inherit_from_higher_fit_rate: 0.8,
            excess_coefficient: 1.0,
            disjoint_coefficient: 1.0,
            weight_coefficient: 0.4,
            compatibility_threshold: 3.0,
            kill_fraction_before_reproduction: 0.5,
            seed: None,
        }
    }
}

impl PopulationConfig {
    /// Default rates with the given shape.
    #[must_use]
    pub fn new(population_size: usize, num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            population_size,
            num_inputs,
            num_outputs,
            ..Default::default()
        }
    }

    /// Same config with a fixed RNG seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Parse a TOML document. Missing keys take their default value.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Toml`] for malformed documents, or the validation error
    /// of the first out-of-range parameter.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] when the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check every numeric parameter.
    ///
    /// # Errors
    ///
    /// Returns the first violation found: a zero size or node count, a rate
    /// outside `[0, 1]`, a non-finite coefficient, or a kill fraction of 1.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("population_size", self.population_size),
            ("num_inputs", self.num_inputs),
            ("num_outputs", self.num_outputs),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { name });
            }
        }

        for (name, value) in [
            ("per_weight_mutation_rate", self.per_weight_mutation_rate),
            ("weight_mutation_rate", self.weight_mutation_rate),
            ("link_mutation_rate", self.link_mutation_rate),
            ("link_disable_rate", self.link_disable_rate),
            ("node_mutation_rate", self.node_mutation_rate),
            ("disabled_rate", self.disabled_rate),
            ("inherit_from_higher_fit_rate", self.inherit_from_higher_fit_rate),
            (
                "kill_fraction_before_reproduction",
                self.kill_fraction_before_reproduction,
            ),
        ] {
            // NaN fails the range check too
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::RateOutOfRange { name, value });
            }
        }

        for (name, value) in [
            ("sigmoid_coefficient", self.sigmoid_coefficient),
            ("excess_coefficient", self.excess_coefficient),
            ("disjoint_coefficient", self.disjoint_coefficient),
            ("weight_coefficient", self.weight_coefficient),
            ("compatibility_threshold", self.compatibility_threshold),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { name, value });
            }
        }

        if self.kill_fraction_before_reproduction >= 1.0 {
            return Err(ConfigError::KillsEverything(
                self.kill_fraction_before_reproduction,
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PopulationConfig::default().validate().is_ok());
        assert!(PopulationConfig::new(20, 2, 1).validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_shape() {
        let config = PopulationConfig::new(0, 2, 1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero {
                name: "population_size"
            })
        ));

        let config = PopulationConfig::new(10, 2, 0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero { name: "num_outputs" })
        ));
    }

    #[test]
    fn test_rejects_bad_rates() {
        let config = PopulationConfig {
            disabled_rate: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RateOutOfRange {
                name: "disabled_rate",
                ..
            })
        ));

        let config = PopulationConfig {
            link_mutation_rate: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PopulationConfig {
            kill_fraction_before_reproduction: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::KillsEverything(_))
        ));
    }

    #[test]
    fn test_rejects_non_finite_coefficient() {
        let config = PopulationConfig {
            sigmoid_coefficient: f64::INFINITY,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotFinite {
                name: "sigmoid_coefficient",
                ..
            })
        ));
    }

    #[test]
    fn test_toml_partial_document() {
        let config = PopulationConfig::from_toml_str(
            "population_size = 20\nnum_inputs = 3\nseed = 7\nnode_mutation_rate = 0.2\n",
        )
        .unwrap();
        assert_eq!(config.population_size, 20);
        assert_eq!(config.num_inputs, 3);
        assert_eq!(config.num_outputs, 1);
        assert_eq!(config.seed, Some(7));
        assert!((config.node_mutation_rate - 0.2).abs() < 1e-12);
        assert!((config.sigmoid_coefficient + 4.9).abs() < 1e-12);
    }

    #[test]
    fn test_toml_rejects_malformed_and_invalid() {
        assert!(matches!(
            PopulationConfig::from_toml_str("population_size = \"many\""),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            PopulationConfig::from_toml_str("weight_mutation_rate = -0.1"),
            Err(ConfigError::RateOutOfRange { .. })
        ));
    }

    #[test]
    fn test_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("population.toml");
        std::fs::write(&path, "population_size = 12\ncompatibility_threshold = 2.5\n").unwrap();

        let config = PopulationConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.population_size, 12);
        assert!((config.compatibility_threshold - 2.5).abs() < 1e-12);

        let missing = PopulationConfig::from_toml_file(dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
