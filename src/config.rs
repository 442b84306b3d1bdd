//! System configuration.
//!
//! Defaults reproduce the stock setup: five processes over four resource
//! types of ten units each, per-process ceiling five, priorities 1..=5 and
//! a simulation cycle every one to three seconds.

use crate::error::ConfigError;
use crate::state::Units;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Initial system shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Processes created at initialisation.
    pub processes: usize,
    /// Number of resource types.
    pub resource_types: usize,
    /// Capacity of each type.
    pub units_per_type: Units,
    /// Uniform per-type ceiling of each initial process.
    pub process_max: Units,
    /// Lowest priority drawn for initial processes.
    pub min_priority: u32,
    /// Highest priority drawn for initial processes.
    pub max_priority: u32,
    /// RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Background driver settings.
    pub simulation: SimulationConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            processes: 5,
            resource_types: 4,
            units_per_type: 10,
            process_max: 5,
            min_priority: 1,
            max_priority: 5,
            seed: None,
            simulation: SimulationConfig::default(),
        }
    }
}

/// Simulation driver pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Shortest sleep between cycles, in milliseconds.
    pub min_interval_ms: u64,
    /// Longest sleep between cycles, in milliseconds.
    pub max_interval_ms: u64,
    /// RNG seed for the driver; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
            max_interval_ms: 3000,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Draw the next inter-cycle sleep from `[min_interval_ms, max_interval_ms]`.
    /// An inverted range collapses to the minimum.
    pub fn next_interval(&self, rng: &mut fastrand::Rng) -> Duration {
        let max = self.max_interval_ms.max(self.min_interval_ms);
        Duration::from_millis(rng.u64(self.min_interval_ms..=max))
    }
}

impl SystemConfig {
    /// Parse and validate TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SystemConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no state can be built from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resource_types == 0 {
            return Err(ConfigError::Invalid("resource_types must be at least 1".into()));
        }
        if self.units_per_type < 0 || self.process_max < 0 {
            return Err(ConfigError::Invalid("unit counts must be non-negative".into()));
        }
        if self.min_priority > self.max_priority {
            return Err(ConfigError::Invalid(format!(
                "priority range {}..={} is empty",
                self.min_priority, self.max_priority
            )));
        }
        if self.simulation.min_interval_ms > self.simulation.max_interval_ms {
            return Err(ConfigError::Invalid(
                "simulation.min_interval_ms exceeds max_interval_ms".into(),
            ));
        }
        Ok(())
    }

    /// RNG for initialisation, seeded if configured.
    pub fn rng(&self) -> fastrand::Rng {
        self.seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed)
    }
}
