//! Simulation configuration
//!
//! Stored as JSON. Every field has a default, so a config file only needs the
//! values it changes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::emission::FuelProfile;
use crate::error::ConfigError;
use crate::net::LinkConfig;
use crate::sim::{duration_from_secs, SimTime};

/// Tolerance when checking that the fuel mix sums to one
const FUEL_MIX_TOLERANCE: f64 = 1e-6;

/// Largest fleet that fits 10.0.0.0/8 alongside the collector
const MAX_VEHICLES: u32 = (1 << 24) - 3;

/// Share of each fuel class in the fleet
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuelMix {
    /// Share of diesel vehicles
    pub diesel: f64,
    /// Share of petrol vehicles
    pub petrol: f64,
    /// Share of CNG vehicles
    pub cng: f64,
}

impl Default for FuelMix {
    fn default() -> Self {
        Self {
            diesel: 0.50,
            petrol: 0.35,
            cng: 0.15,
        }
    }
}

impl FuelMix {
    /// Map a uniform draw in [0, 1) to a fuel class
    pub fn choose(&self, draw: f64) -> FuelProfile {
        if draw < self.diesel {
            FuelProfile::Diesel
        } else if draw < self.diesel + self.petrol {
            FuelProfile::Petrol
        } else {
            FuelProfile::Cng
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let shares = [self.diesel, self.petrol, self.cng];
        let sum: f64 = shares.iter().sum();
        if shares.iter().any(|s| !s.is_finite() || *s < 0.0) || (sum - 1.0).abs() > FUEL_MIX_TOLERANCE {
            return Err(ConfigError::InvalidFuelMix {
                diesel: self.diesel,
                petrol: self.petrol,
                cng: self.cng,
            });
        }
        Ok(())
    }
}

/// Full configuration of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of vehicles
    pub num_vehicles: u32,
    /// Simulated run length in seconds
    pub duration_secs: f64,
    /// Seconds between ticks of one vehicle
    pub interval_secs: f64,
    /// Moving-average window length
    pub filter_window: usize,
    /// Seed for every random stream of the run
    pub seed: u64,
    /// Fleet fuel composition
    pub fuel_mix: FuelMix,
    /// Start time of the first vehicle
    pub start_offset_secs: f64,
    /// Extra start delay per vehicle index
    pub start_stagger_secs: f64,
    /// Vehicles stop this long before the end of the run
    pub stop_margin_secs: f64,
    /// UDP port of the collector
    pub collector_port: u16,
    /// Simulated link behaviour
    pub link: LinkConfig,
    /// Central emission log path
    pub emission_log: PathBuf,
    /// Collector log path
    pub collector_log: PathBuf,
    /// Optional JSON file for link statistics
    pub link_stats: Option<PathBuf>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_vehicles: 100,
            duration_secs: 120.0,
            interval_secs: 5.0,
            filter_window: 5,
            seed: 1,
            fuel_mix: FuelMix::default(),
            start_offset_secs: 1.0,
            start_stagger_secs: 0.01,
            stop_margin_secs: 0.1,
            collector_port: 4000,
            link: LinkConfig::default(),
            emission_log: PathBuf::from("emission_records.csv"),
            collector_log: PathBuf::from("server_received.csv"),
            link_stats: None,
        }
    }
}

impl SimulationConfig {
    /// Load a config file (missing fields take defaults) and validate it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Reject configurations that cannot run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_vehicles == 0 {
            return Err(ConfigError::NoVehicles);
        }
        if self.num_vehicles > MAX_VEHICLES {
            return Err(ConfigError::TooManyVehicles(self.num_vehicles));
        }
        if !(self.duration_secs.is_finite() && self.duration_secs > 0.0) {
            return Err(ConfigError::InvalidDuration(self.duration_secs));
        }
        if !(self.interval_secs.is_finite() && self.interval_secs > 0.0) {
            return Err(ConfigError::InvalidInterval(self.interval_secs));
        }
        if self.filter_window == 0 {
            return Err(ConfigError::InvalidWindow(self.filter_window));
        }
        self.fuel_mix.validate()?;
        for (field, value) in [
            ("start_offset_secs", self.start_offset_secs),
            ("start_stagger_secs", self.start_stagger_secs),
            ("stop_margin_secs", self.stop_margin_secs),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: format!("must be a non-negative number of seconds, got {}", value),
                });
            }
        }
        if !(0.0..=1.0).contains(&self.link.loss_rate) {
            return Err(ConfigError::InvalidLossRate(self.link.loss_rate));
        }
        if !(self.link.latency_ms.is_finite() && self.link.latency_ms >= 0.0) {
            return Err(ConfigError::InvalidLatency(self.link.latency_ms));
        }
        Ok(())
    }

    /// Tick interval
    pub fn interval(&self) -> Duration {
        duration_from_secs(self.interval_secs)
    }

    /// End of the run
    pub fn end_time(&self) -> SimTime {
        SimTime::from_secs_f64(self.duration_secs)
    }

    /// Start time of the vehicle at zero-based `index`
    pub fn start_time(&self, index: u32) -> SimTime {
        SimTime::from_secs_f64(self.start_offset_secs + f64::from(index) * self.start_stagger_secs)
    }

    /// Time at which every vehicle stops
    pub fn stop_time(&self) -> SimTime {
        SimTime::from_secs_f64(self.duration_secs - self.stop_margin_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        SimulationConfig::default().validate().unwrap();
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = SimulationConfig {
            filter_window: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidWindow(0))));
    }

    #[test]
    fn test_non_positive_interval_rejected() {
        for interval in [0.0, -1.0, f64::NAN] {
            let config = SimulationConfig {
                interval_secs: interval,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(ConfigError::InvalidInterval(_))));
        }
    }

    #[test]
    fn test_fuel_mix_must_sum_to_one() {
        let config = SimulationConfig {
            fuel_mix: FuelMix {
                diesel: 0.5,
                petrol: 0.5,
                cng: 0.5,
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFuelMix { .. })));
    }

    #[test]
    fn test_loss_rate_range() {
        let mut config = SimulationConfig::default();
        config.link.loss_rate = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLossRate(_))));
    }

    #[test]
    fn test_fuel_thresholds() {
        let mix = FuelMix::default();
        assert_eq!(mix.choose(0.0), FuelProfile::Diesel);
        assert_eq!(mix.choose(0.49), FuelProfile::Diesel);
        assert_eq!(mix.choose(0.50), FuelProfile::Petrol);
        assert_eq!(mix.choose(0.84), FuelProfile::Petrol);
        assert_eq!(mix.choose(0.85), FuelProfile::Cng);
        assert_eq!(mix.choose(0.999), FuelProfile::Cng);
    }

    #[test]
    fn test_staggered_start_times() {
        let config = SimulationConfig::default();
        assert_eq!(config.start_time(0), SimTime::from_secs_f64(1.0));
        assert_eq!(config.start_time(10), SimTime::from_secs_f64(1.1));
        assert_eq!(config.stop_time(), SimTime::from_secs_f64(119.9));
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sim.json");
        std::fs::write(&path, r#"{"num_vehicles": 3, "link": {"loss_rate": 0.1}}"#).unwrap();

        let config = SimulationConfig::load(&path).unwrap();
        assert_eq!(config.num_vehicles, 3);
        assert_eq!(config.link.loss_rate, 0.1);
        assert_eq!(config.link.latency_ms, 2.0);
        assert_eq!(config.filter_window, 5);
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sim.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(SimulationConfig::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_json_round_trip() {
        let config = SimulationConfig::default();
        let back: SimulationConfig = serde_json::from_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
