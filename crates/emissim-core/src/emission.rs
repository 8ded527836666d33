//! Emission Source Model - simulated pollutant sensor for one vehicle
//!
//! Generates noisy CO/NOx/HC/CO2 readings around the baseline of a fuel
//! profile. Roughly one tick in a hundred carries a spike that raises all
//! four pollutants together.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single uniform draw above this value triggers a spike
pub const SPIKE_THRESHOLD: f64 = 0.99;

/// Sensor noise for CO, NOx and HC as a fraction of the baseline
const NOISE_FRACTION: f64 = 0.05;
/// Sensor noise for CO2 in ppm
const CO2_NOISE_PPM: f64 = 15.0;

const SPIKE_CO_FACTOR: f64 = 2.0;
const SPIKE_NOX_FACTOR: f64 = 2.0;
const SPIKE_HC_FACTOR: f64 = 2.5;
const SPIKE_CO2_OFFSET: f64 = 300.0;

/// Measured pollutant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Carbon monoxide
    Co,
    /// Nitrogen oxides
    Nox,
    /// Hydrocarbons
    Hc,
    /// Carbon dioxide, in ppm
    Co2,
}

impl Metric {
    /// All metrics in wire order
    pub const ALL: [Metric; 4] = [Metric::Co, Metric::Nox, Metric::Hc, Metric::Co2];

    /// Position in [`Metric::ALL`]
    pub fn index(&self) -> usize {
        match self {
            Metric::Co => 0,
            Metric::Nox => 1,
            Metric::Hc => 2,
            Metric::Co2 => 3,
        }
    }
}

/// Fuel class of a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FuelProfile {
    /// Petrol engine
    Petrol,
    /// Diesel engine
    Diesel,
    /// Compressed natural gas
    Cng,
}

/// Per-metric levels for a fuel profile (means or standard deviations)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Levels {
    /// CO level
    pub co: f64,
    /// NOx level
    pub nox: f64,
    /// HC level
    pub hc: f64,
    /// CO2 level in ppm
    pub co2: f64,
}

impl FuelProfile {
    /// All fuel profiles
    pub const ALL: [FuelProfile; 3] = [FuelProfile::Petrol, FuelProfile::Diesel, FuelProfile::Cng];

    /// Mean pollutant levels before noise or spike
    pub fn baseline(&self) -> Levels {
        match self {
            FuelProfile::Diesel => Levels { co: 1.2, nox: 0.55, hc: 0.04, co2: 1500.0 },
            FuelProfile::Petrol => Levels { co: 0.6, nox: 0.25, hc: 0.03, co2: 1200.0 },
            FuelProfile::Cng => Levels { co: 0.35, nox: 0.15, hc: 0.02, co2: 1000.0 },
        }
    }

    /// Standard deviation of the sensor noise per metric
    pub fn noise(&self) -> Levels {
        let base = self.baseline();
        Levels {
            co: NOISE_FRACTION * base.co,
            nox: NOISE_FRACTION * base.nox,
            hc: NOISE_FRACTION * base.hc,
            co2: CO2_NOISE_PPM,
        }
    }

    /// Lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            FuelProfile::Petrol => "petrol",
            FuelProfile::Diesel => "diesel",
            FuelProfile::Cng => "cng",
        }
    }
}

impl fmt::Display for FuelProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One instantaneous sensor reading, every value >= 0
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawSample {
    /// Carbon monoxide
    pub co: f64,
    /// Nitrogen oxides
    pub nox: f64,
    /// Hydrocarbons
    pub hc: f64,
    /// Unrounded CO2; see [`RawSample::co2_ppm`] for the emitted value
    pub co2: f64,
}

impl RawSample {
    /// Build a sample with the same value for every metric
    pub fn uniform(value: f64) -> Self {
        Self { co: value, nox: value, hc: value, co2: value }
    }

    /// CO2 as emitted: nearest integer
    pub fn co2_ppm(&self) -> u32 {
        round_ppm(self.co2)
    }

    /// Value of one metric
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Co => self.co,
            Metric::Nox => self.nox,
            Metric::Hc => self.hc,
            Metric::Co2 => self.co2,
        }
    }
}

/// Moving-average output of the sliding filter
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilteredSample {
    /// Mean carbon monoxide
    pub co: f64,
    /// Mean nitrogen oxides
    pub nox: f64,
    /// Mean hydrocarbons
    pub hc: f64,
    /// Mean CO2 in ppm, unrounded
    pub co2: f64,
}

impl FilteredSample {
    /// CO2 as emitted: nearest integer
    pub fn co2_ppm(&self) -> u32 {
        round_ppm(self.co2)
    }

    /// Value of one metric
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Co => self.co,
            Metric::Nox => self.nox,
            Metric::Hc => self.hc,
            Metric::Co2 => self.co2,
        }
    }
}

fn round_ppm(value: f64) -> u32 {
    value.max(0.0).round() as u32
}

/// Apply the correlated spike to all four metrics at once
pub fn apply_spike(sample: RawSample) -> RawSample {
    RawSample {
        co: sample.co * SPIKE_CO_FACTOR,
        nox: sample.nox * SPIKE_NOX_FACTOR,
        hc: sample.hc * SPIKE_HC_FACTOR,
        co2: sample.co2 + SPIKE_CO2_OFFSET,
    }
}

/// Stateful pollutant generator owned by one vehicle
pub struct EmissionModel {
    /// Fuel class
    fuel: FuelProfile,
    /// Cached baseline means
    baseline: Levels,
    /// Cached noise magnitudes
    sigma: Levels,
    /// Independent random stream for this vehicle
    rng: StdRng,
    /// Whether the last sample was a spike
    last_spike: bool,
}

impl EmissionModel {
    /// Create a model with a deterministic random stream
    pub fn new(fuel: FuelProfile, seed: u64) -> Self {
        Self::with_rng(fuel, StdRng::seed_from_u64(seed))
    }

    /// Create a model drawing from the given generator
    pub fn with_rng(fuel: FuelProfile, rng: StdRng) -> Self {
        Self {
            fuel,
            baseline: fuel.baseline(),
            sigma: fuel.noise(),
            rng,
            last_spike: false,
        }
    }

    /// Fuel class of this model
    pub fn fuel(&self) -> FuelProfile {
        self.fuel
    }

    /// Whether the most recent sample carried a spike
    pub fn last_was_spike(&self) -> bool {
        self.last_spike
    }

    /// Draw the next raw reading
    ///
    /// Four Gaussian draws (CO, NOx, HC, CO2 in that order) are followed by a
    /// single uniform draw that gates the spike for all metrics.
    pub fn sample(&mut self) -> RawSample {
        let mut sample = RawSample {
            co: self.baseline.co + self.gaussian() * self.sigma.co,
            nox: self.baseline.nox + self.gaussian() * self.sigma.nox,
            hc: self.baseline.hc + self.gaussian() * self.sigma.hc,
            co2: self.baseline.co2 + self.gaussian() * self.sigma.co2,
        };

        self.last_spike = self.rng.gen::<f64>() > SPIKE_THRESHOLD;
        if self.last_spike {
            sample = apply_spike(sample);
        }

        RawSample {
            co: sample.co.max(0.0),
            nox: sample.nox.max(0.0),
            hc: sample.hc.max(0.0),
            co2: sample.co2.max(0.0),
        }
    }

    fn gaussian(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }
}
