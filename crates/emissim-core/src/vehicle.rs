//! Vehicle identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::emission::FuelProfile;

/// Prefix of the printable vehicle identifier
pub const VEHICLE_ID_PREFIX: &str = "VEH-";

/// Numeric vehicle identifier, 1-based within a fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleId(pub u32);

impl VehicleId {
    /// Zero-based slot of this vehicle in the fleet
    pub fn index(&self) -> usize {
        self.0.saturating_sub(1) as usize
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:04}", VEHICLE_ID_PREFIX, self.0)
    }
}

impl FromStr for VehicleId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix(VEHICLE_ID_PREFIX)
            .ok_or_else(|| format!("vehicle id '{}' lacks the {} prefix", s, VEHICLE_ID_PREFIX))?;
        digits
            .parse::<u32>()
            .map(VehicleId)
            .map_err(|e| format!("vehicle id '{}': {}", s, e))
    }
}

/// A vehicle as created at fleet setup; immutable for the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleIdentity {
    /// Unique id (1..=N)
    pub id: VehicleId,
    /// Fuel class driving the emission baseline
    pub fuel: FuelProfile,
    /// Host address of the vehicle's network interface
    pub host: Ipv4Addr,
}
