//! Wire payload
//!
//! Datagram body carrying one raw and one filtered reading:
//!
//! ```text
//! {"vehicleId":"VEH-0007","time":12.500,"raw":{"CO":1.260,"NOx":0.580,"HC":0.042,"CO2":1510},"filtered":{...}}
//! ```
//!
//! The writer is hand formatted so field order and precision are fixed; the
//! reader goes through serde_json and accepts any numeric precision.

use serde::Deserialize;

use crate::emission::{FilteredSample, RawSample};
use crate::sim::SimTime;
use crate::vehicle::VehicleId;

/// Outgoing payload for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionPayload {
    /// Sending vehicle
    pub vehicle_id: VehicleId,
    /// Send time
    pub time: SimTime,
    /// Instantaneous reading
    pub raw: RawSample,
    /// Moving average
    pub filtered: FilteredSample,
}

impl EmissionPayload {
    /// Create a payload
    pub fn new(vehicle_id: VehicleId, time: SimTime, raw: RawSample, filtered: FilteredSample) -> Self {
        Self {
            vehicle_id,
            time,
            raw,
            filtered,
        }
    }

    /// Serialize to the wire text
    pub fn to_json(&self) -> String {
        format!(
            "{{\"vehicleId\":\"{}\",\"time\":{},\"raw\":{},\"filtered\":{}}}",
            self.vehicle_id,
            self.time,
            readings_json(self.raw.co, self.raw.nox, self.raw.hc, self.raw.co2_ppm()),
            readings_json(
                self.filtered.co,
                self.filtered.nox,
                self.filtered.hc,
                self.filtered.co2_ppm()
            ),
        )
    }
}

fn readings_json(co: f64, nox: f64, hc: f64, co2: u32) -> String {
    format!(
        "{{\"CO\":{:.3},\"NOx\":{:.3},\"HC\":{:.3},\"CO2\":{}}}",
        co, nox, hc, co2
    )
}

/// Pollutant block of a decoded payload
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PayloadReadings {
    /// Carbon monoxide
    #[serde(rename = "CO")]
    pub co: f64,
    /// Nitrogen oxides
    #[serde(rename = "NOx")]
    pub nox: f64,
    /// Hydrocarbons
    #[serde(rename = "HC")]
    pub hc: f64,
    /// Carbon dioxide in ppm
    #[serde(rename = "CO2")]
    pub co2: u32,
}

/// Payload decoded on the receiving side
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedPayload {
    /// Vehicle id text, normally `VEH-nnnn`
    pub vehicle_id: String,
    /// Send time in seconds
    pub time: f64,
    /// Instantaneous reading
    pub raw: PayloadReadings,
    /// Moving average
    pub filtered: PayloadReadings,
}

impl ParsedPayload {
    /// Decode wire text
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Numeric vehicle id, if the id has the expected form
    pub fn vehicle(&self) -> Option<VehicleId> {
        self.vehicle_id.parse().ok()
    }
}
