//! Data Logging
//!
//! Append-only CSV logs for emission records and collector receipts, and
//! playback of those files for later analysis.

mod format;
mod playback;
mod sink;

pub use format::{quote_field, split_row};
pub use playback::{
    parse_collector_log, parse_emission_log, read_collector_log, read_emission_log,
    EmissionPlayback, MetricMeans, VehicleSummary,
};
pub use sink::{CsvSink, LogSink};

use crate::emission::{FilteredSample, RawSample};
use crate::sim::SimTime;
use crate::vehicle::VehicleId;

/// Header row of the central emission log
pub const EMISSION_LOG_HEADER: &str =
    "vehicleId,simTime,rawCO,rawNOx,rawHC,rawCO2,filtCO,filtNOx,filtHC,filtCO2";

/// Header row of the collector log
pub const COLLECTOR_LOG_HEADER: &str = "time,bytes,payload";

/// A record type that can be written as one CSV row
pub trait CsvRecord {
    /// Header row, without line terminator
    const HEADER: &'static str;

    /// The complete row, without line terminator
    fn to_row(&self) -> String;
}

/// One tick of one vehicle, as written to the central log
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionRecord {
    /// Vehicle that produced the reading
    pub vehicle_id: VehicleId,
    /// Tick time
    pub time: SimTime,
    /// Instantaneous reading
    pub raw: RawSample,
    /// Moving average after this reading
    pub filtered: FilteredSample,
}

impl CsvRecord for EmissionRecord {
    const HEADER: &'static str = EMISSION_LOG_HEADER;

    fn to_row(&self) -> String {
        format!(
            "{},{},{:.3},{:.3},{:.3},{},{:.3},{:.3},{:.3},{}",
            self.vehicle_id,
            self.time,
            self.raw.co,
            self.raw.nox,
            self.raw.hc,
            self.raw.co2_ppm(),
            self.filtered.co,
            self.filtered.nox,
            self.filtered.hc,
            self.filtered.co2_ppm(),
        )
    }
}

/// One datagram as seen by the collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRecord {
    /// Time of receipt
    pub time: SimTime,
    /// Payload length in bytes
    pub bytes: usize,
    /// Payload text
    pub payload: String,
}

impl CsvRecord for ReceivedRecord {
    const HEADER: &'static str = COLLECTOR_LOG_HEADER;

    fn to_row(&self) -> String {
        format!("{},{},{}", self.time, self.bytes, quote_field(&self.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_emission_row() {
        let record = EmissionRecord {
            vehicle_id: VehicleId(3),
            time: SimTime::from_secs_f64(6.2),
            raw: RawSample { co: 1.23456, nox: 0.5, hc: 0.0414, co2: 1499.5 },
            filtered: FilteredSample { co: 1.2, nox: 0.55, hc: 0.04, co2: 1500.0 },
        };
        assert_eq!(
            record.to_row(),
            "VEH-0003,6.200,1.235,0.500,0.041,1500,1.200,0.550,0.040,1500"
        );
    }

    #[test]
    fn test_received_row_quotes_payload() {
        let payload = r#"{"vehicleId":"VEH-0007"}"#;
        let record = ReceivedRecord {
            time: SimTime::from_secs_f64(12.5),
            bytes: payload.len(),
            payload: payload.to_string(),
        };
        assert_eq!(record.to_row(), r#"12.500,24,"{""vehicleId"":""VEH-0007""}""#);
    }
}
