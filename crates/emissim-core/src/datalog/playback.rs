//! Log playback
//!
//! Reads emission and collector logs back and summarises them per vehicle.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::{split_row, EmissionRecord, ReceivedRecord, COLLECTOR_LOG_HEADER, EMISSION_LOG_HEADER};
use crate::emission::{FilteredSample, RawSample};
use crate::error::PlaybackError;
use crate::sim::SimTime;
use crate::vehicle::VehicleId;

/// Parse the text of a central emission log
pub fn parse_emission_log(text: &str) -> Result<Vec<EmissionRecord>, PlaybackError> {
    let mut records = Vec::new();
    for (line_no, line) in data_lines(text, EMISSION_LOG_HEADER)? {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 10 {
            return Err(malformed(line_no, format!("expected 10 fields, got {}", fields.len())));
        }
        let vehicle_id = fields[0]
            .parse::<VehicleId>()
            .map_err(|e| malformed(line_no, e))?;
        let number = |i: usize| parse_field::<f64>(fields[i], line_no);
        let ppm = |i: usize| parse_field::<u32>(fields[i], line_no).map(f64::from);

        records.push(EmissionRecord {
            vehicle_id,
            time: SimTime::from_secs_f64(number(1)?),
            raw: RawSample {
                co: number(2)?,
                nox: number(3)?,
                hc: number(4)?,
                co2: ppm(5)?,
            },
            filtered: FilteredSample {
                co: number(6)?,
                nox: number(7)?,
                hc: number(8)?,
                co2: ppm(9)?,
            },
        });
    }
    Ok(records)
}

/// Read a central emission log from disk
pub fn read_emission_log<P: AsRef<Path>>(path: P) -> Result<Vec<EmissionRecord>, PlaybackError> {
    parse_emission_log(&fs::read_to_string(path)?)
}

/// Parse the text of a collector log
pub fn parse_collector_log(text: &str) -> Result<Vec<ReceivedRecord>, PlaybackError> {
    let mut records = Vec::new();
    for (line_no, line) in data_lines(text, COLLECTOR_LOG_HEADER)? {
        let fields =
            split_row(line).ok_or_else(|| malformed(line_no, "unterminated quoted field"))?;
        if fields.len() != 3 {
            return Err(malformed(line_no, format!("expected 3 fields, got {}", fields.len())));
        }
        records.push(ReceivedRecord {
            time: SimTime::from_secs_f64(parse_field(&fields[0], line_no)?),
            bytes: parse_field(&fields[1], line_no)?,
            payload: fields[2].clone(),
        });
    }
    Ok(records)
}

/// Read a collector log from disk
pub fn read_collector_log<P: AsRef<Path>>(path: P) -> Result<Vec<ReceivedRecord>, PlaybackError> {
    parse_collector_log(&fs::read_to_string(path)?)
}

/// Check the header and yield (1-based line number, line) for each data row
fn data_lines<'a>(
    text: &'a str,
    header: &str,
) -> Result<impl Iterator<Item = (usize, &'a str)>, PlaybackError> {
    let mut lines = text.lines().map(|l| l.trim_end_matches('\r'));
    let found = lines.next().unwrap_or_default();
    if found != header {
        return Err(PlaybackError::BadHeader {
            expected: header.to_string(),
            found: found.to_string(),
        });
    }
    Ok(lines
        .enumerate()
        .map(|(i, line)| (i + 2, line))
        .filter(|(_, line)| !line.is_empty()))
}

fn parse_field<T>(field: &str, line: usize) -> Result<T, PlaybackError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    field
        .parse()
        .map_err(|e: T::Err| malformed(line, format!("'{}': {}", field, e)))
}

fn malformed(line: usize, message: impl Into<String>) -> PlaybackError {
    PlaybackError::MalformedRow {
        line,
        message: message.into(),
    }
}

/// Mean value per metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricMeans {
    /// Mean CO
    pub co: f64,
    /// Mean NOx
    pub nox: f64,
    /// Mean HC
    pub hc: f64,
    /// Mean CO2 in ppm
    pub co2: f64,
}

/// Per-vehicle digest of an emission log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleSummary {
    /// Vehicle summarised
    pub vehicle_id: VehicleId,
    /// Rows logged for it
    pub ticks: usize,
    /// Time of its first row
    pub first_time_secs: f64,
    /// Time of its last row
    pub last_time_secs: f64,
    /// Mean of the raw readings
    pub mean_raw: MetricMeans,
    /// Mean of the filtered readings
    pub mean_filtered: MetricMeans,
    /// Largest raw CO seen
    pub max_raw_co: f64,
}

fn mean_of(records: &[&EmissionRecord], value: impl Fn(&EmissionRecord) -> f64) -> f64 {
    let sum: f64 = records.iter().map(|r| value(*r)).sum();
    sum / records.len().max(1) as f64
}

/// Emission log loaded for analysis
pub struct EmissionPlayback {
    /// Records in file order
    records: Vec<EmissionRecord>,
}

impl EmissionPlayback {
    /// Wrap already parsed records
    pub fn new(records: Vec<EmissionRecord>) -> Self {
        Self { records }
    }

    /// Load an emission log from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PlaybackError> {
        Ok(Self::new(read_emission_log(path)?))
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Latest record time
    pub fn duration(&self) -> Duration {
        self.records
            .iter()
            .map(|r| r.time.as_duration())
            .max()
            .unwrap_or_default()
    }

    /// All records
    pub fn records(&self) -> &[EmissionRecord] {
        &self.records
    }

    /// Records with `start <= time <= end`
    pub fn records_in_range(
        &self,
        start: SimTime,
        end: SimTime,
    ) -> impl Iterator<Item = &EmissionRecord> {
        self.records
            .iter()
            .filter(move |r| r.time >= start && r.time <= end)
    }

    /// Records of one vehicle in file order
    pub fn vehicle_records(&self, id: VehicleId) -> impl Iterator<Item = &EmissionRecord> {
        self.records.iter().filter(move |r| r.vehicle_id == id)
    }

    /// Per-vehicle summaries ordered by vehicle id
    pub fn summarize(&self) -> Vec<VehicleSummary> {
        let mut groups: BTreeMap<VehicleId, Vec<&EmissionRecord>> = BTreeMap::new();
        for record in &self.records {
            groups.entry(record.vehicle_id).or_default().push(record);
        }

        groups
            .into_iter()
            .map(|(vehicle_id, records)| {
                VehicleSummary {
                    vehicle_id,
                    ticks: records.len(),
                    first_time_secs: records
                        .iter()
                        .map(|r| r.time.as_secs_f64())
                        .fold(f64::INFINITY, f64::min),
                    last_time_secs: records
                        .iter()
                        .map(|r| r.time.as_secs_f64())
                        .fold(0.0, f64::max),
                    mean_raw: MetricMeans {
                        co: mean_of(&records, |r| r.raw.co),
                        nox: mean_of(&records, |r| r.raw.nox),
                        hc: mean_of(&records, |r| r.raw.hc),
                        co2: mean_of(&records, |r| r.raw.co2),
                    },
                    mean_filtered: MetricMeans {
                        co: mean_of(&records, |r| r.filtered.co),
                        nox: mean_of(&records, |r| r.filtered.nox),
                        hc: mean_of(&records, |r| r.filtered.hc),
                        co2: mean_of(&records, |r| r.filtered.co2),
                    },
                    max_raw_co: records.iter().map(|r| r.raw.co).fold(0.0, f64::max),
                }
            })
            .collect()
    }
}
