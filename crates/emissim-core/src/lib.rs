//! # emissim Core Library
//!
//! Discrete-event simulation of a vehicle fleet streaming emission telemetry
//! to a roadside collector.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Per-fuel emission source models with correlated spikes
//! - Sliding-window moving-average filtering
//! - Periodic per-vehicle transmission over a simulated datagram network
//! - Central emission and collector CSV logs, with playback
//! - A fleet runner driving everything from one seeded configuration
//!
//! ## Example
//!
//! ```rust,ignore
//! use emissim_core::prelude::*;
//!
//! let config = SimulationConfig {
//!     num_vehicles: 10,
//!     duration_secs: 60.0,
//!     ..Default::default()
//! };
//! let summary = Fleet::new(config)?.run()?;
//! println!("{} ticks, {} received", summary.ticks, summary.records_received);
//! ```

pub mod collector;
pub mod config;
pub mod datalog;
pub mod emission;
pub mod error;
pub mod filter;
pub mod fleet;
pub mod net;
pub mod payload;
pub mod sim;
pub mod transmitter;
pub mod vehicle;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::collector::Collector;
    pub use crate::config::{FuelMix, SimulationConfig};
    pub use crate::datalog::{
        CsvSink, EmissionPlayback, EmissionRecord, LogSink, ReceivedRecord, VehicleSummary,
    };
    pub use crate::emission::{EmissionModel, FilteredSample, FuelProfile, Metric, RawSample};
    pub use crate::error::{ConfigError, LogWriteError, PlaybackError, SimError, TransmitError};
    pub use crate::filter::SlidingFilter;
    pub use crate::fleet::{Fleet, RunSummary};
    pub use crate::net::{LinkConfig, LinkStats, Network, Transport};
    pub use crate::payload::{EmissionPayload, ParsedPayload};
    pub use crate::sim::{Clock, EventQueue, SimEvent, SimTime};
    pub use crate::transmitter::VehicleTransmitter;
    pub use crate::vehicle::{VehicleId, VehicleIdentity};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
