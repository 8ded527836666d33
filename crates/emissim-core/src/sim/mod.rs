//! Discrete-event timeline
//!
//! A single logical clock shared by every vehicle and the collector. Callbacks
//! run one at a time; events with the same timestamp fire in the order they
//! were scheduled.

mod queue;

pub use queue::EventQueue;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddrV4;
use std::ops::Add;
use std::time::Duration;

use crate::vehicle::VehicleId;

/// Simulated time since the start of the run
///
/// Wraps a [`Duration`], so ordering and arithmetic are exact to the nanosecond.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SimTime(Duration);

impl SimTime {
    /// Start of the run
    pub const ZERO: SimTime = SimTime(Duration::ZERO);

    /// Time from seconds, rounded to the nanosecond; negative or NaN input maps to zero
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(duration_from_secs(secs))
    }

    /// Seconds since start
    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    /// Offset since start
    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// Elapsed time from `earlier` to `self`, zero if `earlier` is later
    pub fn saturating_since(&self, earlier: SimTime) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> SimTime {
        SimTime(self.0.saturating_add(rhs))
    }
}

impl From<Duration> for SimTime {
    fn from(d: Duration) -> Self {
        SimTime(d)
    }
}

/// Seconds with millisecond precision, as written to payloads and logs
impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.as_secs_f64())
    }
}

/// Seconds to a duration rounded to the nanosecond, without panicking
pub(crate) fn duration_from_secs(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_nanos((secs * 1e9).round() as u64)
}

/// Handle of a scheduled event, used for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub(crate) u64);

/// Something that happens at a point on the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    /// Vehicle application starts
    StartVehicle(VehicleId),
    /// Vehicle fires its sample/transmit/log cycle
    Tick(VehicleId),
    /// Vehicle application stops
    StopVehicle(VehicleId),
    /// A datagram reaches the given endpoint
    Arrival(SocketAddrV4),
}

/// Timeline capability handed to callbacks
pub trait Clock {
    /// Current simulated time
    fn now(&self) -> SimTime;

    /// Schedule `event` to fire `delay` after now
    fn schedule_after(&mut self, delay: Duration, event: SimEvent) -> EventId;

    /// Cancel a pending event; returns false if it already fired or was cancelled
    fn cancel(&mut self, id: EventId) -> bool;
}

/// Derive an independent seed for one random stream of a run
///
/// SplitMix64 over `run_seed` and `stream`, so neighbouring vehicle ids get
/// uncorrelated generators.
pub fn stream_seed(run_seed: u64, stream: u64) -> u64 {
    let mut z = run_seed
        .wrapping_add(stream.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
