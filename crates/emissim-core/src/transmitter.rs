//! Transmission Scheduler
//!
//! Per-vehicle timer loop: sample, filter, serialize, send, log, reschedule.
//! A transmitter exclusively owns its emission model and filter windows; the
//! clock, transport and central log are lent to it for the duration of one
//! callback.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::SocketAddrV4;
use std::time::Duration;

use tracing::{debug, warn};

use crate::datalog::{EmissionRecord, LogSink};
use crate::emission::EmissionModel;
use crate::error::{LogWriteError, TransmitError};
use crate::filter::SlidingFilter;
use crate::net::Transport;
use crate::payload::EmissionPayload;
use crate::sim::{duration_from_secs, Clock, EventId, SimEvent};
use crate::vehicle::VehicleIdentity;

/// Upper bound (exclusive) of the random delay before the first tick, in seconds
pub const MAX_START_JITTER_SECS: f64 = 0.5;

/// Lifecycle of a transmitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitterState {
    /// Created, not started
    Idle,
    /// A tick is pending
    Scheduled,
    /// Inside a tick
    Firing,
    /// Stopped; no further ticks
    Stopped,
}

/// Counters for one vehicle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitterStats {
    /// Ticks fired
    pub ticks: u64,
    /// Sends rejected by the transport
    pub transmit_failures: u64,
    /// Log appends that failed
    pub log_failures: u64,
    /// Samples that carried a spike
    pub spikes: u64,
}

/// What one tick produced
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Record handed to the central log
    pub record: EmissionRecord,
    /// Wire text sent (or attempted)
    pub payload: String,
    /// Transport outcome
    pub transmit: Result<usize, TransmitError>,
    /// Whether the sample carried a spike
    pub spike: bool,
}

/// Periodic sender for one vehicle
pub struct VehicleTransmitter {
    identity: VehicleIdentity,
    model: EmissionModel,
    filter: SlidingFilter,
    interval: Duration,
    collector: SocketAddrV4,
    jitter_rng: StdRng,
    socket: Option<SocketAddrV4>,
    pending: Option<EventId>,
    state: TransmitterState,
    stats: TransmitterStats,
}

impl VehicleTransmitter {
    /// Create an idle transmitter
    pub fn new(
        identity: VehicleIdentity,
        model: EmissionModel,
        filter: SlidingFilter,
        interval: Duration,
        collector: SocketAddrV4,
        jitter_seed: u64,
    ) -> Self {
        Self {
            identity,
            model,
            filter,
            interval,
            collector,
            jitter_rng: StdRng::seed_from_u64(jitter_seed),
            socket: None,
            pending: None,
            state: TransmitterState::Idle,
            stats: TransmitterStats::default(),
        }
    }

    /// Vehicle this transmitter belongs to
    pub fn identity(&self) -> &VehicleIdentity {
        &self.identity
    }

    /// Current lifecycle state
    pub fn state(&self) -> TransmitterState {
        self.state
    }

    /// Counters so far
    pub fn stats(&self) -> TransmitterStats {
        self.stats
    }

    /// The moving-average filter
    pub fn filter(&self) -> &SlidingFilter {
        &self.filter
    }

    /// Local socket, while started
    pub fn socket(&self) -> Option<SocketAddrV4> {
        self.socket
    }

    /// Pending tick, if any
    pub fn pending_event(&self) -> Option<EventId> {
        self.pending
    }

    /// Open the socket and schedule the first tick after a random jitter
    ///
    /// Does nothing unless the transmitter is idle.
    pub fn start(
        &mut self,
        clock: &mut dyn Clock,
        transport: &mut dyn Transport,
    ) -> Result<(), TransmitError> {
        if self.state != TransmitterState::Idle {
            return Ok(());
        }
        self.socket = Some(transport.open(self.identity.host)?);

        let jitter = self.jitter_rng.gen_range(0.0..MAX_START_JITTER_SECS);
        let delay = duration_from_secs(jitter);
        self.pending = Some(clock.schedule_after(delay, SimEvent::Tick(self.identity.id)));
        self.state = TransmitterState::Scheduled;

        debug!(
            vehicle = %self.identity.id,
            fuel = %self.identity.fuel,
            jitter_secs = jitter,
            "transmitter started"
        );
        Ok(())
    }

    /// Run one tick
    ///
    /// The record is appended whether or not the send succeeded, and the next
    /// tick is scheduled before a log failure is reported. Returns `Ok(None)`
    /// if the transmitter is not running.
    pub fn on_tick(
        &mut self,
        clock: &mut dyn Clock,
        transport: &mut dyn Transport,
        log: &mut dyn LogSink<EmissionRecord>,
    ) -> Result<Option<TickReport>, LogWriteError> {
        if self.state != TransmitterState::Scheduled {
            return Ok(None);
        }
        self.state = TransmitterState::Firing;
        self.pending = None;

        let raw = self.model.sample();
        let spike = self.model.last_was_spike();
        self.filter.push(&raw);
        let filtered = self.filter.compute_filtered();

        let now = clock.now();
        let payload = EmissionPayload::new(self.identity.id, now, raw, filtered).to_json();

        let transmit = match self.socket {
            Some(from) => transport.send_datagram(clock, from, self.collector, payload.as_bytes()),
            None => Err(TransmitError::NotOpen),
        };
        if let Err(e) = &transmit {
            self.stats.transmit_failures += 1;
            warn!(vehicle = %self.identity.id, time = %now, "transmit failed: {e}");
        }

        let record = EmissionRecord {
            vehicle_id: self.identity.id,
            time: now,
            raw,
            filtered,
        };
        let logged = log.append(&record);

        self.pending = Some(clock.schedule_after(self.interval, SimEvent::Tick(self.identity.id)));
        self.state = TransmitterState::Scheduled;
        self.stats.ticks += 1;
        if spike {
            self.stats.spikes += 1;
        }

        debug!(
            vehicle = %self.identity.id,
            time = %now,
            bytes = payload.len(),
            spike,
            "sent emission payload"
        );

        if let Err(e) = logged {
            self.stats.log_failures += 1;
            return Err(e);
        }
        Ok(Some(TickReport {
            record,
            payload,
            transmit,
            spike,
        }))
    }

    /// Cancel the pending tick and close the socket
    pub fn stop(&mut self, clock: &mut dyn Clock, transport: &mut dyn Transport) {
        if self.state == TransmitterState::Stopped {
            return;
        }
        if let Some(id) = self.pending.take() {
            clock.cancel(id);
        }
        if let Some(addr) = self.socket.take() {
            transport.close(addr);
        }
        self.state = TransmitterState::Stopped;
        debug!(vehicle = %self.identity.id, ticks = self.stats.ticks, "transmitter stopped");
    }
}
