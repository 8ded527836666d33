use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use tracing::trace;

use super::{Datagram, DatagramSource, LinkStats, Transport, EPHEMERAL_PORT_START, MAX_DATAGRAM_SIZE};
use crate::error::TransmitError;
use crate::sim::{duration_from_secs, Clock, SimEvent, SimTime};

/// Link behaviour settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// One-way latency in milliseconds
    pub latency_ms: f64,
    /// Probability that a datagram is dropped in transit
    pub loss_rate: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            latency_ms: 2.0,
            loss_rate: 0.0,
        }
    }
}

impl LinkConfig {
    /// Latency as a duration (negative values count as zero)
    pub fn latency(&self) -> Duration {
        duration_from_secs(self.latency_ms / 1000.0)
    }
}

#[derive(Debug, Default)]
struct Socket {
    rx: VecDeque<Datagram>,
}

/// In-memory datagram network shared by every node of a run
///
/// With a constant latency, datagrams to one destination arrive in the order
/// they were sent, so in-flight traffic is a FIFO per destination matched to
/// one `Arrival` event each.
#[derive(Debug)]
pub struct Network {
    latency: Duration,
    loss_rate: f64,
    rng: StdRng,
    sockets: HashMap<SocketAddrV4, Socket>,
    in_flight: HashMap<SocketAddrV4, VecDeque<Datagram>>,
    next_port: HashMap<Ipv4Addr, u16>,
    stats: LinkStats,
}

impl Network {
    /// Create a network; `seed` drives the loss process
    pub fn new(config: LinkConfig, seed: u64) -> Self {
        Self {
            latency: config.latency(),
            loss_rate: config.loss_rate.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(seed),
            sockets: HashMap::new(),
            in_flight: HashMap::new(),
            next_port: HashMap::new(),
            stats: LinkStats::default(),
        }
    }

    /// Bind a listening socket at a fixed address
    pub fn bind(&mut self, addr: SocketAddrV4) -> Result<(), TransmitError> {
        if self.sockets.contains_key(&addr) {
            return Err(TransmitError::AddressInUse(addr));
        }
        self.sockets.insert(addr, Socket::default());
        Ok(())
    }

    /// Whether a socket is open at `addr`
    pub fn is_open(&self, addr: SocketAddrV4) -> bool {
        self.sockets.contains_key(&addr)
    }

    /// Number of datagrams waiting on the socket at `addr`
    pub fn queued(&self, addr: SocketAddrV4) -> usize {
        self.sockets.get(&addr).map(|s| s.rx.len()).unwrap_or(0)
    }

    /// Complete the oldest in-flight datagram towards `to`
    ///
    /// Returns true if it was queued on an open socket. A datagram whose
    /// sending socket closed while it was in flight is discarded.
    pub fn deliver(&mut self, now: SimTime, to: SocketAddrV4) -> bool {
        let Some(datagram) = self.in_flight.get_mut(&to).and_then(|q| q.pop_front()) else {
            return false;
        };
        if !self.sockets.contains_key(&datagram.from) {
            trace!(from = %datagram.from, %to, "sender closed before arrival");
            self.stats.datagrams_undeliverable += 1;
            return false;
        }
        match self.sockets.get_mut(&to) {
            Some(socket) => {
                self.stats.record_delivery(
                    datagram.payload.len(),
                    now.saturating_since(datagram.sent_at),
                );
                socket.rx.push_back(datagram);
                true
            }
            None => {
                trace!(%to, "datagram arrived at closed port");
                self.stats.datagrams_undeliverable += 1;
                false
            }
        }
    }

    /// Flow statistics so far
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }
}

impl Transport for Network {
    fn open(&mut self, host: Ipv4Addr) -> Result<SocketAddrV4, TransmitError> {
        let next = self.next_port.entry(host).or_insert(EPHEMERAL_PORT_START);
        let port = *next;
        if port == 0 {
            return Err(TransmitError::PortsExhausted(host));
        }
        *next = port.wrapping_add(1);
        let addr = SocketAddrV4::new(host, port);
        self.bind(addr)?;
        Ok(addr)
    }

    fn send_datagram(
        &mut self,
        clock: &mut dyn Clock,
        from: SocketAddrV4,
        to: SocketAddrV4,
        payload: &[u8],
    ) -> Result<usize, TransmitError> {
        if !self.sockets.contains_key(&from) {
            self.stats.send_errors += 1;
            return Err(TransmitError::SocketClosed(from));
        }
        if payload.len() > MAX_DATAGRAM_SIZE {
            self.stats.send_errors += 1;
            return Err(TransmitError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }

        self.stats.datagrams_sent += 1;
        self.stats.bytes_sent += payload.len() as u64;

        if self.loss_rate > 0.0 && self.rng.gen::<f64>() < self.loss_rate {
            trace!(%from, %to, "datagram lost in transit");
            self.stats.datagrams_lost += 1;
            return Ok(payload.len());
        }

        self.in_flight.entry(to).or_default().push_back(Datagram {
            from,
            to,
            payload: payload.to_vec(),
            sent_at: clock.now(),
        });
        clock.schedule_after(self.latency, SimEvent::Arrival(to));
        Ok(payload.len())
    }

    fn close(&mut self, addr: SocketAddrV4) {
        self.sockets.remove(&addr);
    }
}

impl DatagramSource for Network {
    fn recv(&mut self, addr: SocketAddrV4) -> Option<Datagram> {
        self.sockets.get_mut(&addr)?.rx.pop_front()
    }
}
