//! Simulated datagram network
//!
//! A minimal UDP-like transport: sockets bound to IPv4 endpoints, constant
//! one-way latency, independent random loss, and flow statistics. Radio and
//! MAC behaviour are not modelled.

mod network;
mod stats;

pub use network::{LinkConfig, Network};
pub use stats::LinkStats;

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::TransmitError;
use crate::sim::{Clock, SimTime};

/// Largest payload accepted in one datagram
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// First port handed out by [`Transport::open`]
pub const EPHEMERAL_PORT_START: u16 = 49152;

/// One datagram in flight or waiting on a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Sending endpoint
    pub from: SocketAddrV4,
    /// Destination endpoint
    pub to: SocketAddrV4,
    /// Body bytes
    pub payload: Vec<u8>,
    /// Time the sender handed it to the transport
    pub sent_at: SimTime,
}

/// Sending side of the transport, as used by vehicle transmitters
pub trait Transport {
    /// Open a socket on an ephemeral port of `host`
    fn open(&mut self, host: Ipv4Addr) -> Result<SocketAddrV4, TransmitError>;

    /// Hand one datagram to the network; returns the number of bytes accepted
    ///
    /// Loss in transit is not an error, just as with UDP.
    fn send_datagram(
        &mut self,
        clock: &mut dyn Clock,
        from: SocketAddrV4,
        to: SocketAddrV4,
        payload: &[u8],
    ) -> Result<usize, TransmitError>;

    /// Close a socket, discarding anything queued on it
    fn close(&mut self, addr: SocketAddrV4);
}

/// Receiving side of the transport, as used by the collector
pub trait DatagramSource {
    /// Take the next queued datagram for `addr` without blocking
    fn recv(&mut self, addr: SocketAddrV4) -> Option<Datagram>;
}
