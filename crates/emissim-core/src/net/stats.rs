use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

/// Flow counters for the whole network
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkStats {
    /// Datagrams accepted by the transport
    pub datagrams_sent: u64,
    /// Datagrams queued on an open destination socket
    pub datagrams_delivered: u64,
    /// Datagrams dropped in transit
    pub datagrams_lost: u64,
    /// Datagrams that reached a port with no socket
    pub datagrams_undeliverable: u64,
    /// Sends rejected by the transport
    pub send_errors: u64,
    /// Payload bytes accepted
    pub bytes_sent: u64,
    /// Payload bytes delivered
    pub bytes_delivered: u64,
    /// Sum of one-way delays of delivered datagrams
    pub latency_sum_secs: f64,
}

impl LinkStats {
    pub(crate) fn record_delivery(&mut self, bytes: usize, delay: Duration) {
        self.datagrams_delivered += 1;
        self.bytes_delivered += bytes as u64;
        self.latency_sum_secs += delay.as_secs_f64();
    }

    /// Fraction of sent datagrams that were delivered
    pub fn delivery_ratio(&self) -> f64 {
        if self.datagrams_sent == 0 {
            return 0.0;
        }
        self.datagrams_delivered as f64 / self.datagrams_sent as f64
    }

    /// Mean one-way delay of delivered datagrams in milliseconds
    pub fn mean_latency_ms(&self) -> f64 {
        if self.datagrams_delivered == 0 {
            return 0.0;
        }
        self.latency_sum_secs * 1000.0 / self.datagrams_delivered as f64
    }

    /// Write the counters as pretty JSON
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }
}
