//! Collector
//!
//! Receiving endpoint of the fleet. Every datagram that reaches it is logged
//! verbatim with its receipt time and size; payloads are decoded only to keep
//! per-vehicle counts.

use std::collections::BTreeMap;
use std::net::SocketAddrV4;

use tracing::{debug, warn};

use crate::datalog::{CsvSink, LogSink, ReceivedRecord};
use crate::error::LogWriteError;
use crate::net::DatagramSource;
use crate::payload::ParsedPayload;
use crate::sim::Clock;
use crate::vehicle::VehicleId;

/// Counters kept by the collector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorStats {
    /// Datagrams logged
    pub received: u64,
    /// Payload bytes logged
    pub bytes: u64,
    /// Payloads that did not decode
    pub malformed: u64,
    /// Datagrams that could not be written to the log
    pub log_failures: u64,
    /// Decoded payloads per vehicle
    pub per_vehicle: BTreeMap<VehicleId, u64>,
}

/// Listening endpoint writing every receipt to a log
pub struct Collector<S = CsvSink<ReceivedRecord>> {
    addr: SocketAddrV4,
    log: S,
    stats: CollectorStats,
}

impl<S: LogSink<ReceivedRecord>> Collector<S> {
    /// Create a collector at `addr` writing to `log`
    pub fn new(addr: SocketAddrV4, log: S) -> Self {
        Self {
            addr,
            log,
            stats: CollectorStats::default(),
        }
    }

    /// Listening address
    pub fn addr(&self) -> SocketAddrV4 {
        self.addr
    }

    /// Counters so far
    pub fn stats(&self) -> &CollectorStats {
        &self.stats
    }

    /// The receipt log
    pub fn log(&self) -> &S {
        &self.log
    }

    /// Drain every datagram queued on the collector's socket
    ///
    /// Each one is logged at the current time. A log failure does not stop the
    /// drain; the first failure is returned after all datagrams are consumed.
    pub fn on_datagram_received(
        &mut self,
        clock: &dyn Clock,
        source: &mut dyn DatagramSource,
    ) -> Result<usize, LogWriteError> {
        let now = clock.now();
        let mut logged = 0;
        let mut first_error = None;

        while let Some(datagram) = source.recv(self.addr) {
            let payload = String::from_utf8_lossy(&datagram.payload).into_owned();
            let record = ReceivedRecord {
                time: now,
                bytes: datagram.payload.len(),
                payload,
            };

            match ParsedPayload::parse(&record.payload) {
                Ok(parsed) => match parsed.vehicle() {
                    Some(id) => *self.stats.per_vehicle.entry(id).or_default() += 1,
                    None => self.stats.malformed += 1,
                },
                Err(e) => {
                    self.stats.malformed += 1;
                    debug!(from = %datagram.from, "undecodable payload: {e}");
                }
            }

            match self.log.append(&record) {
                Ok(()) => {
                    logged += 1;
                    self.stats.received += 1;
                    self.stats.bytes += record.bytes as u64;
                }
                Err(e) => {
                    self.stats.log_failures += 1;
                    warn!(time = %now, from = %datagram.from, "collector log write failed: {e}");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(logged),
        }
    }
}

impl Collector<CsvSink<ReceivedRecord>> {
    /// Flush and close the receipt log
    pub fn close(&mut self) -> Result<(), LogWriteError> {
        self.log.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalog::CsvRecord;
    use crate::net::Datagram;
    use crate::sim::{EventQueue, SimTime};
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::net::Ipv4Addr;

    const SAMPLE: &str = r#"{"vehicleId":"VEH-0007","time":12.500,"raw":{"CO":1.260,"NOx":0.580,"HC":0.042,"CO2":1510},"filtered":{"CO":1.200,"NOx":0.550,"HC":0.040,"CO2":1500}}"#;

    struct Inbox(VecDeque<Datagram>);

    impl DatagramSource for Inbox {
        fn recv(&mut self, _addr: SocketAddrV4) -> Option<Datagram> {
            self.0.pop_front()
        }
    }

    fn addr() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 101), 4000)
    }

    fn datagram(text: &str) -> Datagram {
        Datagram {
            from: SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 7), 49152),
            to: addr(),
            payload: text.as_bytes().to_vec(),
            sent_at: SimTime::from_secs_f64(12.5),
        }
    }

    fn clock_at(secs: f64) -> EventQueue {
        let mut queue = EventQueue::new();
        queue.advance_to(SimTime::from_secs_f64(secs));
        queue
    }

    #[test]
    fn test_logs_receipt_time_and_size() {
        let mut collector = Collector::new(addr(), Vec::<ReceivedRecord>::new());
        let mut inbox = Inbox(VecDeque::from([datagram(SAMPLE)]));

        let n = collector
            .on_datagram_received(&clock_at(12.502), &mut inbox)
            .unwrap();
        assert_eq!(n, 1);

        let record = &collector.log()[0];
        assert_eq!(record.time.to_string(), "12.502");
        assert_eq!(record.bytes, SAMPLE.len());
        assert_eq!(record.payload, SAMPLE);
        assert!(record.to_row().starts_with(&format!("12.502,{},\"{{", SAMPLE.len())));
        assert_eq!(collector.stats().per_vehicle.get(&VehicleId(7)), Some(&1));
    }

    #[test]
    fn test_drains_every_queued_datagram() {
        let mut collector = Collector::new(addr(), Vec::<ReceivedRecord>::new());
        let mut inbox = Inbox(VecDeque::from([datagram(SAMPLE), datagram(SAMPLE)]));
        let n = collector
            .on_datagram_received(&clock_at(1.0), &mut inbox)
            .unwrap();
        assert_eq!(n, 2);
        assert!(inbox.0.is_empty());
        assert_eq!(collector.stats().received, 2);
        assert_eq!(collector.stats().bytes, 2 * SAMPLE.len() as u64);
    }

    #[test]
    fn test_malformed_payload_still_logged() {
        let mut collector = Collector::new(addr(), Vec::<ReceivedRecord>::new());
        let mut inbox = Inbox(VecDeque::from([datagram("garbage")]));
        collector
            .on_datagram_received(&clock_at(3.0), &mut inbox)
            .unwrap();
        assert_eq!(collector.log().len(), 1);
        assert_eq!(collector.log()[0].payload, "garbage");
        assert_eq!(collector.stats().malformed, 1);
        assert!(collector.stats().per_vehicle.is_empty());
    }

    #[test]
    fn test_log_failure_is_reported_after_drain() {
        struct Refusing;
        impl LogSink<ReceivedRecord> for Refusing {
            fn append(&mut self, _record: &ReceivedRecord) -> Result<(), LogWriteError> {
                Err(LogWriteError::Closed)
            }
        }

        let mut collector = Collector::new(addr(), Refusing);
        let mut inbox = Inbox(VecDeque::from([datagram(SAMPLE), datagram(SAMPLE)]));
        let result = collector.on_datagram_received(&clock_at(1.0), &mut inbox);
        assert!(matches!(result, Err(LogWriteError::Closed)));
        assert!(inbox.0.is_empty());
        assert_eq!(collector.stats().log_failures, 2);
        assert_eq!(collector.stats().received, 0);
    }

    #[test]
    fn test_row_keeps_foreign_float_formatting() {
        // Two-decimal floats as another sender might write them
        let payload = r#"{"vehicleId":"VEH-0007","time":12.500,"raw":{"CO":1.26,"NOx":0.58,"HC":0.042,"CO2":1510},"filtered":{"CO":1.2,"NOx":0.55,"HC":0.04,"CO2":1500}}"#;
        let mut collector = Collector::new(addr(), Vec::<ReceivedRecord>::new());
        let mut inbox = Inbox(VecDeque::from([datagram(payload)]));
        collector
            .on_datagram_received(&clock_at(12.5), &mut inbox)
            .unwrap();

        let record = &collector.log()[0];
        assert_eq!(record.bytes, 143);
        assert_eq!(record.payload, payload);
        assert_eq!(
            record.to_row(),
            r#"12.500,143,"{""vehicleId"":""VEH-0007"",""time"":12.500,""raw"":{""CO"":1.26,""NOx"":0.58,""HC"":0.042,""CO2"":1510},""filtered"":{""CO"":1.2,""NOx"":0.55,""HC"":0.04,""CO2"":1500}}""#
        );
        assert_eq!(collector.stats().per_vehicle.get(&VehicleId(7)), Some(&1));
        assert_eq!(collector.stats().malformed, 0);
    }
}
