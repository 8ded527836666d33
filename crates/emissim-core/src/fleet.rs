//! Fleet runner
//!
//! Builds every vehicle, the collector and the shared network from one
//! [`SimulationConfig`], then drives the event loop to the end of the run.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};

use crate::collector::{Collector, CollectorStats};
use crate::config::SimulationConfig;
use crate::datalog::{CsvSink, EmissionRecord};
use crate::emission::{EmissionModel, FuelProfile};
use crate::error::SimError;
use crate::filter::SlidingFilter;
use crate::net::{LinkStats, Network};
use crate::sim::{stream_seed, Clock, EventQueue, SimEvent};
use crate::transmitter::VehicleTransmitter;
use crate::vehicle::{VehicleId, VehicleIdentity};

/// First vehicle address; the collector follows the last vehicle
pub const FLEET_BASE_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

const FUEL_STREAM: u64 = 0;
const LINK_STREAM: u64 = 1;
const VEHICLE_STREAM_BASE: u64 = 16;

/// Outcome of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Wall clock time the run started
    pub started_at: DateTime<Utc>,
    /// Run seed
    pub seed: u64,
    /// Fleet size
    pub num_vehicles: u32,
    /// Simulated time reached
    pub sim_time_secs: f64,
    /// True if the run was cancelled before its end time
    pub interrupted: bool,
    /// Ticks fired across the fleet
    pub ticks: u64,
    /// Ticks whose sample carried a spike
    pub spikes: u64,
    /// Sends rejected by the transport
    pub transmit_failures: u64,
    /// Emission log appends that failed
    pub log_failures: u64,
    /// Vehicles whose socket could not be opened
    pub start_failures: u64,
    /// Rows in the central emission log
    pub records_logged: u64,
    /// Rows in the collector log
    pub records_received: u64,
    /// Received payloads that did not decode
    pub malformed_payloads: u64,
    /// Collector log appends that failed
    pub collector_log_failures: u64,
    /// Vehicles per fuel class
    pub fuel_counts: BTreeMap<FuelProfile, u32>,
    /// Network flow counters
    pub link: LinkStats,
}

/// Address of the vehicle at zero-based `index`
pub fn vehicle_host(index: u32) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(FLEET_BASE_ADDR).wrapping_add(index))
}

/// Collector endpoint for a fleet of `num_vehicles`
pub fn collector_addr(num_vehicles: u32, port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(vehicle_host(num_vehicles), port)
}

/// One configured simulation run
pub struct Fleet {
    config: SimulationConfig,
    queue: EventQueue,
    network: Network,
    emission_log: CsvSink<EmissionRecord>,
    collector: Collector,
    vehicles: Vec<VehicleTransmitter>,
    start_failures: u64,
}

impl Fleet {
    /// Validate the configuration and build every component
    ///
    /// Both log files are created here, so a bad path fails before the run.
    pub fn new(config: SimulationConfig) -> Result<Self, SimError> {
        config.validate()?;

        let mut network = Network::new(config.link, stream_seed(config.seed, LINK_STREAM));
        let collector_addr = collector_addr(config.num_vehicles, config.collector_port);
        network.bind(collector_addr)?;

        let emission_log = CsvSink::create(&config.emission_log)?;
        let collector = Collector::new(collector_addr, CsvSink::create(&config.collector_log)?);

        let mut fuel_rng = StdRng::seed_from_u64(stream_seed(config.seed, FUEL_STREAM));
        let mut vehicles = Vec::with_capacity(config.num_vehicles as usize);
        for index in 0..config.num_vehicles {
            let fuel = config.fuel_mix.choose(fuel_rng.gen::<f64>());
            let identity = VehicleIdentity {
                id: VehicleId(index + 1),
                fuel,
                host: vehicle_host(index),
            };
            let stream = VEHICLE_STREAM_BASE + 2 * u64::from(index);
            vehicles.push(VehicleTransmitter::new(
                identity,
                EmissionModel::new(fuel, stream_seed(config.seed, stream)),
                SlidingFilter::new(config.filter_window)?,
                config.interval(),
                collector_addr,
                stream_seed(config.seed, stream + 1),
            ));
        }

        Ok(Self {
            config,
            queue: EventQueue::new(),
            network,
            emission_log,
            collector,
            vehicles,
            start_failures: 0,
        })
    }

    /// Run configuration
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Vehicles in id order
    pub fn vehicles(&self) -> &[VehicleTransmitter] {
        &self.vehicles
    }

    /// Collector endpoint
    pub fn collector_addr(&self) -> SocketAddrV4 {
        self.collector.addr()
    }

    /// Number of vehicles per fuel class
    pub fn fuel_counts(&self) -> BTreeMap<FuelProfile, u32> {
        let mut counts = BTreeMap::new();
        for vehicle in &self.vehicles {
            *counts.entry(vehicle.identity().fuel).or_insert(0) += 1;
        }
        counts
    }

    /// Run to the configured end time
    pub fn run(self) -> Result<RunSummary, SimError> {
        self.run_until(&AtomicBool::new(false))
    }

    /// Run until the end time or until `cancel` is set
    ///
    /// Logs are flushed and closed either way.
    pub fn run_until(mut self, cancel: &AtomicBool) -> Result<RunSummary, SimError> {
        let started_at = Utc::now();
        let end = self.config.end_time();
        let fuel_counts = self.fuel_counts();

        info!(
            vehicles = self.config.num_vehicles,
            duration = %end,
            interval_secs = self.config.interval_secs,
            window = self.config.filter_window,
            seed = self.config.seed,
            collector = %self.collector.addr(),
            "starting fleet simulation"
        );
        debug!(?fuel_counts, "fuel assignment");

        let stop_at = self.config.stop_time();
        for index in 0..self.config.num_vehicles {
            let id = VehicleId(index + 1);
            self.queue
                .schedule_at(self.config.start_time(index), SimEvent::StartVehicle(id));
        }
        for index in 0..self.config.num_vehicles {
            self.queue
                .schedule_at(stop_at, SimEvent::StopVehicle(VehicleId(index + 1)));
        }

        let mut interrupted = false;
        while let Some((_, event)) = self.queue.pop_until(end) {
            if cancel.load(Ordering::Relaxed) {
                interrupted = true;
                warn!(time = %self.queue.now(), "simulation interrupted");
                break;
            }
            self.dispatch(event);
        }

        for vehicle in &mut self.vehicles {
            vehicle.stop(&mut self.queue, &mut self.network);
        }
        if !interrupted {
            self.queue.advance_to(end);
        }

        self.emission_log.close()?;
        self.collector.close()?;
        if let Some(path) = &self.config.link_stats {
            self.network.stats().write_json(path)?;
        }

        let summary = self.summarize(started_at, fuel_counts, interrupted);
        info!(
            ticks = summary.ticks,
            received = summary.records_received,
            transmit_failures = summary.transmit_failures,
            log_failures = summary.log_failures,
            delivery_ratio = summary.link.delivery_ratio(),
            "simulation finished at {}",
            self.queue.now()
        );
        Ok(summary)
    }

    fn dispatch(&mut self, event: SimEvent) {
        match event {
            SimEvent::StartVehicle(id) => {
                let Some(vehicle) = self.vehicles.get_mut(id.index()) else {
                    return;
                };
                if let Err(e) = vehicle.start(&mut self.queue, &mut self.network) {
                    self.start_failures += 1;
                    warn!(vehicle = %id, "failed to start transmitter: {e}");
                }
            }
            SimEvent::Tick(id) => {
                let Some(vehicle) = self.vehicles.get_mut(id.index()) else {
                    return;
                };
                if let Err(e) =
                    vehicle.on_tick(&mut self.queue, &mut self.network, &mut self.emission_log)
                {
                    error!(vehicle = %id, time = %self.queue.now(), "emission log write failed: {e}");
                }
            }
            SimEvent::StopVehicle(id) => {
                if let Some(vehicle) = self.vehicles.get_mut(id.index()) {
                    vehicle.stop(&mut self.queue, &mut self.network);
                }
            }
            SimEvent::Arrival(to) => {
                let now = self.queue.now();
                if self.network.deliver(now, to) && to == self.collector.addr() {
                    if let Err(e) = self
                        .collector
                        .on_datagram_received(&self.queue, &mut self.network)
                    {
                        error!(time = %now, "collector log write failed: {e}");
                    }
                }
            }
        }
    }

    fn summarize(
        &self,
        started_at: DateTime<Utc>,
        fuel_counts: BTreeMap<FuelProfile, u32>,
        interrupted: bool,
    ) -> RunSummary {
        let mut summary = RunSummary {
            started_at,
            seed: self.config.seed,
            num_vehicles: self.config.num_vehicles,
            sim_time_secs: self.queue.now().as_secs_f64(),
            interrupted,
            ticks: 0,
            spikes: 0,
            transmit_failures: 0,
            log_failures: 0,
            start_failures: self.start_failures,
            records_logged: self.emission_log.rows_written(),
            records_received: 0,
            malformed_payloads: 0,
            collector_log_failures: 0,
            fuel_counts,
            link: self.network.stats().clone(),
        };
        for vehicle in &self.vehicles {
            let stats = vehicle.stats();
            summary.ticks += stats.ticks;
            summary.spikes += stats.spikes;
            summary.transmit_failures += stats.transmit_failures;
            summary.log_failures += stats.log_failures;
        }
        let CollectorStats {
            received,
            malformed,
            log_failures,
            ..
        } = self.collector.stats();
        summary.records_received = *received;
        summary.malformed_payloads = *malformed;
        summary.collector_log_failures = *log_failures;
        summary
    }
}
