//! emissim command line
//!
//! Runs a fleet simulation, summarizes an emission log, or prints the default
//! configuration.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use emissim_core::config::SimulationConfig;
use emissim_core::datalog::EmissionPlayback;
use emissim_core::fleet::{Fleet, RunSummary};

#[derive(Parser, Debug)]
#[command(name = "emissim", version, about = "Vehicle emission telemetry simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a fleet simulation
    Run(RunArgs),
    /// Print per-vehicle statistics of an emission log
    Summarize {
        /// Central emission log (CSV)
        emission_csv: PathBuf,
    },
    /// Print the default configuration as JSON
    DefaultConfig,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of vehicles
    #[arg(long)]
    num_vehicles: Option<u32>,
    /// Simulated run length in seconds
    #[arg(long)]
    sim_time: Option<f64>,
    /// Seconds between transmissions of one vehicle
    #[arg(long)]
    pkt_interval: Option<f64>,
    /// Moving-average window length
    #[arg(long)]
    filter_window: Option<usize>,
    /// Seed for every random stream
    #[arg(long)]
    seed: Option<u64>,
    /// Probability of losing a datagram in transit
    #[arg(long)]
    loss_rate: Option<f64>,
    /// Central emission log path
    #[arg(long)]
    out_csv: Option<PathBuf>,
    /// Collector log path
    #[arg(long)]
    server_csv: Option<PathBuf>,
    /// Write link statistics as JSON to this path
    #[arg(long)]
    link_stats: Option<PathBuf>,
}

impl RunArgs {
    /// Load the config file (or defaults) and apply flag overrides
    fn resolve(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => SimulationConfig::default(),
        };

        if let Some(n) = self.num_vehicles {
            config.num_vehicles = n;
        }
        if let Some(secs) = self.sim_time {
            config.duration_secs = secs;
        }
        if let Some(secs) = self.pkt_interval {
            config.interval_secs = secs;
        }
        if let Some(w) = self.filter_window {
            config.filter_window = w;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(p) = self.loss_rate {
            config.link.loss_rate = p;
        }
        if let Some(path) = &self.out_csv {
            config.emission_log = path.clone();
        }
        if let Some(path) = &self.server_csv {
            config.collector_log = path.clone();
        }
        if let Some(path) = &self.link_stats {
            config.link_stats = Some(path.clone());
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(args: RunArgs) -> Result<()> {
    let config = args.resolve()?;
    let emission_log = config.emission_log.clone();
    let collector_log = config.collector_log.clone();
    let fleet = Fleet::new(config).context("setting up simulation")?;

    let cancel = Arc::new(AtomicBool::new(false));
    let sim_cancel = cancel.clone();
    let mut task = tokio::task::spawn_blocking(move || fleet.run_until(&sim_cancel));

    let summary: RunSummary = tokio::select! {
        joined = &mut task => joined.context("simulation task panicked")??,
        _ = tokio::signal::ctrl_c() => {
            warn!("ctrl-c received, stopping simulation");
            cancel.store(true, Ordering::Relaxed);
            task.await.context("simulation task panicked")??
        }
    };

    info!(
        emission_log = %emission_log.display(),
        collector_log = %collector_log.display(),
        "logs written"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn summarize(path: PathBuf) -> Result<()> {
    let playback = EmissionPlayback::from_file(&path)
        .with_context(|| format!("reading emission log {}", path.display()))?;
    info!(records = playback.len(), "loaded {}", path.display());
    println!("{}", serde_json::to_string_pretty(&playback.summarize())?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Summarize { emission_csv } => summarize(emission_csv),
        Command::DefaultConfig => {
            println!("{}", SimulationConfig::default().to_json()?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "emissim",
            "run",
            "--num-vehicles",
            "5",
            "--sim-time",
            "30",
            "--pkt-interval",
            "2.5",
            "--loss-rate",
            "0.1",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run command");
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.num_vehicles, 5);
        assert_eq!(config.duration_secs, 30.0);
        assert_eq!(config.interval_secs, 2.5);
        assert_eq!(config.link.loss_rate, 0.1);
        assert_eq!(config.filter_window, 5);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sim.json");
        std::fs::write(&path, r#"{"num_vehicles": 7, "seed": 9}"#).unwrap();

        let args = RunArgs {
            config: Some(path),
            seed: Some(42),
            ..Default::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.num_vehicles, 7);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = RunArgs {
            filter_window: Some(0),
            ..Default::default()
        };
        assert!(args.resolve().is_err());
    }

    #[test]
    fn test_summarize_takes_path() {
        let cli = Cli::try_parse_from(["emissim", "summarize", "emission_records.csv"]).unwrap();
        assert!(matches!(cli.command, Command::Summarize { .. }));
    }
}
