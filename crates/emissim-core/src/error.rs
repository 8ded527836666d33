//! Error types
//!
//! Configuration problems are fatal before a run starts. Transmit failures are
//! best-effort and never abort a tick. Log write failures surface to the caller
//! of the tick that hit them.

use std::io;
use std::net::SocketAddrV4;
use std::path::PathBuf;

use thiserror::Error;

/// Errors detected while validating or loading a simulation configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Filter window of zero samples
    #[error("Filter window must hold at least one sample, got {0}")]
    InvalidWindow(usize),

    /// Non-positive or non-finite packet interval
    #[error("Packet interval must be positive, got {0} s")]
    InvalidInterval(f64),

    /// Non-positive or non-finite run length
    #[error("Simulation time must be positive, got {0} s")]
    InvalidDuration(f64),

    /// Empty fleet
    #[error("Fleet must contain at least one vehicle")]
    NoVehicles,

    /// Fleet larger than the address plan allows
    #[error("Fleet of {0} vehicles does not fit the 10.0.0.0/8 address plan")]
    TooManyVehicles(u32),

    /// Fuel shares negative or not summing to one
    #[error(
        "Fuel mix shares must be non-negative and sum to 1 (diesel={diesel}, petrol={petrol}, cng={cng})"
    )]
    InvalidFuelMix {
        /// Diesel share given
        diesel: f64,
        /// Petrol share given
        petrol: f64,
        /// CNG share given
        cng: f64,
    },

    /// Loss rate outside [0, 1]
    #[error("Link loss rate must be within [0, 1], got {0}")]
    InvalidLossRate(f64),

    /// Negative or non-finite latency
    #[error("Link latency must be non-negative, got {0} ms")]
    InvalidLatency(f64),

    /// Any other out-of-range field
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        message: String,
    },

    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Config file is not valid JSON for a configuration
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised when handing a datagram to the transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransmitError {
    /// Sending socket was closed
    #[error("Socket {0} is not open")]
    SocketClosed(SocketAddrV4),

    /// Transmitter has not opened a socket
    #[error("Vehicle has no open socket")]
    NotOpen,

    /// Bind to an address that is taken
    #[error("Address already in use: {0}")]
    AddressInUse(SocketAddrV4),

    /// Host ran out of ephemeral ports
    #[error("No ephemeral port left on host {0}")]
    PortsExhausted(std::net::Ipv4Addr),

    /// Datagram larger than the transport allows
    #[error("Datagram too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload size in bytes
        size: usize,
        /// Largest accepted size
        max: usize,
    },

    /// Transport refused the datagram
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Errors raised when appending to a log sink
#[derive(Error, Debug)]
pub enum LogWriteError {
    /// Append after close
    #[error("Log sink is closed")]
    Closed,

    /// Reopen on a sink without a file
    #[error("Log sink has no backing file to reopen")]
    NotReopenable,

    /// Write or flush failed
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

/// Errors raised while reading a log file back
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// File could not be read
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// First line is not the expected header
    #[error("Unexpected header: expected '{expected}', got '{found}'")]
    BadHeader {
        /// Header the reader wants
        expected: String,
        /// Header in the file
        found: String,
    },

    /// A data row did not parse
    #[error("Malformed row at line {line}: {message}")]
    MalformedRow {
        /// One-based line number
        line: usize,
        /// What went wrong
        message: String,
    },
}

/// Top-level error for setting up and running a simulation
#[derive(Error, Debug)]
pub enum SimError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport failure
    #[error("Transmit error: {0}")]
    Transmit(#[from] TransmitError),

    /// Log sink failure
    #[error("Log write error: {0}")]
    LogWrite(#[from] LogWriteError),

    /// File system failure outside the log sinks
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}
