//! CLI argument parsing for wlq.
//!
//! `wlq run` samples a session; `wlq status` prints the current link once.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use thiserror::Error;
use wlq_fs::sink::{DEFAULT_BATCH_SIZE, DEFAULT_RETRIES};
use wlq_probe::{DEFAULT_INTERFACE, DEFAULT_IPERF_PORT, DEFAULT_PING_INTERVAL_SEC};
use wlq_schema::{Direction, Transport};

use crate::config::{SessionConfig, DEFAULT_STALL_TIMEOUT_MS};

/// Default output directory for records and summaries.
pub const DEFAULT_OUTPUT_DIR: &str = "wlq-data";

/// Default session length in seconds.
pub const DEFAULT_DURATION_SEC: u64 = 300;

/// Default location tag.
pub const DEFAULT_LOCATION: &str = "default";

/// Default seconds a sink write attempt may take.
pub const DEFAULT_SINK_TIMEOUT_SEC: u64 = 5;

/// Errors from CLI argument validation.
#[derive(Debug, Error, PartialEq)]
pub enum CliError {
    #[error("ping-host must not be empty")]
    EmptyPingHost,

    #[error("location must not be empty")]
    EmptyLocation,

    #[error("iperf-port must be between 1 and 65535, got {0}")]
    InvalidPort(u16),

    #[error("ping-interval must be a positive number of seconds, got {0}")]
    InvalidPingInterval(f64),

    #[error("batch-size must be at least 1, got {0}")]
    InvalidBatchSize(usize),

    #[error("sink-retries must be at least 1, got {0}")]
    InvalidSinkRetries(u32),

    #[error("stall-timeout-ms must be at least 1, got {0}")]
    InvalidStallTimeout(u64),

    #[error("max-consecutive-stalls must be at least 1 when set")]
    InvalidStallLimit,
}

/// Wireless link quality sampler.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "wlq")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
#[command(about, long_about = None)]
pub struct Cli {
    /// Increase log detail (-v per tick, -vv prober and sink internals).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Sample link quality, latency and throughput once per second.
    Run(RunArgs),
    /// Print the current link descriptor and one quality sample.
    Status(StatusArgs),
}

/// Arguments for the run command.
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct RunArgs {
    /// Host to ping for latency.
    #[arg(long)]
    pub ping_host: String,

    /// iperf3 server; defaults to the ping host.
    #[arg(long)]
    pub iperf_host: Option<String>,

    #[arg(long, default_value_t = DEFAULT_IPERF_PORT)]
    pub iperf_port: u16,

    /// Session length in seconds; 0 runs until Ctrl+C.
    #[arg(short = 't', long, default_value_t = DEFAULT_DURATION_SEC)]
    pub duration_sec: u64,

    /// Free-form tag stored with every record.
    #[arg(short, long, default_value = DEFAULT_LOCATION)]
    pub location: String,

    /// Throughput direction: upload or download.
    #[arg(long, default_value = "upload")]
    pub direction: Direction,

    /// Throughput transport: tcp or udp.
    #[arg(long, default_value = "tcp")]
    pub transport: Transport,

    /// Skip the throughput prober; records carry 0.0 throughput.
    #[arg(long)]
    pub no_throughput: bool,

    /// Type-of-service byte for both probers.
    #[arg(long, default_value_t = 0)]
    pub tos: u8,

    /// iperf3 target bitrate (0 is unlimited).
    #[arg(short, long, default_value = "0")]
    pub bitrate: String,

    /// iperf3 read/write buffer length.
    #[arg(long)]
    pub buffer_length: Option<String>,

    /// Seconds between pings.
    #[arg(long, default_value_t = DEFAULT_PING_INTERVAL_SEC)]
    pub ping_interval: f64,

    /// Wireless interface to poll.
    #[arg(short, long, default_value = DEFAULT_INTERFACE)]
    pub interface: String,

    /// Directory for hourly record files and summaries.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub out_dir: PathBuf,

    /// Records per sink batch.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Write attempts per sink batch.
    #[arg(long, default_value_t = DEFAULT_RETRIES)]
    pub sink_retries: u32,

    /// Seconds per sink write attempt.
    #[arg(long, default_value_t = DEFAULT_SINK_TIMEOUT_SEC)]
    pub sink_timeout_sec: u64,

    /// How long a tick waits for each prober before skipping.
    #[arg(long, default_value_t = DEFAULT_STALL_TIMEOUT_MS)]
    pub stall_timeout_ms: u64,

    /// Stop the session after this many stalled ticks in a row.
    #[arg(long)]
    pub max_consecutive_stalls: Option<u32>,
}

impl RunArgs {
    pub fn validate(&self) -> Result<(), CliError> {
        if self.ping_host.trim().is_empty() {
            return Err(CliError::EmptyPingHost);
        }
        if self.location.trim().is_empty() {
            return Err(CliError::EmptyLocation);
        }
        if self.iperf_port == 0 {
            return Err(CliError::InvalidPort(self.iperf_port));
        }
        if !(self.ping_interval.is_finite() && self.ping_interval > 0.0) {
            return Err(CliError::InvalidPingInterval(self.ping_interval));
        }
        if self.batch_size == 0 {
            return Err(CliError::InvalidBatchSize(self.batch_size));
        }
        if self.sink_retries == 0 {
            return Err(CliError::InvalidSinkRetries(self.sink_retries));
        }
        if self.stall_timeout_ms == 0 {
            return Err(CliError::InvalidStallTimeout(self.stall_timeout_ms));
        }
        if self.max_consecutive_stalls == Some(0) {
            return Err(CliError::InvalidStallLimit);
        }
        Ok(())
    }

    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig::new(&self.ping_host, self.duration_sec)
            .with_iperf_host(self.iperf_host.clone())
            .with_iperf_port(self.iperf_port)
            .with_location(&self.location)
            .with_direction(self.direction)
            .with_transport(self.transport)
            .with_throughput(!self.no_throughput)
            .with_tos(self.tos)
            .with_bitrate(&self.bitrate)
            .with_buffer_length(self.buffer_length.clone())
            .with_ping_interval_sec(self.ping_interval)
            .with_out_dir(self.out_dir.clone())
            .with_batch_size(self.batch_size)
            .with_sink_retries(self.sink_retries)
            .with_sink_timeout(Duration::from_secs(self.sink_timeout_sec))
            .with_stall_timeout(Duration::from_millis(self.stall_timeout_ms))
            .with_max_consecutive_stalls(self.max_consecutive_stalls)
    }
}

/// Arguments for the status command.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct StatusArgs {
    /// Wireless interface to poll.
    #[arg(short, long, default_value = DEFAULT_INTERFACE)]
    pub interface: String,

    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Parse CLI arguments from an iterator of strings.
pub fn parse_from<I, T>(iter: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(iter)
}
