//! Session configuration.

use std::path::PathBuf;
use std::time::Duration;

use wlq_fs::SinkConfig;
use wlq_probe::{IperfConfig, PingConfig, DEFAULT_IPERF_PORT, DEFAULT_PING_INTERVAL_SEC};
use wlq_schema::{Direction, Transport};

/// Default bounded wait for one prober observation.
pub const DEFAULT_STALL_TIMEOUT_MS: u64 = 3000;

/// Default tick length.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Default capacity of each prober channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Default wait for a prober's closing summary after sampling ends.
pub const DEFAULT_SUMMARY_WAIT: Duration = Duration::from_secs(5);

/// Everything one sampling session needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub ping_host: String,
    /// `None` means the ping host.
    pub iperf_host: Option<String>,
    pub iperf_port: u16,
    /// Ticks to attempt; 0 runs until interrupted.
    pub duration_sec: u64,
    pub location: String,
    pub direction: Direction,
    pub transport: Transport,
    pub throughput_enabled: bool,
    pub tos: u8,
    pub bitrate: String,
    pub buffer_length: Option<String>,
    pub ping_interval_sec: f64,
    pub out_dir: PathBuf,
    pub sink: SinkConfig,
    pub tick: Duration,
    pub stall_timeout: Duration,
    pub max_consecutive_stalls: Option<u32>,
    pub channel_capacity: usize,
    pub summary_wait: Duration,
}

impl SessionConfig {
    pub fn new(ping_host: &str, duration_sec: u64) -> Self {
        Self {
            ping_host: ping_host.to_string(),
            iperf_host: None,
            iperf_port: DEFAULT_IPERF_PORT,
            duration_sec,
            location: crate::cli::DEFAULT_LOCATION.to_string(),
            direction: Direction::Upload,
            transport: Transport::Tcp,
            throughput_enabled: true,
            tos: 0,
            bitrate: "0".to_string(),
            buffer_length: None,
            ping_interval_sec: DEFAULT_PING_INTERVAL_SEC,
            out_dir: PathBuf::from(crate::cli::DEFAULT_OUTPUT_DIR),
            sink: SinkConfig::default(),
            tick: DEFAULT_TICK,
            stall_timeout: Duration::from_millis(DEFAULT_STALL_TIMEOUT_MS),
            max_consecutive_stalls: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            summary_wait: DEFAULT_SUMMARY_WAIT,
        }
    }

    /// Builder: set iperf_host.
    pub fn with_iperf_host(mut self, iperf_host: Option<String>) -> Self {
        self.iperf_host = iperf_host;
        self
    }

    /// Builder: set iperf_port.
    pub fn with_iperf_port(mut self, iperf_port: u16) -> Self {
        self.iperf_port = iperf_port;
        self
    }

    /// Builder: set location.
    pub fn with_location(mut self, location: &str) -> Self {
        self.location = location.to_string();
        self
    }

    /// Builder: set direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Builder: set transport.
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Builder: enable or disable the throughput prober.
    pub fn with_throughput(mut self, enabled: bool) -> Self {
        self.throughput_enabled = enabled;
        self
    }

    /// Builder: set tos.
    pub fn with_tos(mut self, tos: u8) -> Self {
        self.tos = tos;
        self
    }

    /// Builder: set bitrate.
    pub fn with_bitrate(mut self, bitrate: &str) -> Self {
        self.bitrate = bitrate.to_string();
        self
    }

    /// Builder: set buffer_length.
    pub fn with_buffer_length(mut self, buffer_length: Option<String>) -> Self {
        self.buffer_length = buffer_length;
        self
    }

    /// Builder: set ping_interval_sec.
    pub fn with_ping_interval_sec(mut self, ping_interval_sec: f64) -> Self {
        self.ping_interval_sec = ping_interval_sec;
        self
    }

    /// Builder: set out_dir.
    pub fn with_out_dir(mut self, out_dir: PathBuf) -> Self {
        self.out_dir = out_dir;
        self
    }

    /// Builder: set sink batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.sink = self.sink.with_batch_size(batch_size);
        self
    }

    /// Builder: set sink retries.
    pub fn with_sink_retries(mut self, retries: u32) -> Self {
        self.sink = self.sink.with_retries(retries);
        self
    }

    /// Builder: set sink timeout.
    pub fn with_sink_timeout(mut self, timeout: Duration) -> Self {
        self.sink = self.sink.with_timeout(timeout);
        self
    }

    /// Builder: set tick.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Builder: set stall_timeout.
    pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
        self.stall_timeout = stall_timeout;
        self
    }

    /// Builder: set max_consecutive_stalls.
    pub fn with_max_consecutive_stalls(mut self, limit: Option<u32>) -> Self {
        self.max_consecutive_stalls = limit;
        self
    }

    /// Builder: set channel_capacity (minimum 1).
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Builder: set summary_wait.
    pub fn with_summary_wait(mut self, summary_wait: Duration) -> Self {
        self.summary_wait = summary_wait;
        self
    }

    pub fn iperf_host(&self) -> &str {
        self.iperf_host.as_deref().unwrap_or(&self.ping_host)
    }

    /// One echo request per tick for bounded sessions.
    pub fn ping_config(&self) -> PingConfig {
        PingConfig::new(self.ping_host.clone())
            .with_tos(self.tos)
            .with_count(self.duration_sec)
            .with_interval_sec(self.ping_interval_sec)
    }

    pub fn iperf_config(&self) -> IperfConfig {
        IperfConfig::new(self.iperf_host())
            .with_port(self.iperf_port)
            .with_tos(self.tos)
            .with_bitrate(self.bitrate.clone())
            .with_duration_sec(self.duration_sec)
            .with_buffer_length(self.buffer_length.clone())
            .with_direction(self.direction)
            .with_transport(self.transport)
    }
}
