//! End-of-session summary types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::link::Band;
use crate::record::{Direction, Transport};

/// Current summary report version.
pub const REPORT_VERSION: u32 = 1;

/// Round-trip statistics from the latency prober's closing line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RttStats {
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    /// Mean deviation (`mdev` on Linux, `stddev` on macOS), reported as jitter.
    pub mdev_ms: f64,
}

/// Terminal result of the latency prober.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PingSummary {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub loss_percent: f64,
    /// Absent when no reply arrived at all.
    pub rtt: Option<RttStats>,
}

impl PingSummary {
    /// Jitter figure carried into the report.
    pub fn jitter_ms(&self) -> Option<f64> {
        self.rtt.map(|r| r.mdev_ms)
    }
}

/// Terminal result of the throughput prober.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IperfSummary {
    /// Interval readings pushed to the coordinator.
    pub intervals: u64,
    /// Interval readings of exactly zero that were dropped.
    pub zero_dropped: u64,
    pub sender_mbps: Option<f64>,
    pub receiver_mbps: Option<f64>,
}

/// Why the sampling loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// All configured ticks were attempted.
    Completed,
    /// External interrupt.
    Interrupted,
    /// A prober's output stream closed.
    ProducerExited,
    /// Consecutive stalls reached the configured limit.
    StallLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StopReason::Completed => "completed",
            StopReason::Interrupted => "interrupted",
            StopReason::ProducerExited => "producer_exited",
            StopReason::StallLimit => "stall_limit",
        };
        f.write_str(label)
    }
}

/// One summary per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub version: u32,
    pub location: String,
    pub started_at_unix_sec: u64,
    pub finished_at_unix_sec: u64,
    /// Configured duration; 0 for an unbounded session.
    pub duration_sec: u64,
    pub throughput_enabled: bool,
    pub direction: Direction,
    pub transport: Transport,
    pub ssid: String,
    pub band: Band,
    pub channel: u32,
    pub bandwidth_mhz: u32,
    pub records: u64,
    pub ticks_attempted: u64,
    pub ticks_skipped: u64,
    pub avg_signal_dbm: f64,
    pub avg_latency_ms: f64,
    pub avg_throughput_mbps: f64,
    pub packets_sent: Option<u64>,
    pub packets_received: Option<u64>,
    pub loss_percent: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub iperf_sender_mbps: Option<f64>,
    pub iperf_receiver_mbps: Option<f64>,
    pub stop_reason: StopReason,
}

impl SummaryReport {
    /// Serialize to a single JSON line (no trailing newline).
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("SummaryReport serialization cannot fail")
    }
}
