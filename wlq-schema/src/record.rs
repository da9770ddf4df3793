//! Observations and the aggregated per-tick record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::link::{Band, LinkQualitySample, LinkStatusSnapshot};

/// Current record schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// One round-trip time reported by the latency prober.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyObservation {
    /// Arrival order within the prober's stream (1-indexed).
    pub seq: u64,
    pub rtt_ms: f64,
}

/// One interval rate reported by the throughput prober.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThroughputObservation {
    /// Arrival order within the prober's stream (1-indexed).
    pub seq: u64,
    pub mbps: f64,
}

/// Throughput transfer direction as seen from this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => f.write_str("upload"),
            Direction::Download => f.write_str("download"),
        }
    }
}

impl FromStr for Direction {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upload" | "up" | "ul" => Ok(Direction::Upload),
            "download" | "down" | "dl" => Ok(Direction::Download),
            other => Err(RecordError::UnknownDirection(other.to_string())),
        }
    }
}

/// Throughput transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Tcp,
    Udp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp => f.write_str("tcp"),
            Transport::Udp => f.write_str("udp"),
        }
    }
}

impl FromStr for Transport {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Transport::Tcp),
            "udp" => Ok(Transport::Udp),
            other => Err(RecordError::UnknownTransport(other.to_string())),
        }
    }
}

/// Errors from parsing records and record enums.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("unknown direction '{0}' (expected upload or download)")]
    UnknownDirection(String),

    #[error("unknown transport '{0}' (expected tcp or udp)")]
    UnknownTransport(String),
}

/// One merged record per successful tick.
///
/// Flat on purpose: each field maps to one column/field in the time-series
/// store the sink forwards to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    pub version: u32,
    pub ts_unix_ms: u64,
    pub tick: u64,
    pub location: String,
    pub direction: Direction,
    pub ssid: String,
    pub channel: u32,
    pub bandwidth_mhz: u32,
    pub center_frequency_mhz: u32,
    pub band: Band,
    pub signal_dbm: i32,
    pub rx_bitrate_mbps: f64,
    pub tx_bitrate_mbps: f64,
    pub rx_mcs: u8,
    pub tx_mcs: u8,
    pub nss: u8,
    pub latency_ms: f64,
    pub throughput_mbps: f64,
}

impl AggregatedRecord {
    /// Merge one tick's inputs with the session snapshot.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        ts_unix_ms: u64,
        tick: u64,
        location: &str,
        direction: Direction,
        snapshot: &LinkStatusSnapshot,
        sample: &LinkQualitySample,
        latency: &LatencyObservation,
        throughput_mbps: f64,
    ) -> Self {
        Self {
            version: SCHEMA_VERSION,
            ts_unix_ms,
            tick,
            location: location.to_string(),
            direction,
            ssid: snapshot.ssid.clone(),
            channel: snapshot.channel,
            bandwidth_mhz: snapshot.bandwidth_mhz,
            center_frequency_mhz: snapshot.center_frequency_mhz,
            band: snapshot.band,
            signal_dbm: sample.signal_dbm,
            rx_bitrate_mbps: sample.rx_bitrate_mbps,
            tx_bitrate_mbps: sample.tx_bitrate_mbps,
            rx_mcs: sample.rx_mcs,
            tx_mcs: sample.tx_mcs,
            nss: sample.nss,
            latency_ms: latency.rtt_ms,
            throughput_mbps,
        }
    }

    /// Serialize to a single JSON line (no trailing newline).
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("AggregatedRecord serialization cannot fail")
    }

    /// Parse a JSON line, rejecting other schema versions.
    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        let record: AggregatedRecord = serde_json::from_str(json)?;
        if record.version != SCHEMA_VERSION {
            return Err(RecordError::VersionMismatch {
                expected: SCHEMA_VERSION,
                found: record.version,
            });
        }
        Ok(record)
    }
}
