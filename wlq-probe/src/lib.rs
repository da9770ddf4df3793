//! Measurement sources for wlq.
//!
//! This crate provides:
//! - Text extraction for `iw` link descriptor and link quality output
//! - LinkStatusSource trait with `iw` and scripted implementations
//! - Latency (`ping`) and throughput (`iperf3`) probers pumping bounded channels
//! - ProberLauncher trait with process and scripted implementations

pub mod extract;
pub mod latency;
pub mod launcher;
pub mod link_source;
pub mod process;
pub mod throughput;

pub use extract::{
    is_not_connected, parse_link_descriptor, ExtractError, QualityExtractor, QualityField,
    QualityRule,
};
pub use latency::{pump_latency, PingConfig, DEFAULT_PING_INTERVAL_SEC};
pub use launcher::{
    LatencyProber, ProberLauncher, ProcessLauncher, ScriptedLauncher, ThroughputProber,
};
pub use link_source::{IwLinkSource, LinkStatusSource, ScriptedLinkSource, DEFAULT_INTERFACE};
pub use process::{spawn_prober, ExternalCommand, ProbeError, ProberHandle};
pub use throughput::{pump_throughput, IperfConfig, DEFAULT_IPERF_PORT};
