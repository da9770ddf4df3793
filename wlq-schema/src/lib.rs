//! wlq record schema.
//!
//! Defines the per-session link snapshot, the per-tick samples and
//! observations, the versioned aggregated record written to the sink, and the
//! end-of-session summary report.

mod link;
mod record;
mod report;

pub use link::{Band, LinkQualitySample, LinkStatusSnapshot};
pub use record::{
    AggregatedRecord, Direction, LatencyObservation, RecordError, ThroughputObservation,
    Transport, SCHEMA_VERSION,
};
pub use report::{IperfSummary, PingSummary, RttStats, StopReason, SummaryReport, REPORT_VERSION};
