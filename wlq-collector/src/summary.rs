//! Running totals and the end-of-session summary.

use wlq_schema::{
    AggregatedRecord, IperfSummary, LinkStatusSnapshot, PingSummary, StopReason, SummaryReport,
    REPORT_VERSION,
};

use crate::config::SessionConfig;

/// Sums over successfully assembled records.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionTotals {
    pub signal_sum: f64,
    pub latency_sum: f64,
    pub throughput_sum: f64,
    pub records: u64,
}

impl SessionTotals {
    pub fn add(&mut self, record: &AggregatedRecord) {
        self.signal_sum += f64::from(record.signal_dbm);
        self.latency_sum += record.latency_ms;
        self.throughput_sum += record.throughput_mbps;
        self.records += 1;
    }
}

/// Round half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Averages divide by the configured duration, so skipped ticks pull them
/// toward zero. Unbounded sessions fall back to the ticks attempted.
pub fn averaging_divisor(duration_sec: u64, ticks_attempted: u64) -> u64 {
    if duration_sec > 0 {
        duration_sec
    } else {
        ticks_attempted
    }
}

fn average(sum: f64, divisor: u64) -> f64 {
    if divisor == 0 {
        return 0.0;
    }
    round2(sum / divisor as f64)
}

/// What the sampling loop hands to the reducer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionResult {
    pub totals: SessionTotals,
    pub ticks_attempted: u64,
    pub stop_reason: StopReason,
    pub started_at_unix_sec: u64,
    pub finished_at_unix_sec: u64,
}

/// Build the session summary.
pub fn reduce(
    config: &SessionConfig,
    snapshot: &LinkStatusSnapshot,
    result: &SessionResult,
    ping: Option<&PingSummary>,
    iperf: Option<&IperfSummary>,
) -> SummaryReport {
    let divisor = averaging_divisor(config.duration_sec, result.ticks_attempted);
    let totals = &result.totals;

    SummaryReport {
        version: REPORT_VERSION,
        location: config.location.clone(),
        started_at_unix_sec: result.started_at_unix_sec,
        finished_at_unix_sec: result.finished_at_unix_sec,
        duration_sec: config.duration_sec,
        throughput_enabled: config.throughput_enabled,
        direction: config.direction,
        transport: config.transport,
        ssid: snapshot.ssid.clone(),
        band: snapshot.band,
        channel: snapshot.channel,
        bandwidth_mhz: snapshot.bandwidth_mhz,
        records: totals.records,
        ticks_attempted: result.ticks_attempted,
        ticks_skipped: result.ticks_attempted.saturating_sub(totals.records),
        avg_signal_dbm: average(totals.signal_sum, divisor),
        avg_latency_ms: average(totals.latency_sum, divisor),
        avg_throughput_mbps: average(totals.throughput_sum, divisor),
        packets_sent: ping.map(|p| p.packets_sent),
        packets_received: ping.map(|p| p.packets_received),
        loss_percent: ping.map(|p| p.loss_percent),
        jitter_ms: ping.and_then(PingSummary::jitter_ms),
        iperf_sender_mbps: iperf.and_then(|i| i.sender_mbps),
        iperf_receiver_mbps: iperf.and_then(|i| i.receiver_mbps),
        stop_reason: result.stop_reason,
    }
}
