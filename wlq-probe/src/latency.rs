//! Latency prober: `ping` output into latency observations.

use std::io::BufRead;
use std::sync::mpsc::SyncSender;
use std::sync::OnceLock;

use regex::Regex;
use wlq_schema::{LatencyObservation, PingSummary, RttStats};

use crate::process::ExternalCommand;

/// Default seconds between echo requests.
pub const DEFAULT_PING_INTERVAL_SEC: f64 = 1.0;

/// Settings for one `ping` run.
#[derive(Debug, Clone, PartialEq)]
pub struct PingConfig {
    pub host: String,
    pub tos: u8,
    /// Echo requests to send; `None` runs until killed.
    pub count: Option<u64>,
    pub interval_sec: f64,
}

impl PingConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            tos: 0,
            count: None,
            interval_sec: DEFAULT_PING_INTERVAL_SEC,
        }
    }

    /// Builder: set tos.
    pub fn with_tos(mut self, tos: u8) -> Self {
        self.tos = tos;
        self
    }

    /// Builder: set count; zero means unbounded.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = (count > 0).then_some(count);
        self
    }

    /// Builder: set interval_sec.
    pub fn with_interval_sec(mut self, interval_sec: f64) -> Self {
        self.interval_sec = interval_sec;
        self
    }

    /// Arguments for this platform's `ping`.
    pub fn args(&self) -> Vec<String> {
        // macOS spells ToS and count differently.
        let (tos_flag, count_flag) = if cfg!(target_os = "macos") {
            ("-z", "-t")
        } else {
            ("-Q", "-c")
        };

        let mut args = vec![self.host.clone(), tos_flag.to_string(), self.tos.to_string()];
        if let Some(count) = self.count {
            args.push(count_flag.to_string());
            args.push(count.to_string());
        }
        args.push("-i".to_string());
        args.push(self.interval_sec.to_string());
        args
    }

    pub fn command(&self) -> ExternalCommand {
        ExternalCommand::new("ping", self.args())
    }
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"time=([0-9.]+) ms").expect("valid regex"))
}

fn packets_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d+) packets transmitted, (\d+) (?:packets )?received.*?([0-9.]+)% packet loss")
            .expect("valid regex")
    })
}

fn rtt_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?:rtt|round-trip) min/avg/max/(?:mdev|stddev) = ([0-9.]+)/([0-9.]+)/([0-9.]+)/([0-9.]+) ms",
        )
        .expect("valid regex")
    })
}

fn parse_rtt(line: &str) -> Option<RttStats> {
    let caps = rtt_re().captures(line)?;
    Some(RttStats {
        min_ms: caps[1].parse().ok()?,
        avg_ms: caps[2].parse().ok()?,
        max_ms: caps[3].parse().ok()?,
        mdev_ms: caps[4].parse().ok()?,
    })
}

/// Pump `ping` output into `tx` until the rtt line or end of stream.
///
/// Returns the closing summary if the packet line was seen. Lines that
/// match nothing are skipped. Once the receiver is gone no more sends are
/// attempted, but reading continues so the summary is still parsed.
pub fn pump_latency<R: BufRead>(reader: R, tx: &SyncSender<LatencyObservation>) -> Option<PingSummary> {
    let mut seq = 0;
    let mut consumer_alive = true;
    let mut summary: Option<PingSummary> = None;

    for line in reader.lines() {
        let Ok(line) = line else {
            break;
        };

        if let Some(caps) = time_re().captures(&line) {
            let Ok(rtt_ms) = caps[1].parse::<f64>() else {
                continue;
            };
            seq += 1;
            if consumer_alive && tx.send(LatencyObservation { seq, rtt_ms }).is_err() {
                consumer_alive = false;
            }
            continue;
        }

        if let Some(caps) = packets_re().captures(&line) {
            if let (Ok(sent), Ok(received), Ok(loss)) =
                (caps[1].parse(), caps[2].parse(), caps[3].parse())
            {
                summary = Some(PingSummary {
                    packets_sent: sent,
                    packets_received: received,
                    loss_percent: loss,
                    rtt: None,
                });
            }
            continue;
        }

        if let Some(rtt) = parse_rtt(&line) {
            if let Some(summary) = summary.as_mut() {
                summary.rtt = Some(rtt);
            }
            break;
        }
    }

    summary
}
