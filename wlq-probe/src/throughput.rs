//! Throughput prober: `iperf3` interval lines into throughput observations.

use std::io::BufRead;
use std::sync::mpsc::SyncSender;
use std::sync::OnceLock;

use regex::Regex;
use wlq_schema::{Direction, IperfSummary, ThroughputObservation, Transport};

use crate::process::ExternalCommand;

/// Default iperf3 server port.
pub const DEFAULT_IPERF_PORT: u16 = 5201;

/// Settings for one `iperf3` client run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IperfConfig {
    pub host: String,
    pub port: u16,
    pub tos: u8,
    /// Target bitrate as iperf3 accepts it (`0` is unlimited, `100M`, ...).
    pub bitrate: String,
    /// Seconds to transmit; 0 runs until the process is killed.
    pub duration_sec: u64,
    pub buffer_length: Option<String>,
    pub direction: Direction,
    pub transport: Transport,
}

impl IperfConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_IPERF_PORT,
            tos: 0,
            bitrate: "0".to_string(),
            duration_sec: 0,
            buffer_length: None,
            direction: Direction::Upload,
            transport: Transport::Tcp,
        }
    }

    /// Builder: set port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder: set tos.
    pub fn with_tos(mut self, tos: u8) -> Self {
        self.tos = tos;
        self
    }

    /// Builder: set bitrate.
    pub fn with_bitrate(mut self, bitrate: impl Into<String>) -> Self {
        self.bitrate = bitrate.into();
        self
    }

    /// Builder: set duration_sec.
    pub fn with_duration_sec(mut self, duration_sec: u64) -> Self {
        self.duration_sec = duration_sec;
        self
    }

    /// Builder: set buffer_length.
    pub fn with_buffer_length(mut self, buffer_length: Option<String>) -> Self {
        self.buffer_length = buffer_length;
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

    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-c".into(),
            self.host.clone(),
            "-p".into(),
            self.port.to_string(),
            "-S".into(),
            self.tos.to_string(),
            "-b".into(),
            self.bitrate.clone(),
            "-t".into(),
            self.duration_sec.to_string(),
        ];
        if let Some(len) = &self.buffer_length {
            args.push("-l".into());
            args.push(len.clone());
        }
        if self.direction == Direction::Download {
            args.push("-R".into());
        }
        if self.transport == Transport::Udp {
            args.push("-u".into());
        }
        args.extend(["-f".into(), "m".into(), "--forceflush".into()]);
        args
    }

    pub fn command(&self) -> ExternalCommand {
        ExternalCommand::new("iperf3", self.args())
    }
}

fn mbps_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" ([0-9.]+) Mbits/sec").expect("valid regex"))
}

/// Pump `iperf3` output into `tx` until end of stream.
///
/// Interval readings of exactly zero are dropped: iperf3 prints them for
/// header/footer intervals, which also means a fully stalled interval is
/// indistinguishable and gets dropped too. The closing `sender`/`receiver`
/// lines go into the returned summary instead of the channel.
pub fn pump_throughput<R: BufRead>(reader: R, tx: &SyncSender<ThroughputObservation>) -> IperfSummary {
    let mut summary = IperfSummary::default();
    let mut consumer_alive = true;

    for line in reader.lines() {
        let Ok(line) = line else {
            break;
        };
        let Some(mbps) = mbps_re()
            .captures(&line)
            .and_then(|caps| caps[1].parse::<f64>().ok())
        else {
            continue;
        };

        let tail = line.trim_end();
        if tail.ends_with("sender") {
            summary.sender_mbps = Some(mbps);
            continue;
        }
        if tail.ends_with("receiver") {
            summary.receiver_mbps = Some(mbps);
            continue;
        }

        if mbps == 0.0 {
            summary.zero_dropped += 1;
            continue;
        }

        summary.intervals += 1;
        if consumer_alive
            && tx
                .send(ThroughputObservation {
                    seq: summary.intervals,
                    mbps,
                })
                .is_err()
        {
            consumer_alive = false;
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::mpsc;

    const TCP_OUTPUT: &str = "Connecting to host 192.168.1.10, port 5201
[  5] local 192.168.1.20 port 50000 connected to 192.168.1.10 port 5201
[ ID] Interval           Transfer     Bitrate         Retr  Cwnd
[  5]   0.00-1.00   sec  59.6 MBytes   500 Mbits/sec    0   1.10 MBytes
[  5]   1.00-2.00   sec  60.0 MBytes   503.2 Mbits/sec    0   1.10 MBytes
[  5]   2.00-3.00   sec  0.00 MBytes  0.00 Mbits/sec    2   1.10 MBytes
[  5]   3.00-4.00   sec  58.8 MBytes   493 Mbits/sec    0   1.10 MBytes
- - - - - - - - - - - - - - - - - - - - - - - - -
[ ID] Interval           Transfer     Bitrate         Retr
[  5]   0.00-4.00   sec   178 MBytes   374 Mbits/sec    2             sender
[  5]   0.00-4.04   sec   177 MBytes   368 Mbits/sec                  receiver

iperf Done.
";

    fn run(text: &str) -> (Vec<ThroughputObservation>, IperfSummary) {
        let (tx, rx) = mpsc::sync_channel(16);
        let summary = pump_throughput(Cursor::new(text), &tx);
        drop(tx);
        (rx.iter().collect(), summary)
    }

    // ===========================================
    // Pump
    // ===========================================

    #[test]
    fn test_pump_interval_readings() {
        let (obs, _) = run(TCP_OUTPUT);
        let rates: Vec<f64> = obs.iter().map(|o| o.mbps).collect();
        assert_eq!(rates, vec![500.0, 503.2, 493.0]);
        assert_eq!(obs.last().map(|o| o.seq), Some(3));
    }

    #[test]
    fn test_pump_drops_exact_zero() {
        let (_, summary) = run(TCP_OUTPUT);
        assert_eq!(summary.zero_dropped, 1);
        assert_eq!(summary.intervals, 3);
    }

    #[test]
    fn test_pump_captures_sender_receiver() {
        let (obs, summary) = run(TCP_OUTPUT);
        assert!(obs.iter().all(|o| o.mbps != 374.0 && o.mbps != 368.0));
        assert_eq!(summary.sender_mbps, Some(374.0));
        assert_eq!(summary.receiver_mbps, Some(368.0));
    }

    #[test]
    fn test_pump_udp_lines() {
        let text = "[  5]   0.00-1.00   sec  1.19 MBytes  10.0 Mbits/sec  0.012 ms  0/862 (0%)\n";
        let (obs, _) = run(text);
        assert_eq!(obs, vec![ThroughputObservation { seq: 1, mbps: 10.0 }]);
    }

    #[test]
    fn test_pump_counts_after_consumer_drops() {
        let (tx, rx) = mpsc::sync_channel(1);
        drop(rx);
        let summary = pump_throughput(Cursor::new(TCP_OUTPUT), &tx);
        assert_eq!(summary.intervals, 3);
        assert_eq!(summary.sender_mbps, Some(374.0));
    }

    // ===========================================
    // Arguments
    // ===========================================

    #[test]
    fn test_args_upload_tcp() {
        let args = IperfConfig::new("10.0.0.2")
            .with_tos(32)
            .with_bitrate("200M")
            .with_duration_sec(60)
            .args();
        assert_eq!(
            args,
            vec![
                "-c", "10.0.0.2", "-p", "5201", "-S", "32", "-b", "200M", "-t", "60", "-f", "m",
                "--forceflush"
            ]
        );
    }

    #[test]
    fn test_args_download_udp_with_length() {
        let args = IperfConfig::new("h")
            .with_port(5301)
            .with_buffer_length(Some("8K".to_string()))
            .with_direction(Direction::Download)
            .with_transport(Transport::Udp)
            .args();
        let joined = args.join(" ");
        assert!(joined.contains("-p 5301"));
        assert!(joined.contains("-l 8K -R -u -f m --forceflush"));
    }

    #[test]
    fn test_args_unbounded_duration_passes_zero() {
        // iperf3 -t 0 transmits until killed, matching an unbounded session.
        let args = IperfConfig::new("h").args();
        let t = args.iter().position(|a| a == "-t").expect("-t present");
        assert_eq!(args[t + 1], "0");
    }

    #[test]
    fn test_command_program() {
        assert_eq!(IperfConfig::new("h").command().program(), "iperf3");
    }
}
