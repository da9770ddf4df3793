//! Starting the latency and throughput probers.

use std::io::{BufRead, Cursor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;

use wlq_schema::{IperfSummary, LatencyObservation, PingSummary, ThroughputObservation};

use crate::latency::{pump_latency, PingConfig};
use crate::process::{spawn_prober, ProbeError, ProberHandle};
use crate::throughput::{pump_throughput, IperfConfig};

/// Running latency prober: handle plus its observation stream.
pub type LatencyProber = (ProberHandle<Option<PingSummary>>, Receiver<LatencyObservation>);

/// Running throughput prober: handle plus its observation stream.
pub type ThroughputProber = (ProberHandle<IperfSummary>, Receiver<ThroughputObservation>);

/// Starts probers. Abstracted so sessions can run against canned output.
pub trait ProberLauncher: Send + Sync {
    fn launch_latency(&self, config: &PingConfig, capacity: usize) -> Result<LatencyProber, ProbeError>;

    fn launch_throughput(
        &self,
        config: &IperfConfig,
        capacity: usize,
    ) -> Result<ThroughputProber, ProbeError>;
}

/// Launches `ping` and `iperf3` as child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl ProberLauncher for ProcessLauncher {
    fn launch_latency(&self, config: &PingConfig, capacity: usize) -> Result<LatencyProber, ProbeError> {
        let (child, reader) = config.command().spawn_streaming()?;
        spawn_prober("latency", Some(child), reader, capacity, |reader, tx| {
            pump_latency(reader, tx)
        })
    }

    fn launch_throughput(
        &self,
        config: &IperfConfig,
        capacity: usize,
    ) -> Result<ThroughputProber, ProbeError> {
        let (child, reader) = config.command().spawn_streaming()?;
        spawn_prober("throughput", Some(child), reader, capacity, |reader, tx| {
            pump_throughput(reader, tx)
        })
    }
}

/// Feeds fixed text through the real pumps instead of starting processes.
#[derive(Debug, Default)]
pub struct ScriptedLauncher {
    ping_output: String,
    iperf_output: String,
    latency_launches: AtomicUsize,
    throughput_launches: AtomicUsize,
}

impl ScriptedLauncher {
    pub fn new(ping_output: impl Into<String>, iperf_output: impl Into<String>) -> Self {
        Self {
            ping_output: ping_output.into(),
            iperf_output: iperf_output.into(),
            ..Self::default()
        }
    }

    pub fn latency_launches(&self) -> usize {
        self.latency_launches.load(Ordering::SeqCst)
    }

    pub fn throughput_launches(&self) -> usize {
        self.throughput_launches.load(Ordering::SeqCst)
    }

    fn reader(text: &str) -> Box<dyn BufRead + Send> {
        Box::new(Cursor::new(text.as_bytes().to_vec()))
    }
}

impl ProberLauncher for ScriptedLauncher {
    fn launch_latency(&self, _config: &PingConfig, capacity: usize) -> Result<LatencyProber, ProbeError> {
        self.latency_launches.fetch_add(1, Ordering::SeqCst);
        spawn_prober(
            "latency",
            None,
            Self::reader(&self.ping_output),
            capacity,
            |reader, tx| pump_latency(reader, tx),
        )
    }

    fn launch_throughput(
        &self,
        _config: &IperfConfig,
        capacity: usize,
    ) -> Result<ThroughputProber, ProbeError> {
        self.throughput_launches.fetch_add(1, Ordering::SeqCst);
        spawn_prober(
            "throughput",
            None,
            Self::reader(&self.iperf_output),
            capacity,
            |reader, tx| pump_throughput(reader, tx),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const PING: &str = "64 bytes from h: icmp_seq=1 ttl=64 time=10.0 ms
64 bytes from h: icmp_seq=2 ttl=64 time=12.0 ms

--- h ping statistics ---
2 packets transmitted, 2 received, 0% packet loss, time 1001ms
rtt min/avg/max/mdev = 10.000/11.000/12.000/1.000 ms
";

    const IPERF: &str = "[  5]   0.00-1.00   sec  59.6 MBytes   500 Mbits/sec    0   1.10 MBytes
[  5]   0.00-1.00   sec  59.6 MBytes   500 Mbits/sec    0             sender
";

    #[test]
    fn test_scripted_latency() {
        let launcher = ScriptedLauncher::new(PING, IPERF);
        let (handle, rx) = launcher.launch_latency(&PingConfig::new("h"), 4).unwrap();

        let rtts: Vec<f64> = rx.iter().map(|o| o.rtt_ms).collect();
        assert_eq!(rtts, vec![10.0, 12.0]);

        let summary = handle.wait_result(Duration::from_secs(1)).unwrap().expect("summary");
        assert_eq!(summary.packets_received, 2);
        assert_eq!(launcher.latency_launches(), 1);
        assert_eq!(launcher.throughput_launches(), 0);
    }

    #[test]
    fn test_scripted_throughput() {
        let launcher = ScriptedLauncher::new(PING, IPERF);
        let (handle, rx) = launcher.launch_throughput(&IperfConfig::new("h"), 4).unwrap();

        assert_eq!(rx.iter().count(), 1);
        let summary = handle.wait_result(Duration::from_secs(1)).unwrap();
        assert_eq!(summary.sender_mbps, Some(500.0));
        assert_eq!(launcher.throughput_launches(), 1);
    }
}
