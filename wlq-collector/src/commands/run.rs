//! Run command orchestration.
//!
//! Polls the link descriptor once, starts the probers, samples for the
//! configured duration, drains the sink, then writes the session summary.

use wlq_clock::Clock;
use wlq_fs::{BufferedRecordWriter, Filesystem, RecordSink, SinkStats};
use wlq_probe::{parse_link_descriptor, LinkStatusSource, ProberLauncher, QualityExtractor};
use wlq_schema::{IperfSummary, PingSummary, SummaryReport};

use crate::cli::RunArgs;
use crate::config::SessionConfig;
use crate::coordinator::{Phase, ProberStreams, Sampler};
use crate::io::{ExportWriter, WrittenFiles};
use crate::logger::Logger;
use crate::signal::ShutdownCheck;
use crate::sleeper::Sleeper;
use crate::summary::reduce;

use super::CommandResult;

/// Result of run command execution.
#[derive(Debug)]
pub struct RunResult {
    pub report: SummaryReport,
    pub files: WrittenFiles,
    pub sink: SinkStats,
}

/// Execute the run command.
#[allow(clippy::too_many_arguments)]
pub fn execute_run<F, C, S, H, G, L, P>(
    args: &RunArgs,
    fs: &F,
    clock: &C,
    sleeper: &S,
    shutdown: &H,
    logger: &G,
    link: &L,
    launcher: &P,
) -> CommandResult<RunResult>
where
    F: Filesystem + Clone + 'static,
    C: Clock,
    S: Sleeper,
    H: ShutdownCheck,
    G: Logger,
    L: LinkStatusSource,
    P: ProberLauncher,
{
    args.validate()?;
    let config = args.to_session_config();
    run_session(&config, fs, clock, sleeper, shutdown, logger, link, launcher)
}

/// Run one sampling session from an already validated configuration.
#[allow(clippy::too_many_arguments)]
pub fn run_session<F, C, S, H, G, L, P>(
    config: &SessionConfig,
    fs: &F,
    clock: &C,
    sleeper: &S,
    shutdown: &H,
    logger: &G,
    link: &L,
    launcher: &P,
) -> CommandResult<RunResult>
where
    F: Filesystem + Clone + 'static,
    C: Clock,
    S: Sleeper,
    H: ShutdownCheck,
    G: Logger,
    L: LinkStatusSource,
    P: ProberLauncher,
{
    logger.debug(&format!("phase: {}", Phase::Initializing));

    let snapshot = parse_link_descriptor(&link.descriptor()?)?;
    logger.info(&format!(
        "connected to {} on channel {} ({}, {} MHz wide)",
        snapshot.ssid, snapshot.channel, snapshot.band, snapshot.bandwidth_mhz
    ));

    fs.create_dir_all(&config.out_dir)?;
    let sink = BufferedRecordWriter::new(fs.clone(), config.out_dir.clone(), config.sink);

    let ping_config = config.ping_config();
    logger.verbose(&format!("latency prober: ping {}", ping_config.args().join(" ")));
    let (mut ping, latency_rx) = launcher.launch_latency(&ping_config, config.channel_capacity)?;

    let (mut iperf, throughput_rx) = if config.throughput_enabled {
        let iperf_config = config.iperf_config();
        logger.verbose(&format!(
            "throughput prober: iperf3 {}",
            iperf_config.args().join(" ")
        ));
        let (handle, rx) = launcher.launch_throughput(&iperf_config, config.channel_capacity)?;
        (Some(handle), Some(rx))
    } else {
        logger.verbose("throughput prober disabled");
        (None, None)
    };

    let extractor = QualityExtractor::default();
    let sampler = Sampler {
        link,
        sink: &sink,
        clock,
        sleeper,
        shutdown,
        logger,
        extractor: &extractor,
        snapshot: &snapshot,
        config,
    };

    logger.info(&format!(
        "sampling {} at {}",
        if config.duration_sec > 0 {
            format!("for {}s", config.duration_sec)
        } else {
            "until interrupted".to_string()
        },
        config.location
    ));

    let session = sampler.run(&ProberStreams {
        latency: &latency_rx,
        throughput: throughput_rx.as_ref(),
    });
    sampler.drain();

    // Unblock pumps still pushing observations so they reach the summary lines.
    drop(latency_rx);
    drop(throughput_rx);

    let ping_summary = match ping.wait_result(config.summary_wait) {
        Ok(Some(summary)) => Some(summary),
        Ok(None) => {
            logger.info("latency prober ended without statistics");
            None
        }
        Err(e) => {
            logger.info(&format!("{}", e));
            None
        }
    };
    ping.terminate();

    let iperf_summary: Option<IperfSummary> = match iperf.as_mut() {
        Some(handle) => {
            let summary = match handle.wait_result(config.summary_wait) {
                Ok(summary) => {
                    if summary.zero_dropped > 0 {
                        logger.debug(&format!(
                            "throughput prober: ignored {} zero-rate intervals",
                            summary.zero_dropped
                        ));
                    }
                    Some(summary)
                }
                Err(e) => {
                    logger.info(&format!("{}", e));
                    None
                }
            };
            handle.terminate();
            summary
        }
        None => None,
    };

    let report = reduce(
        config,
        &snapshot,
        &session,
        ping_summary.as_ref(),
        iperf_summary.as_ref(),
    );
    log_report(logger, &report, ping_summary.as_ref());

    let files = ExportWriter::new(fs, &config.out_dir).write_all(&report)?;

    Ok(RunResult {
        report,
        files,
        sink: sink.stats(),
    })
}

fn log_report<G: Logger + ?Sized>(logger: &G, report: &SummaryReport, ping: Option<&PingSummary>) {
    logger.info(&format!(
        "session {}: {} of {} ticks recorded",
        report.stop_reason, report.records, report.ticks_attempted
    ));
    logger.info(&format!(
        "avg signal {} dBm, avg latency {} ms, avg throughput {} Mbit/s",
        report.avg_signal_dbm, report.avg_latency_ms, report.avg_throughput_mbps
    ));
    if let Some(ping) = ping {
        logger.verbose(&format!(
            "ping: {} sent, {} received, {}% loss",
            ping.packets_sent, ping.packets_received, ping.loss_percent
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{parse_from, Command};
    use crate::commands::CommandError;
    use crate::logger::MockLogger;
    use crate::signal::NeverShutdown;
    use crate::sleeper::MockSleeper;
    use std::path::PathBuf;
    use wlq_clock::FixedClock;
    use wlq_fs::MockFilesystem;
    use wlq_probe::{ExtractError, ScriptedLauncher, ScriptedLinkSource};
    use wlq_schema::StopReason;

    const INFO: &str = "Interface wlo1
\tssid lab-ax
\ttype managed
\tchannel 36 (5180 MHz), width: 80 MHz, center1: 5210 MHz
";

    const LINK: &str = "Connected to 10:20:30:40:50:60 (on wlo1)
\tSSID: lab-ax
\tsignal: -50 dBm
\trx bitrate: 1200.9 MBit/s 80MHz HE-MCS 11 HE-NSS 2
\ttx bitrate: 864.8 MBit/s 80MHz HE-MCS 8 HE-NSS 2
";

    const PING: &str = "PING h (10.0.0.1) 56(84) bytes of data.
64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=10.0 ms
64 bytes from 10.0.0.1: icmp_seq=2 ttl=64 time=12.0 ms
64 bytes from 10.0.0.1: icmp_seq=3 ttl=64 time=11.0 ms

--- h ping statistics ---
3 packets transmitted, 3 received, 0% packet loss, time 2003ms
rtt min/avg/max/mdev = 10.000/11.000/12.000/0.816 ms
";

    const IPERF: &str = "[  5]   0.00-1.00   sec  59.6 MBytes   500 Mbits/sec    0   1.10 MBytes
[  5]   1.00-2.00   sec  59.6 MBytes   400 Mbits/sec    0   1.10 MBytes
[  5]   2.00-3.00   sec  59.6 MBytes   300 Mbits/sec    0   1.10 MBytes
[  5]   0.00-3.00   sec   179 MBytes   400 Mbits/sec    0             sender
";

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["wlq", "run", "--ping-host", "h", "-t", "3", "-o", "/data"];
        argv.extend_from_slice(extra);
        match parse_from(argv).expect("parse").command {
            Command::Run(args) => args,
            other => panic!("expected run, got {:?}", other),
        }
    }

    // ===========================================
    // Run orchestration
    // ===========================================

    #[test]
    fn test_execute_run_writes_summary() {
        let fs = MockFilesystem::new();
        let logger = MockLogger::new();
        let launcher = ScriptedLauncher::new(PING, IPERF);
        let link = ScriptedLinkSource::new(INFO, vec![LINK.to_string()]);

        let result = execute_run(
            &args(&[]),
            &fs,
            &FixedClock::at_sec(1_704_067_200),
            &MockSleeper::new(),
            &NeverShutdown,
            &logger,
            &link,
            &launcher,
        )
        .expect("run");

        assert_eq!(result.report.stop_reason, StopReason::Completed);
        assert_eq!(result.report.records, 3);
        assert_eq!(result.report.avg_latency_ms, 11.0);
        assert_eq!(result.report.avg_throughput_mbps, 400.0);
        assert_eq!(result.report.packets_sent, Some(3));
        assert_eq!(result.report.iperf_sender_mbps, Some(400.0));
        assert_eq!(result.sink.written, 3);
        assert_eq!(result.files.csv, PathBuf::from("/data/summary.csv"));
        assert!(fs.get_text(&result.files.jsonl).is_some());
        assert!(logger.contains("connected to lab-ax on channel 36"));
    }

    #[test]
    fn test_execute_run_without_throughput() {
        let fs = MockFilesystem::new();
        let launcher = ScriptedLauncher::new(PING, IPERF);
        let link = ScriptedLinkSource::new(INFO, vec![LINK.to_string()]);

        let result = execute_run(
            &args(&["--no-throughput"]),
            &fs,
            &FixedClock::at_sec(1_704_067_200),
            &MockSleeper::new(),
            &NeverShutdown,
            &MockLogger::new(),
            &link,
            &launcher,
        )
        .expect("run");

        assert_eq!(launcher.throughput_launches(), 0);
        assert_eq!(result.report.avg_throughput_mbps, 0.0);
        assert_eq!(result.report.iperf_sender_mbps, None);
        assert!(!result.report.throughput_enabled);
    }

    #[test]
    fn test_execute_run_invalid_port() {
        let launcher = ScriptedLauncher::new(PING, IPERF);
        let link = ScriptedLinkSource::new(INFO, vec![LINK.to_string()]);

        let err = execute_run(
            &args(&["--iperf-port", "0"]),
            &MockFilesystem::new(),
            &FixedClock::at_sec(0),
            &MockSleeper::new(),
            &NeverShutdown,
            &MockLogger::new(),
            &link,
            &launcher,
        )
        .unwrap_err();

        assert!(matches!(err, CommandError::InvalidArgument(_)));
        assert_eq!(launcher.latency_launches(), 0);
    }

    #[test]
    fn test_execute_run_incomplete_descriptor_aborts() {
        let launcher = ScriptedLauncher::new(PING, IPERF);
        let link = ScriptedLinkSource::new("Interface wlo1\n\ttype managed\n", vec![LINK.to_string()]);

        let err = execute_run(
            &args(&[]),
            &MockFilesystem::new(),
            &FixedClock::at_sec(0),
            &MockSleeper::new(),
            &NeverShutdown,
            &MockLogger::new(),
            &link,
            &launcher,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            CommandError::LinkStatus(ExtractError::MissingField(_))
        ));
        assert_eq!(launcher.latency_launches(), 0);
    }

    #[test]
    fn test_run_result_debug() {
        let fs = MockFilesystem::new();
        let launcher = ScriptedLauncher::new(PING, IPERF);
        let link = ScriptedLinkSource::new(INFO, vec![LINK.to_string()]);
        let result = execute_run(
            &args(&[]),
            &fs,
            &FixedClock::at_sec(1_704_067_200),
            &MockSleeper::new(),
            &NeverShutdown,
            &MockLogger::new(),
            &link,
            &launcher,
        )
        .expect("run");
        assert!(format!("{:?}", result).contains("RunResult"));
    }
}
