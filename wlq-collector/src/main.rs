//! wlq CLI binary.
//!
//! Entry point for the `wlq` command-line tool.

use std::process::ExitCode;

use clap::Parser;
use wlq_clock::SystemClock;
use wlq_collector::exit::{codes, exit_code};
use wlq_collector::{
    execute_run, execute_status, Cli, Command, CommandError, RealSleeper, ShutdownFlag,
    StderrLogger, Verbosity,
};
use wlq_fs::RealFilesystem;
use wlq_probe::{IwLinkSource, ProcessLauncher};
use wlq_schema::StopReason;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let logger = StderrLogger::new(Verbosity::from_count(cli.verbose));

    let result = match cli.command {
        Command::Run(args) => run_run(args, &logger),
        Command::Status(args) => run_status(args),
    };

    match result {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(exit_code(&e) as u8)
        }
    }
}

/// Run a sampling session.
fn run_run(args: wlq_collector::RunArgs, logger: &StderrLogger) -> Result<i32, CommandError> {
    // Registered before the probers start so they share the terminal's SIGINT.
    let shutdown = ShutdownFlag::install();
    let link = IwLinkSource::new(args.interface.clone());

    let result = execute_run(
        &args,
        &RealFilesystem,
        &SystemClock,
        &RealSleeper,
        &shutdown,
        logger,
        &link,
        &ProcessLauncher,
    )?;

    println!("Session {}:", result.report.stop_reason);
    println!(
        "  Records: {} of {} ticks ({} skipped)",
        result.report.records, result.report.ticks_attempted, result.report.ticks_skipped
    );
    println!("  Avg signal: {} dBm", result.report.avg_signal_dbm);
    println!("  Avg latency: {} ms", result.report.avg_latency_ms);
    println!("  Avg throughput: {} Mbit/s", result.report.avg_throughput_mbps);
    if result.sink.dropped > 0 {
        println!("  Records dropped by sink: {}", result.sink.dropped);
    }
    println!();
    println!("Output files:");
    println!("  Records: {}", args.out_dir.display());
    println!("  Summary: {}", result.files.jsonl.display());
    println!("  Summary CSV: {}", result.files.csv.display());

    match result.report.stop_reason {
        StopReason::Interrupted => Ok(codes::SIGINT),
        _ => Ok(codes::SUCCESS),
    }
}

/// Print the current link.
fn run_status(args: wlq_collector::StatusArgs) -> Result<i32, CommandError> {
    let link = IwLinkSource::new(args.interface);
    let status = execute_status(&link)?;
    if args.json {
        match serde_json::to_string_pretty(&status) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("error: {}", e),
        }
        return Ok(codes::SUCCESS);
    }
    let snapshot = &status.snapshot;

    println!("SSID: {}", snapshot.ssid);
    println!(
        "Channel: {} ({} MHz, {}), width {} MHz, center {} MHz",
        snapshot.channel,
        snapshot.frequency_mhz,
        snapshot.band,
        snapshot.bandwidth_mhz,
        snapshot.center_frequency_mhz
    );
    match status.sample {
        Some(sample) => {
            println!("Signal: {} dBm", sample.signal_dbm);
            println!(
                "Bitrate: rx {} Mbit/s (MCS {}), tx {} Mbit/s (MCS {}), NSS {}",
                sample.rx_bitrate_mbps,
                sample.rx_mcs,
                sample.tx_bitrate_mbps,
                sample.tx_mcs,
                sample.nss
            );
        }
        None => println!("Link dropped before the quality poll"),
    }

    Ok(codes::SUCCESS)
}
