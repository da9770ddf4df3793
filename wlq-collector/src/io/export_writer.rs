//! Summary export.
//!
//! Each session appends to two files in the output directory:
//! - summary.jsonl - one JSON line per session
//! - summary.csv - one row per session; the header is written when the file
//!   is created

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use wlq_fs::{Filesystem, FsError};
use wlq_schema::{Band, Direction, StopReason, SummaryReport, Transport};

pub const SUMMARY_JSONL: &str = "summary.jsonl";
pub const SUMMARY_CSV: &str = "summary.csv";

/// Header row of summary.csv, in `CsvRow` field order.
pub const CSV_HEADER: &str = "location,started_at_unix_sec,finished_at_unix_sec,duration_sec,\
direction,transport,throughput_enabled,ssid,band,channel,bandwidth_mhz,records,ticks_attempted,\
ticks_skipped,avg_signal_dbm,avg_latency_ms,avg_throughput_mbps,packets_sent,packets_received,\
loss_percent,jitter_ms,iperf_sender_mbps,iperf_receiver_mbps,stop_reason";

#[derive(Debug, Error)]
pub enum OutputWriterError {
    #[error("failed to create output directory: {0}")]
    CreateDir(#[source] FsError),

    #[error("failed to write {file}: {source}")]
    Write {
        file: String,
        #[source]
        source: FsError,
    },

    #[error("failed to encode csv row: {0}")]
    Csv(#[from] csv::Error),
}

/// Paths to written files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFiles {
    pub jsonl: PathBuf,
    pub csv: PathBuf,
}

/// Column layout of summary.csv. Field names are the header.
#[derive(Debug, Serialize)]
struct CsvRow<'r> {
    location: &'r str,
    started_at_unix_sec: u64,
    finished_at_unix_sec: u64,
    duration_sec: u64,
    direction: Direction,
    transport: Transport,
    throughput_enabled: bool,
    ssid: &'r str,
    band: Band,
    channel: u32,
    bandwidth_mhz: u32,
    records: u64,
    ticks_attempted: u64,
    ticks_skipped: u64,
    avg_signal_dbm: f64,
    avg_latency_ms: f64,
    avg_throughput_mbps: f64,
    packets_sent: Option<u64>,
    packets_received: Option<u64>,
    loss_percent: Option<f64>,
    jitter_ms: Option<f64>,
    iperf_sender_mbps: Option<f64>,
    iperf_receiver_mbps: Option<f64>,
    stop_reason: StopReason,
}

impl<'r> From<&'r SummaryReport> for CsvRow<'r> {
    fn from(report: &'r SummaryReport) -> Self {
        Self {
            location: &report.location,
            started_at_unix_sec: report.started_at_unix_sec,
            finished_at_unix_sec: report.finished_at_unix_sec,
            duration_sec: report.duration_sec,
            direction: report.direction,
            transport: report.transport,
            throughput_enabled: report.throughput_enabled,
            ssid: &report.ssid,
            band: report.band,
            channel: report.channel,
            bandwidth_mhz: report.bandwidth_mhz,
            records: report.records,
            ticks_attempted: report.ticks_attempted,
            ticks_skipped: report.ticks_skipped,
            avg_signal_dbm: report.avg_signal_dbm,
            avg_latency_ms: report.avg_latency_ms,
            avg_throughput_mbps: report.avg_throughput_mbps,
            packets_sent: report.packets_sent,
            packets_received: report.packets_received,
            loss_percent: report.loss_percent,
            jitter_ms: report.jitter_ms,
            iperf_sender_mbps: report.iperf_sender_mbps,
            iperf_receiver_mbps: report.iperf_receiver_mbps,
            stop_reason: report.stop_reason,
        }
    }
}

/// Encode one report as CSV, header line first when `with_header` is set.
pub fn encode_csv(
    report: &SummaryReport,
    with_header: bool,
) -> Result<Vec<u8>, OutputWriterError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(with_header)
        .from_writer(Vec::new());
    wtr.serialize(CsvRow::from(report))?;
    wtr.into_inner()
        .map_err(|e| OutputWriterError::Csv(csv::Error::from(e.into_error())))
}

pub struct ExportWriter<'a, F: Filesystem> {
    fs: &'a F,
    out_dir: &'a Path,
}

impl<'a, F: Filesystem> ExportWriter<'a, F> {
    pub fn new(fs: &'a F, out_dir: &'a Path) -> Self {
        Self { fs, out_dir }
    }

    pub fn write_all(&self, report: &SummaryReport) -> Result<WrittenFiles, OutputWriterError> {
        self.fs
            .create_dir_all(self.out_dir)
            .map_err(OutputWriterError::CreateDir)?;

        Ok(WrittenFiles {
            jsonl: self.append_jsonl(report)?,
            csv: self.append_csv(report)?,
        })
    }

    fn append(&self, file: &str, content: &[u8]) -> Result<PathBuf, OutputWriterError> {
        let path = self.out_dir.join(file);
        self.fs
            .append_atomic(&path, content)
            .map_err(|source| OutputWriterError::Write {
                file: file.to_string(),
                source,
            })?;
        Ok(path)
    }

    pub fn append_jsonl(&self, report: &SummaryReport) -> Result<PathBuf, OutputWriterError> {
        self.append(SUMMARY_JSONL, format!("{}\n", report.to_json()).as_bytes())
    }

    pub fn append_csv(&self, report: &SummaryReport) -> Result<PathBuf, OutputWriterError> {
        let fresh = !self.fs.exists(&self.out_dir.join(SUMMARY_CSV));
        self.append(SUMMARY_CSV, &encode_csv(report, fresh)?)
    }
}
