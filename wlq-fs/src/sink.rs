//! Buffered record sink.
//!
//! The coordinator appends one record per tick. Records are buffered and
//! handed to a single writer thread in batches, so a slow or retrying write
//! never delays the next tick. The writer takes batches in the order they
//! were cut. A flush waits for its batch at most `max_flush_wait`.

use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use wlq_schema::AggregatedRecord;

use crate::writer::{records_filename, Filesystem, FsError};

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default write attempts per batch.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default per-attempt budget, also the pause after a failed attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors surfaced by a record sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to create record directory: {0}")]
    CreateDir(#[source] FsError),

    #[error("gave up writing {dropped} records to {file} after {attempts} attempts: {source}")]
    Exhausted {
        file: String,
        attempts: u32,
        dropped: usize,
        #[source]
        source: FsError,
    },
}

/// Counters describing what the sink has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub written: u64,
    pub dropped: u64,
}

/// Buffered logger capability consumed by the coordinator.
pub trait RecordSink: Send + Sync {
    /// Buffer one record; may cut and dispatch a batch.
    fn append(&self, record: AggregatedRecord) -> Result<(), SinkError>;

    /// Write everything still buffered and wait for it, at most
    /// `max_flush_wait`. Returns the number of records written by this
    /// call; 0 when the wait ran out first.
    fn flush(&self) -> Result<usize, SinkError>;

    /// True while any batch write has not finished.
    fn flush_in_progress(&self) -> bool;

    /// Upper bound on how long an in-flight flush can take (retries x timeout).
    fn max_flush_wait(&self) -> Duration;

    /// Records written and dropped so far.
    fn stats(&self) -> SinkStats;
}

/// Batching and retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkConfig {
    pub batch_size: usize,
    pub retries: u32,
    pub timeout: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SinkConfig {
    /// Builder: set batch_size (minimum 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Builder: set retries (minimum 1).
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    /// Builder: set timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One unit of work for the writer thread.
struct Job {
    batch: Vec<AggregatedRecord>,
    /// Set by `flush`, which waits for the result.
    done: Option<SyncSender<Result<usize, SinkError>>>,
}

struct Shared<F: Filesystem> {
    fs: F,
    output_dir: PathBuf,
    config: SinkConfig,
    /// Jobs sent to the writer and not yet finished.
    in_flight: AtomicUsize,
    written: AtomicU64,
    dropped: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<F: Filesystem> Shared<F> {
    /// Writer thread body: runs until every sender is gone.
    fn write_jobs(&self, jobs: Receiver<Job>) {
        for job in jobs {
            let result = if job.batch.is_empty() {
                Ok(0)
            } else {
                self.write_batch(&job.batch)
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            // Failures are already counted in stats; a flush that stopped
            // waiting has dropped its receiver.
            if let Some(done) = job.done {
                let _ = done.send(result);
            }
        }
    }

    fn write_batch(&self, batch: &[AggregatedRecord]) -> Result<usize, SinkError> {
        self.fs
            .create_dir_all(&self.output_dir)
            .map_err(SinkError::CreateDir)?;

        let mut written = 0;
        let mut first_error = None;

        for (file, lines, count) in group_by_file(batch) {
            let path = self.output_dir.join(&file);
            match self.append_with_retry(&path, lines.as_bytes()) {
                Ok(()) => {
                    written += count;
                    self.written.fetch_add(count as u64, Ordering::SeqCst);
                }
                Err(source) => {
                    self.dropped.fetch_add(count as u64, Ordering::SeqCst);
                    first_error.get_or_insert(SinkError::Exhausted {
                        file,
                        attempts: self.config.retries,
                        dropped: count,
                        source,
                    });
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(written),
        }
    }

    fn append_with_retry(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        let mut attempt = 1;
        loop {
            match self.fs.append_atomic(path, data) {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= self.config.retries => return Err(e),
                Err(_) => {
                    attempt += 1;
                    thread::sleep(self.config.timeout);
                }
            }
        }
    }
}

/// Split a batch into consecutive runs that land in the same hourly file.
fn group_by_file(batch: &[AggregatedRecord]) -> Vec<(String, String, usize)> {
    let mut groups: Vec<(String, String, usize)> = Vec::new();
    for record in batch {
        let file = records_filename(record.ts_unix_ms);
        let line = record.to_json();
        match groups.last_mut() {
            Some((current, lines, count)) if *current == file => {
                lines.push_str(&line);
                lines.push('\n');
                *count += 1;
            }
            _ => groups.push((file, format!("{}\n", line), 1)),
        }
    }
    groups
}

/// `RecordSink` that appends batches to hourly JSONL files.
pub struct BufferedRecordWriter<F: Filesystem + 'static> {
    shared: Arc<Shared<F>>,
    pending: Mutex<Vec<AggregatedRecord>>,
    jobs: Sender<Job>,
}

impl<F: Filesystem + 'static> BufferedRecordWriter<F> {
    /// Create the sink and start its writer thread. The thread exits once
    /// the sink is dropped and the queued batches are written.
    pub fn new(fs: F, output_dir: PathBuf, config: SinkConfig) -> Self {
        let shared = Arc::new(Shared {
            fs,
            output_dir,
            config,
            in_flight: AtomicUsize::new(0),
            written: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });

        let (jobs, queue) = mpsc::channel();
        let writer = Arc::clone(&shared);
        thread::spawn(move || writer.write_jobs(queue));

        Self {
            shared,
            pending: Mutex::new(Vec::new()),
            jobs,
        }
    }

    /// Get the output directory.
    pub fn output_dir(&self) -> &Path {
        &self.shared.output_dir
    }

    /// Records buffered but not yet cut into a batch.
    pub fn buffered(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Queue `batch` for the writer. Called with the buffer lock held so
    /// batches reach the writer in the order they were cut.
    fn dispatch(
        &self,
        batch: Vec<AggregatedRecord>,
        done: Option<SyncSender<Result<usize, SinkError>>>,
    ) {
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        if let Err(mpsc::SendError(job)) = self.jobs.send(Job { batch, done }) {
            // Writer thread is gone; nothing will ever write these.
            self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.shared
                .dropped
                .fetch_add(job.batch.len() as u64, Ordering::SeqCst);
        }
    }
}

impl<F: Filesystem + 'static> RecordSink for BufferedRecordWriter<F> {
    fn append(&self, record: AggregatedRecord) -> Result<(), SinkError> {
        let mut pending = lock(&self.pending);
        pending.push(record);
        if pending.len() >= self.shared.config.batch_size {
            let batch = mem::take(&mut *pending);
            self.dispatch(batch, None);
        }
        Ok(())
    }

    fn flush(&self) -> Result<usize, SinkError> {
        let done = {
            let mut pending = lock(&self.pending);
            if pending.is_empty() && !self.flush_in_progress() {
                return Ok(0);
            }
            let (done, result) = mpsc::sync_channel(1);
            // An empty batch still waits behind the batches already queued.
            let batch = mem::take(&mut *pending);
            self.dispatch(batch, Some(done));
            result
        };

        match done.recv_timeout(self.max_flush_wait()) {
            Ok(result) => result,
            // Still queued or retrying; `flush_in_progress` stays true.
            Err(RecvTimeoutError::Timeout) => Ok(0),
            Err(RecvTimeoutError::Disconnected) => Ok(0),
        }
    }

    fn flush_in_progress(&self) -> bool {
        self.shared.in_flight.load(Ordering::SeqCst) > 0
    }

    fn max_flush_wait(&self) -> Duration {
        self.shared.config.timeout * self.shared.config.retries
    }

    fn stats(&self) -> SinkStats {
        SinkStats {
            written: self.shared.written.load(Ordering::SeqCst),
            dropped: self.shared.dropped.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::MockFilesystem;
    use std::time::Instant;
    use wlq_schema::{Band, Direction};

    const HOUR_START_MS: u64 = 1_704_067_200_000;

    fn record(tick: u64, ts_unix_ms: u64) -> AggregatedRecord {
        AggregatedRecord {
            version: wlq_schema::SCHEMA_VERSION,
            ts_unix_ms,
            tick,
            location: "lab".to_string(),
            direction: Direction::Upload,
            ssid: "net".to_string(),
            channel: 36,
            bandwidth_mhz: 80,
            center_frequency_mhz: 5210,
            band: Band::Ghz5,
            signal_dbm: -50,
            rx_bitrate_mbps: 600.0,
            tx_bitrate_mbps: 600.0,
            rx_mcs: 9,
            tx_mcs: 9,
            nss: 2,
            latency_ms: 10.0,
            throughput_mbps: 500.0,
        }
    }

    /// Successful writes never pause; failed attempts pause 200ms, which
    /// keeps a full retry run inside the 600ms flush wait.
    fn quick_config(batch_size: usize) -> SinkConfig {
        SinkConfig::default()
            .with_batch_size(batch_size)
            .with_retries(3)
            .with_timeout(Duration::from_millis(200))
    }

    fn wait_idle<F: Filesystem + 'static>(sink: &BufferedRecordWriter<F>) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.flush_in_progress() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!sink.flush_in_progress(), "sink did not go idle");
    }

    fn ticks_in(fs: &MockFilesystem, file: &str) -> Vec<u64> {
        let path = PathBuf::from("/tmp/records").join(file);
        fs.get_text(&path)
            .unwrap_or_default()
            .lines()
            .map(|l| AggregatedRecord::from_json(l).expect("valid record").tick)
            .collect()
    }

    // ===========================================
    // Batching
    // ===========================================

    #[test]
    fn test_append_below_batch_size_stays_buffered() {
        let fs = MockFilesystem::new();
        let sink = BufferedRecordWriter::new(fs.clone(), PathBuf::from("/tmp/records"), quick_config(5));

        for tick in 1..=4 {
            sink.append(record(tick, HOUR_START_MS + tick * 1000)).expect("append");
        }

        assert_eq!(sink.buffered(), 4);
        assert!(fs.files().is_empty());
    }

    #[test]
    fn test_full_batch_is_written_in_background() {
        let fs = MockFilesystem::new();
        let sink = BufferedRecordWriter::new(fs.clone(), PathBuf::from("/tmp/records"), quick_config(3));

        for tick in 1..=3 {
            sink.append(record(tick, HOUR_START_MS + tick * 1000)).expect("append");
        }
        wait_idle(&sink);

        assert_eq!(sink.buffered(), 0);
        assert_eq!(ticks_in(&fs, "records_2024010100.jsonl"), vec![1, 2, 3]);
        assert_eq!(sink.stats(), SinkStats { written: 3, dropped: 0 });
    }

    #[test]
    fn test_flush_writes_partial_batch() {
        let fs = MockFilesystem::new();
        let sink = BufferedRecordWriter::new(fs.clone(), PathBuf::from("/tmp/records"), quick_config(10));

        sink.append(record(1, HOUR_START_MS)).expect("append");
        sink.append(record(2, HOUR_START_MS + 1000)).expect("append");

        assert_eq!(sink.flush().expect("flush"), 2);
        assert_eq!(ticks_in(&fs, "records_2024010100.jsonl"), vec![1, 2]);
        assert!(!sink.flush_in_progress());
    }

    #[test]
    fn test_flush_empty_buffer_is_noop() {
        let fs = MockFilesystem::new();
        let sink = BufferedRecordWriter::new(fs.clone(), PathBuf::from("/tmp/records"), quick_config(10));
        assert_eq!(sink.flush().expect("flush"), 0);
        assert!(fs.files().is_empty());
    }

    #[test]
    fn test_batches_keep_tick_order() {
        let fs = MockFilesystem::new();
        let sink = BufferedRecordWriter::new(fs.clone(), PathBuf::from("/tmp/records"), quick_config(2));

        for tick in 1..=9 {
            sink.append(record(tick, HOUR_START_MS + tick * 1000)).expect("append");
        }
        sink.flush().expect("flush");
        wait_idle(&sink);

        assert_eq!(
            ticks_in(&fs, "records_2024010100.jsonl"),
            (1..=9).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_batch_spanning_hours_splits_files() {
        let fs = MockFilesystem::new();
        let sink = BufferedRecordWriter::new(fs.clone(), PathBuf::from("/tmp/records"), quick_config(10));

        sink.append(record(1, HOUR_START_MS + 3_599_000)).expect("append");
        sink.append(record(2, HOUR_START_MS + 3_600_000)).expect("append");
        sink.flush().expect("flush");

        assert_eq!(ticks_in(&fs, "records_2024010100.jsonl"), vec![1]);
        assert_eq!(ticks_in(&fs, "records_2024010101.jsonl"), vec![2]);
    }

    // ===========================================
    // Retry
    // ===========================================

    #[test]
    fn test_flush_retries_transient_failures() {
        let fs = MockFilesystem::new();
        fs.fail_next_appends(2);
        let sink = BufferedRecordWriter::new(fs.clone(), PathBuf::from("/tmp/records"), quick_config(10));

        sink.append(record(1, HOUR_START_MS)).expect("append");
        assert_eq!(sink.flush().expect("third attempt succeeds"), 1);
        assert_eq!(sink.stats().written, 1);
    }

    #[test]
    fn test_flush_gives_up_after_retries() {
        let fs = MockFilesystem::new();
        fs.fail_next_appends(3);
        let sink = BufferedRecordWriter::new(fs.clone(), PathBuf::from("/tmp/records"), quick_config(10));

        sink.append(record(1, HOUR_START_MS)).expect("append");
        sink.append(record(2, HOUR_START_MS)).expect("append");
        let err = sink.flush().unwrap_err();

        assert!(matches!(
            err,
            SinkError::Exhausted { attempts: 3, dropped: 2, .. }
        ));
        assert_eq!(sink.stats(), SinkStats { written: 0, dropped: 2 });
        assert!(!sink.flush_in_progress());
    }

    #[test]
    fn test_flush_waits_for_queued_batches() {
        let fs = MockFilesystem::new();
        let sink = BufferedRecordWriter::new(fs.clone(), PathBuf::from("/tmp/records"), quick_config(2));

        for tick in 1..=4 {
            sink.append(record(tick, HOUR_START_MS + tick * 1000)).expect("append");
        }
        // Nothing left in the buffer, but two batches may still be queued.
        assert_eq!(sink.flush().expect("flush"), 0);

        assert!(!sink.flush_in_progress());
        assert_eq!(ticks_in(&fs, "records_2024010100.jsonl"), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_flush_wait_is_bounded_by_max_flush_wait() {
        let fs = MockFilesystem::new();
        fs.fail_next_appends(1000);
        let config = SinkConfig::default()
            .with_batch_size(2)
            .with_retries(2)
            .with_timeout(Duration::from_millis(300));
        let sink = BufferedRecordWriter::new(fs.clone(), PathBuf::from("/tmp/records"), config);

        // Four full batches queue behind each other, each retrying once.
        for tick in 1..=9 {
            sink.append(record(tick, HOUR_START_MS + tick * 1000)).expect("append");
        }

        let started = Instant::now();
        assert_eq!(sink.flush().expect("flush gave up waiting"), 0);
        let waited = started.elapsed();

        assert!(
            waited < sink.max_flush_wait() + Duration::from_millis(400),
            "flush waited {:?}",
            waited
        );
        assert!(sink.flush_in_progress());
    }

    #[test]
    fn test_writer_outlives_sink_until_queue_is_written() {
        let fs = MockFilesystem::new();
        let sink = BufferedRecordWriter::new(fs.clone(), PathBuf::from("/tmp/records"), quick_config(1));
        sink.append(record(1, HOUR_START_MS)).expect("append");
        drop(sink);

        let deadline = Instant::now() + Duration::from_secs(5);
        while ticks_in(&fs, "records_2024010100.jsonl").is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(ticks_in(&fs, "records_2024010100.jsonl"), vec![1]);
    }

    #[test]
    fn test_max_flush_wait_is_retries_times_timeout() {
        let config = SinkConfig::default()
            .with_retries(4)
            .with_timeout(Duration::from_secs(2));
        let sink = BufferedRecordWriter::new(MockFilesystem::new(), PathBuf::from("/tmp"), config);
        assert_eq!(sink.max_flush_wait(), Duration::from_secs(8));
    }

    #[test]
    fn test_config_builders_clamp_to_one() {
        let config = SinkConfig::default().with_batch_size(0).with_retries(0);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.retries, 1);
    }

    #[test]
    fn test_sink_trait_object() {
        let sink: Box<dyn RecordSink> = Box::new(BufferedRecordWriter::new(
            MockFilesystem::new(),
            PathBuf::from("/tmp/records"),
            quick_config(1),
        ));
        sink.append(record(1, HOUR_START_MS)).expect("append");
        sink.flush().expect("flush");
    }
}
