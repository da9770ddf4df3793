//! Session log output.
//!
//! The sampler reports through the `Logger` trait so tests can assert on
//! exactly which lines a session emitted (the once-per-episode rules depend
//! on it).

use std::io::Write;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;

/// Verbosity level for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Always shown
    Normal,
    /// -v: per-tick records
    Verbose,
    /// -vv: prober and sink internals
    Debug,
}

impl Verbosity {
    /// Create verbosity from CLI flag count.
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    }
}

pub trait Logger: Send + Sync {
    fn log(&self, level: Verbosity, message: &str);

    fn info(&self, message: &str) {
        self.log(Verbosity::Normal, message);
    }

    fn verbose(&self, message: &str) {
        self.log(Verbosity::Verbose, message);
    }

    fn debug(&self, message: &str) {
        self.log(Verbosity::Debug, message);
    }
}

/// Writes `HH:MM:SS message` lines (UTC) to stderr.
#[derive(Debug)]
pub struct StderrLogger {
    level: Verbosity,
}

impl StderrLogger {
    pub fn new(level: Verbosity) -> Self {
        Self { level }
    }

    pub fn level(&self) -> Verbosity {
        self.level
    }
}

impl Logger for StderrLogger {
    fn log(&self, level: Verbosity, message: &str) {
        if level <= self.level {
            let stamp = Utc::now().format("%H:%M:%S");
            let _ = writeln!(std::io::stderr(), "{} {}", stamp, message);
        }
    }
}

/// A captured log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Verbosity,
    pub message: String,
}

/// Captures every entry regardless of level. Clones share the capture.
#[derive(Debug, Clone, Default)]
pub struct MockLogger {
    entries: Arc<RwLock<Vec<LogEntry>>>,
}

impl MockLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.message).collect()
    }

    pub fn contains(&self, substring: &str) -> bool {
        self.count_containing(substring) > 0
    }

    /// Number of entries whose message contains `substring`.
    pub fn count_containing(&self, substring: &str) -> usize {
        self.entries()
            .iter()
            .filter(|e| e.message.contains(substring))
            .count()
    }
}

impl Logger for MockLogger {
    fn log(&self, level: Verbosity, message: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogEntry {
                level,
                message: message.to_string(),
            });
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: Verbosity, _message: &str) {}
}
