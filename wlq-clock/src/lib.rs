//! Clock abstraction for wlq.
//!
//! Records are stamped in Unix milliseconds; session metadata in Unix seconds.
//! Both come from the same `Clock` so tests can pin or advance time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Trait for reading wall-clock time.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_unix_ms(&self) -> u64;

    /// Whole seconds since the Unix epoch.
    fn now_unix_sec(&self) -> u64 {
        self.now_unix_ms() / 1000
    }
}

/// Real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before Unix epoch")
            .as_millis() as u64
    }
}

/// Clock pinned to a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    unix_ms: u64,
}

impl FixedClock {
    /// Pin the clock to `unix_ms` milliseconds.
    pub fn at_ms(unix_ms: u64) -> Self {
        Self { unix_ms }
    }

    /// Pin the clock to `unix_sec` seconds.
    pub fn at_sec(unix_sec: u64) -> Self {
        Self::at_ms(unix_sec * 1000)
    }
}

impl Clock for FixedClock {
    fn now_unix_ms(&self) -> u64 {
        self.unix_ms
    }
}

/// Clock that moves forward by a fixed step every time it is read.
///
/// Lets a sampling loop see time pass without sleeping.
#[derive(Debug)]
pub struct SteppingClock {
    unix_ms: AtomicU64,
    step_ms: u64,
}

impl SteppingClock {
    /// Start at `start_ms`, advancing `step_ms` per read.
    pub fn new(start_ms: u64, step_ms: u64) -> Self {
        Self {
            unix_ms: AtomicU64::new(start_ms),
            step_ms,
        }
    }

    /// One read per second of simulated time.
    pub fn per_second(start_sec: u64) -> Self {
        Self::new(start_sec * 1000, 1000)
    }
}

impl Clock for SteppingClock {
    fn now_unix_ms(&self) -> u64 {
        self.unix_ms.fetch_add(self.step_ms, Ordering::SeqCst)
    }
}
