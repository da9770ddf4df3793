//! Sleep abstraction so tick pacing and drain countdowns run instantly in tests.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);

    fn sleep_sec(&self, seconds: u64) {
        self.sleep(Duration::from_secs(seconds));
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RealSleeper;

impl Sleeper for RealSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Returns immediately and remembers every requested duration.
#[derive(Debug, Default, Clone)]
pub struct MockSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl MockSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Duration> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn total(&self) -> Duration {
        self.calls().iter().sum()
    }
}

impl Sleeper for MockSleeper {
    fn sleep(&self, duration: Duration) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}
