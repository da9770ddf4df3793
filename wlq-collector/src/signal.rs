//! Interrupt handling.
//!
//! Ctrl+C stops new ticks; the session still drains the sink and writes its
//! summary.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub trait ShutdownCheck: Send + Sync {
    /// Returns true if shutdown has been requested.
    fn should_stop(&self) -> bool;
}

/// Set by SIGINT once `install` has registered the handler.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    flag: Arc<AtomicBool>,
}

impl ShutdownFlag {
    /// Flag wired to Ctrl+C.
    ///
    /// If a handler is already registered the flag still works through
    /// `trigger`.
    pub fn install() -> Self {
        let flag = Self::default();
        let handle = Arc::clone(&flag.flag);
        let _ = ctrlc::set_handler(move || {
            handle.store(true, Ordering::SeqCst);
        });
        flag
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl ShutdownCheck for ShutdownFlag {
    fn should_stop(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Never requests shutdown.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverShutdown;

impl ShutdownCheck for NeverShutdown {
    fn should_stop(&self) -> bool {
        false
    }
}

/// Requests shutdown after answering "keep going" `checks` times.
#[derive(Debug, Default)]
pub struct CountingShutdown {
    remaining: AtomicU64,
}

impl CountingShutdown {
    pub fn new(checks: u64) -> Self {
        Self {
            remaining: AtomicU64::new(checks),
        }
    }
}

impl ShutdownCheck for CountingShutdown {
    fn should_stop(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }
}
