//! Where link status text comes from.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::process::{ExternalCommand, ProbeError};

/// Default wireless interface.
pub const DEFAULT_INTERFACE: &str = "wlo1";

/// Bounded wait for the one-time descriptor poll.
pub const DESCRIPTOR_TIMEOUT: Duration = Duration::from_secs(3);

/// Bounded wait for each per-tick quality poll.
pub const QUALITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of raw link status text.
pub trait LinkStatusSource: Send + Sync {
    /// Link descriptor text (`iw <iface> info`).
    fn descriptor(&self) -> Result<String, ProbeError>;

    /// Link quality text (`iw <iface> link`).
    fn quality(&self) -> Result<String, ProbeError>;
}

/// Reads link status by shelling out to `iw`.
#[derive(Debug, Clone)]
pub struct IwLinkSource {
    interface: String,
    descriptor_timeout: Duration,
    quality_timeout: Duration,
}

impl IwLinkSource {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            descriptor_timeout: DESCRIPTOR_TIMEOUT,
            quality_timeout: QUALITY_TIMEOUT,
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn iw(&self, subcommand: &str) -> ExternalCommand {
        ExternalCommand::new("iw", vec![self.interface.clone(), subcommand.to_string()])
    }
}

impl LinkStatusSource for IwLinkSource {
    fn descriptor(&self) -> Result<String, ProbeError> {
        self.iw("info").output(self.descriptor_timeout)
    }

    fn quality(&self) -> Result<String, ProbeError> {
        self.iw("link").output(self.quality_timeout)
    }
}

/// Replays canned `iw` output.
///
/// Quality texts are handed out in order; the last one repeats once the
/// script runs out.
#[derive(Debug)]
pub struct ScriptedLinkSource {
    descriptor: String,
    quality: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl ScriptedLinkSource {
    pub fn new(descriptor: impl Into<String>, quality: Vec<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            quality: Mutex::new(quality.into()),
            last: Mutex::new(String::new()),
        }
    }

    /// Quality texts not yet handed out.
    pub fn remaining(&self) -> usize {
        self.quality
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl LinkStatusSource for ScriptedLinkSource {
    fn descriptor(&self) -> Result<String, ProbeError> {
        Ok(self.descriptor.clone())
    }

    fn quality(&self) -> Result<String, ProbeError> {
        let next = self
            .quality
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(text) = next {
            *last = text;
        }
        Ok(last.clone())
    }
}
