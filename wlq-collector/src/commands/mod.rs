//! Command orchestration for CLI subcommands.
//!
//! Provides execute functions for:
//! - `run` - Sample a session, then write its summary
//! - `status` - Poll the link once

pub mod run;
pub mod status;

pub use run::{execute_run, run_session, RunResult};
pub use status::{execute_status, StatusResult};

use crate::cli::CliError;
use crate::io::OutputWriterError;
use thiserror::Error;
use wlq_fs::{FsError, SinkError};
use wlq_probe::{ExtractError, ProbeError};

/// Errors from command execution.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] CliError),

    #[error("filesystem error: {0}")]
    Filesystem(#[from] FsError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("link status error: {0}")]
    LinkStatus(#[from] ExtractError),

    #[error("prober error: {0}")]
    Probe(#[from] ProbeError),

    #[error("output error: {0}")]
    Output(#[from] OutputWriterError),
}

/// Result of command execution.
pub type CommandResult<T> = Result<T, CommandError>;
