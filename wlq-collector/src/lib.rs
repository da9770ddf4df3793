//! wlq sampler CLI.
//!
//! This crate wires the link source, probers and record sink into a
//! per-second sampling session and exports the session summary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod exit;
pub mod io;
pub mod logger;
pub mod signal;
pub mod sleeper;
pub mod summary;

pub use cli::{parse_from, Cli, CliError, Command, RunArgs, StatusArgs, DEFAULT_OUTPUT_DIR};
pub use commands::{
    execute_run, execute_status, run_session, CommandError, CommandResult, RunResult,
    StatusResult,
};
pub use config::SessionConfig;
pub use coordinator::{Phase, ProberStreams, Sampler, SkipReason, TickOutcome, TickState};
pub use logger::{Logger, MockLogger, NullLogger, StderrLogger, Verbosity};
pub use signal::{CountingShutdown, NeverShutdown, ShutdownCheck, ShutdownFlag};
pub use sleeper::{MockSleeper, RealSleeper, Sleeper};
pub use summary::{reduce, SessionResult, SessionTotals};
