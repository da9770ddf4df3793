//! Exit codes for the wlq CLI.
//!
//! Following Unix conventions for exit codes.

use crate::commands::CommandError;

/// Exit code constants.
pub mod codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Invalid arguments.
    pub const INVALID_ARGS: i32 = 1;
    /// IO error.
    pub const IO_ERROR: i32 = 2;
    /// Link descriptor missing or unusable.
    pub const LINK_ERROR: i32 = 3;
    /// A prober (or `iw`) could not be started or failed.
    pub const PROBE_ERROR: i32 = 4;
    /// Interrupted by signal (128 + signal number).
    pub const SIGINT: i32 = 130;
}

/// Map a CommandError to an exit code.
pub fn exit_code(error: &CommandError) -> i32 {
    match error {
        CommandError::InvalidArgument(_) => codes::INVALID_ARGS,
        CommandError::Filesystem(_) => codes::IO_ERROR,
        CommandError::Sink(_) => codes::IO_ERROR,
        CommandError::Output(_) => codes::IO_ERROR,
        CommandError::LinkStatus(_) => codes::LINK_ERROR,
        CommandError::Probe(_) => codes::PROBE_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CliError;
    use crate::io::OutputWriterError;
    use wlq_fs::FsError;
    use wlq_probe::{ExtractError, ProbeError};

    #[test]
    fn test_exit_code_invalid_argument() {
        let error = CommandError::InvalidArgument(CliError::InvalidPort(0));
        assert_eq!(exit_code(&error), codes::INVALID_ARGS);
    }

    #[test]
    fn test_exit_code_filesystem() {
        let error = CommandError::Filesystem(FsError::Path("test".to_string()));
        assert_eq!(exit_code(&error), codes::IO_ERROR);
    }

    #[test]
    fn test_exit_code_output() {
        let error = CommandError::Output(OutputWriterError::CreateDir(FsError::Path(
            "test".to_string(),
        )));
        assert_eq!(exit_code(&error), codes::IO_ERROR);
    }

    #[test]
    fn test_exit_code_link_status() {
        let error = CommandError::LinkStatus(ExtractError::LinkDown);
        assert_eq!(exit_code(&error), codes::LINK_ERROR);
    }

    #[test]
    fn test_exit_code_probe() {
        let error = CommandError::Probe(ProbeError::Vanished {
            prober: "latency".to_string(),
        });
        assert_eq!(exit_code(&error), codes::PROBE_ERROR);
    }

    #[test]
    fn test_exit_codes_constants() {
        assert_eq!(codes::SUCCESS, 0);
        assert_eq!(codes::INVALID_ARGS, 1);
        assert_eq!(codes::IO_ERROR, 2);
        assert_eq!(codes::LINK_ERROR, 3);
        assert_eq!(codes::PROBE_ERROR, 4);
        assert_eq!(codes::SIGINT, 130);
    }
}
