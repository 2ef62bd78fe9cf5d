//! Process exit codes. Part of the CLI contract; scripts branch on them.

use stagebench_core::BenchError;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_INVALID_INPUT: i32 = 1; // Bad flags, missing output directory
pub const EXIT_CONFIG_ERROR: i32 = 2; // Config file or template problem
pub const EXIT_TRANSPORT_ERROR: i32 = 3; // No resource kind could be listed
pub const EXIT_LOG_IO: i32 = 4; // Submission/sample log could not be read or written

/// Exit code for a failed command.
pub fn for_error(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<BenchError>() {
        Some(BenchError::InvalidParams(_)) => EXIT_INVALID_INPUT,
        Some(BenchError::Config { .. } | BenchError::Template { .. }) => EXIT_CONFIG_ERROR,
        Some(BenchError::Transport { .. }) => EXIT_TRANSPORT_ERROR,
        Some(BenchError::Log(_)) => EXIT_LOG_IO,
        None => EXIT_CONFIG_ERROR,
    }
}
