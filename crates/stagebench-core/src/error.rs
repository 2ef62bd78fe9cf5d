//! Error types for the measurement pipeline.
//!
//! Per-workload submission failures and unobserved stages are not errors at
//! this level; they are recorded as data. Only transport and log I/O failures
//! (and bad input) surface here.

use std::path::PathBuf;

/// Failures reading or durably writing the submission or sample log.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Filesystem operation failed.
    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        path: PathBuf,
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A complete record could not be parsed.
    #[error("malformed record at {}:{line}: {source}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The sample log was written by an incompatible version.
    #[error("unsupported sample log version {found} in {} (supported: {supported})", path.display())]
    Version {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    /// Record serialization failed.
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl LogError {
    pub(crate) fn io(path: impl Into<PathBuf>, op: &'static str, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            op,
            source,
        }
    }
}

/// Pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// Malformed input parameters.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Configuration file could not be read or validated.
    #[error("configuration error in {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    /// Workload template could not be loaded.
    #[error("template error: {message}")]
    Template { message: String },

    /// Submission or sample log I/O failure.
    #[error(transparent)]
    Log(#[from] LogError),

    /// No resource kind could be listed in this pass.
    #[error("no resource kind reachable in namespace {namespace} (tried {kinds}): {message}")]
    Transport {
        namespace: String,
        kinds: String,
        message: String,
    },
}

impl BenchError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidParams(_) => 1,
            Self::Config { .. } => 2,
            Self::Template { .. } => 2,
            Self::Transport { .. } => 3,
            Self::Log(_) => 4,
        }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidParams(detail.into())
    }
}

/// Result type for pipeline operations.
pub type BenchResult<T> = Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_separate_input_from_io() {
        assert_eq!(BenchError::invalid("count must be > 0").exit_code(), 1);
        let transport = BenchError::Transport {
            namespace: "runai-project-0".into(),
            kinds: "pods".into(),
            message: "connection refused".into(),
        };
        assert_eq!(transport.exit_code(), 3);

        let io = LogError::io(
            "/tmp/x/submitted.jsonl",
            "append to",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let err: BenchError = io.into();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("append to /tmp/x/submitted.jsonl"));
    }
}
