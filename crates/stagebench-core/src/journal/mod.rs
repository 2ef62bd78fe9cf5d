//! Durable logs in an output directory.
//!
//! ```text
//! <output>/
//!   submitted.jsonl   # append-only, one WorkloadRecord per line
//!   sampled.json      # replaced atomically after every sampling pass
//!   analysis.json     # written by `analyze`, derived from the two above
//! ```
//!
//! The scheduler only appends to the submission log and the sampler only
//! replaces the sample log, so both may run against the same directory at
//! the same time. Two samplers on one directory may lose each other's update.

use std::path::{Path, PathBuf};

use crate::analyze::AnalysisDataset;
use crate::error::LogError;

mod io;
pub mod samples;
pub mod submissions;

pub use samples::{SampleLog, SampleStore, SAMPLE_LOG_FILE, SAMPLE_LOG_VERSION};
pub use submissions::{SubmissionLog, SUBMISSION_LOG_FILE};

pub const ANALYSIS_FILE: &str = "analysis.json";

/// Create `dir` and its parents if missing.
pub fn create_output_dir(dir: &Path) -> Result<(), LogError> {
    std::fs::create_dir_all(dir).map_err(|e| LogError::io(dir, "create output directory", e))
}

/// Write `dataset` to `<dir>/analysis.json`, replacing any earlier analysis.
pub fn write_analysis(dir: &Path, dataset: &AnalysisDataset) -> Result<PathBuf, LogError> {
    let path = dir.join(ANALYSIS_FILE);
    let mut content =
        serde_json::to_vec_pretty(dataset).map_err(|source| LogError::Serialize {
            what: "analysis dataset",
            source,
        })?;
    content.push(b'\n');
    io::write_atomic(&path, &content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_dir_below_a_file_is_an_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();

        create_output_dir(&dir.path().join("nested/run")).unwrap();
        assert!(dir.path().join("nested/run").is_dir());

        let err = create_output_dir(&blocker.join("run")).unwrap_err();
        assert!(matches!(err, LogError::Io { op: "create output directory", .. }));
    }
}
