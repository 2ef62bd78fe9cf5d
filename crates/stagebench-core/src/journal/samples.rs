//! Sample log: one timeline per workload id, replaced atomically.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::io;
use crate::error::LogError;
use crate::model::EventTimeline;

pub const SAMPLE_LOG_FILE: &str = "sampled.json";
pub const SAMPLE_LOG_VERSION: u32 = 1;

/// In-memory form of the sample log.
///
/// Maps are ordered so serialization is byte-for-byte deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleLog {
    pub version: u32,
    #[serde(default)]
    pub timelines: BTreeMap<String, EventTimeline>,
}

impl Default for SampleLog {
    fn default() -> Self {
        Self {
            version: SAMPLE_LOG_VERSION,
            timelines: BTreeMap::new(),
        }
    }
}

impl SampleLog {
    pub fn get(&self, id: &str) -> Option<&EventTimeline> {
        self.timelines.get(id)
    }

    pub fn len(&self) -> usize {
        self.timelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timelines.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SampleStore {
    path: PathBuf,
}

impl SampleStore {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SAMPLE_LOG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the current on-disk state; a missing file is an empty log.
    pub fn load(&self) -> Result<SampleLog, LogError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no sample log yet");
                return Ok(SampleLog::default());
            }
            Err(e) => return Err(LogError::io(&self.path, "read", e)),
        };

        let log: SampleLog = serde_json::from_slice(&raw).map_err(|source| LogError::Parse {
            path: self.path.clone(),
            line: source.line(),
            source,
        })?;
        if log.version != SAMPLE_LOG_VERSION {
            return Err(LogError::Version {
                path: self.path.clone(),
                found: log.version,
                supported: SAMPLE_LOG_VERSION,
            });
        }
        Ok(log)
    }

    /// Replace the on-disk log with `log`.
    pub fn persist(&self, log: &SampleLog) -> Result<(), LogError> {
        let mut content =
            serde_json::to_vec_pretty(log).map_err(|source| LogError::Serialize {
                what: "sample log",
                source,
            })?;
        content.push(b'\n');
        io::write_atomic(&self.path, &content)?;
        debug!(path = %self.path.display(), timelines = log.len(), "persisted sample log");
        Ok(())
    }
}
