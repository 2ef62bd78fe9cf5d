//! Append-only submission log (JSON Lines).

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::LogError;
use crate::model::WorkloadRecord;

pub const SUBMISSION_LOG_FILE: &str = "submitted.jsonl";

#[derive(Debug, Clone)]
pub struct SubmissionLog {
    path: PathBuf,
}

impl SubmissionLog {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SUBMISSION_LOG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `records` as whole lines and flush them to stable storage.
    ///
    /// The batch is written with a single `write_all` on an `O_APPEND` handle;
    /// existing lines are never touched.
    pub fn append(&self, records: &[WorkloadRecord]) -> Result<(), LogError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record).map_err(|source| LogError::Serialize {
                what: "workload record",
                source,
            })?;
            buf.push(b'\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LogError::io(&self.path, "open", e))?;
        file.write_all(&buf)
            .map_err(|e| LogError::io(&self.path, "append to", e))?;
        file.sync_data()
            .map_err(|e| LogError::io(&self.path, "sync", e))?;

        debug!(path = %self.path.display(), records = records.len(), "appended submission records");
        Ok(())
    }

    /// Read every complete record, first occurrence of an id wins.
    ///
    /// A missing file reads as empty. A trailing line without its newline is a
    /// write still in flight (or cut short by a crash) and is ignored.
    pub fn read(&self) -> Result<Vec<WorkloadRecord>, LogError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LogError::io(&self.path, "read", e)),
        };

        let complete = match raw.rfind('\n') {
            Some(end) => &raw[..=end],
            None => "",
        };
        if complete.len() < raw.len() {
            debug!(
                path = %self.path.display(),
                bytes = raw.len() - complete.len(),
                "ignoring incomplete trailing record"
            );
        }

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for (idx, line) in complete.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: WorkloadRecord =
                serde_json::from_str(line).map_err(|source| LogError::Parse {
                    path: self.path.clone(),
                    line: idx + 1,
                    source,
                })?;
            if seen.insert(record.id.clone()) {
                records.push(record);
            } else {
                warn!(id = %record.id, line = idx + 1, "duplicate submission record ignored");
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkloadKind;
    use chrono::{TimeZone, Utc};

    fn record(id: &str, error: Option<&str>) -> WorkloadRecord {
        WorkloadRecord {
            id: id.into(),
            kind: WorkloadKind::Training,
            project: "project-0".into(),
            namespace: "runai-project-0".into(),
            replicas: 1,
            submitted_at: Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap(),
            submission_error: error.map(String::from),
        }
    }

    #[test]
    fn missing_log_reads_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(SubmissionLog::in_dir(dir.path()).read().unwrap().is_empty());
    }

    #[test]
    fn later_states_extend_earlier_ones() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = SubmissionLog::in_dir(dir.path());

        log.append(&[record("j-000001", None), record("j-000002", Some("denied"))])
            .unwrap();
        let first = log.read().unwrap();
        let first_bytes = std::fs::read(log.path()).unwrap();

        log.append(&[record("j-000003", None)]).unwrap();
        let second = log.read().unwrap();
        let second_bytes = std::fs::read(log.path()).unwrap();

        assert_eq!(&second[..first.len()], &first[..]);
        assert_eq!(second.len(), 3);
        assert!(second_bytes.starts_with(&first_bytes));
        assert_eq!(second[1].submission_error.as_deref(), Some("denied"));
    }

    #[test]
    fn torn_trailing_line_is_ignored() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = SubmissionLog::in_dir(dir.path());
        log.append(&[record("j-000001", None)]).unwrap();

        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        file.write_all(br#"{"id":"j-000002","kind":"trai"#).unwrap();

        let records = log.read().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "j-000001");
    }

    #[test]
    fn corrupt_complete_line_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = SubmissionLog::in_dir(dir.path());
        log.append(&[record("j-000001", None)]).unwrap();
        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        file.write_all(b"not json\n").unwrap();

        match log.read().unwrap_err() {
            LogError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_ids_keep_first_record() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = SubmissionLog::in_dir(dir.path());
        log.append(&[record("j-000001", None)]).unwrap();
        log.append(&[record("j-000001", Some("second attempt"))])
            .unwrap();

        let records = log.read().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_submitted());
    }
}
