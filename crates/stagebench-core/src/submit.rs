//! Submission scheduler: N creation calls in batches of at most P, D apart.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::client::ResourceClient;
use crate::error::{BenchError, BenchResult};
use crate::journal::SubmissionLog;
use crate::model::{WorkloadKind, WorkloadRecord, WorkloadRequest};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Parameters of one submission run.
#[derive(Debug, Clone)]
pub struct SubmitPlan {
    /// Total number of workloads (N).
    pub count: usize,
    /// Concurrent creation calls per batch (P).
    pub concurrency: usize,
    /// Pause between batches (D).
    pub delay: Duration,
    pub kind: WorkloadKind,
    pub project: String,
    pub namespace: String,
    pub workers: u32,
    pub gpus: u32,
    pub pvc: bool,
    pub call_timeout: Duration,
}

impl SubmitPlan {
    pub fn validate(&self) -> BenchResult<()> {
        if self.count == 0 {
            return Err(BenchError::invalid("number of workloads must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(BenchError::invalid("concurrency must be at least 1"));
        }
        if self.kind == WorkloadKind::Distributed && self.workers == 0 {
            return Err(BenchError::invalid(
                "distributed workloads need at least one worker",
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(BenchError::invalid("submission timeout must be positive"));
        }
        if self.namespace.trim().is_empty() {
            return Err(BenchError::invalid("namespace must not be empty"));
        }
        Ok(())
    }

    fn request(&self, id: String) -> WorkloadRequest {
        WorkloadRequest {
            id,
            kind: self.kind,
            project: self.project.clone(),
            namespace: self.namespace.clone(),
            workers: self.workers,
            gpus: self.gpus,
            pvc: self.pvc,
        }
    }
}

/// Convert a delay in (fractional) seconds, rejecting negative and non-finite values.
pub fn parse_delay(secs: f64) -> BenchResult<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(BenchError::invalid(format!(
            "delay must be a non-negative number of seconds, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| BenchError::invalid(format!("delay {secs}s out of range: {e}")))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitSummary {
    pub submitted: usize,
    pub failed: usize,
}

impl SubmitSummary {
    pub fn total(&self) -> usize {
        self.submitted + self.failed
    }
}

/// Shape of the workload ids generated for each submission.
pub const WORKLOAD_ID_PATTERN: &str = "j-[0-9a-f]{6}";

/// Generates `j-xxxxxx` ids, unique within one run.
#[derive(Debug, Default)]
struct IdGenerator {
    issued: HashSet<String>,
}

impl IdGenerator {
    fn next_id(&mut self) -> String {
        loop {
            let uuid = uuid::Uuid::new_v4().simple().to_string();
            let id = format!("j-{}", &uuid[..6]);
            if self.issued.insert(id.clone()) {
                return id;
            }
        }
    }
}

pub struct Scheduler {
    client: Arc<dyn ResourceClient>,
    log: SubmissionLog,
}

impl Scheduler {
    pub fn new(client: Arc<dyn ResourceClient>, log: SubmissionLog) -> Self {
        Self { client, log }
    }

    /// Submit `plan.count` workloads.
    ///
    /// Individual creation failures are recorded and do not stop the run;
    /// only invalid parameters and submission log failures are returned as
    /// errors. Records of a batch are durable before the next batch starts.
    pub async fn run(&self, plan: &SubmitPlan) -> BenchResult<SubmitSummary> {
        plan.validate()?;
        info!(
            kind = %plan.kind,
            count = plan.count,
            concurrency = plan.concurrency,
            delay_ms = plan.delay.as_millis() as u64,
            namespace = %plan.namespace,
            transport = self.client.transport_name(),
            "starting submission"
        );

        let mut ids = IdGenerator::default();
        let mut summary = SubmitSummary::default();
        let mut next = 0usize;

        while next < plan.count {
            let batch_len = plan.concurrency.min(plan.count - next);
            let mut slots: Vec<Option<WorkloadRecord>> = vec![None; batch_len];
            let mut pending: Vec<(String, chrono::DateTime<Utc>)> = Vec::with_capacity(batch_len);
            let mut join_set = JoinSet::new();

            for slot in 0..batch_len {
                let position = next + slot + 1;
                let request = plan.request(ids.next_id());
                info!(
                    "submitting {} workload {} ({}/{})",
                    plan.kind, request.id, position, plan.count
                );

                let submitted_at = Utc::now();
                pending.push((request.id.clone(), submitted_at));
                let client = self.client.clone();
                let call_timeout = plan.call_timeout;
                join_set.spawn(async move {
                    let outcome = tokio::time::timeout(call_timeout, client.create(&request)).await;
                    let (id, submission_error) = match outcome {
                        Ok(Ok(id)) => (id, None),
                        Ok(Err(e)) => (request.id.clone(), Some(e.to_string())),
                        Err(_) => (
                            request.id.clone(),
                            Some(format!("timed out after {call_timeout:?}")),
                        ),
                    };
                    let record = WorkloadRecord {
                        id,
                        kind: request.kind,
                        project: request.project.clone(),
                        namespace: request.namespace.clone(),
                        replicas: request.replicas(),
                        submitted_at,
                        submission_error,
                    };
                    (slot, record)
                });
            }

            while let Some(res) = join_set.join_next().await {
                match res {
                    Ok((slot, record)) => slots[slot] = Some(record),
                    Err(e) => warn!(error = %e, "submission task failed"),
                }
            }

            let records: Vec<WorkloadRecord> = slots
                .into_iter()
                .zip(pending)
                .map(|(record, (id, submitted_at))| {
                    record.unwrap_or_else(|| WorkloadRecord {
                        id,
                        kind: plan.kind,
                        project: plan.project.clone(),
                        namespace: plan.namespace.clone(),
                        replicas: plan.kind.replicas(plan.workers),
                        submitted_at,
                        submission_error: Some(
                            "submission task failed before completion".to_string(),
                        ),
                    })
                })
                .collect();

            for record in &records {
                match &record.submission_error {
                    None => summary.submitted += 1,
                    Some(error) => {
                        summary.failed += 1;
                        warn!(id = %record.id, error = %error, "submission failed");
                    }
                }
            }
            self.log.append(&records)?;

            next += batch_len;
            if next < plan.count && !plan.delay.is_zero() {
                tokio::time::sleep(plan.delay).await;
            }
        }

        info!(
            submitted = summary.submitted,
            failed = summary.failed,
            log = %self.log.path().display(),
            "submission finished"
        );
        Ok(summary)
    }
}
