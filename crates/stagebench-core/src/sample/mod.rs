//! Event sampler.
//!
//! One pass reads the sample log fresh from disk, polls the cluster for the
//! stages still missing, merges what it sees (first writer wins) and replaces
//! the sample log atomically. Passes are safe to repeat at any time, including
//! while the scheduler is still appending to the submission log.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::client::{ResourceClient, ResourceState};
use crate::error::{BenchError, BenchResult};
use crate::journal::{SampleStore, SubmissionLog};
use crate::model::{EventTimeline, ResourceKind, Stage, StageSet, WorkloadKind, WorkloadRecord};

mod extract;

use extract::ResourceIndex;

/// Stages that settle a workload: once both are known, an event stage that
/// never fired takes the scheduling decision timestamp.
const SETTLED: [Stage; 2] = [Stage::Scheduled, Stage::PodReady];

/// Outcome of one sampling pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleReport {
    /// Successfully submitted workloads of the sampled kind and namespace.
    pub tracked: usize,
    pub resolved_before: usize,
    pub resolved_after: usize,
    /// Records skipped because their submission failed.
    pub skipped_errors: usize,
    pub stages_added: usize,
    /// Resource kinds that could not be listed in this pass.
    pub failed_kinds: Vec<ResourceKind>,
}

impl SampleReport {
    pub fn unresolved(&self) -> usize {
        self.tracked - self.resolved_after
    }
}

pub struct Sampler {
    client: Arc<dyn ResourceClient>,
    submissions: SubmissionLog,
    store: SampleStore,
}

impl Sampler {
    pub fn new(client: Arc<dyn ResourceClient>, output_dir: impl AsRef<Path>) -> Self {
        let dir = output_dir.as_ref();
        Self {
            client,
            submissions: SubmissionLog::in_dir(dir),
            store: SampleStore::in_dir(dir),
        }
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    /// Run one pass over the `kind` workloads submitted to `namespace`.
    pub async fn run(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        stages: &StageSet,
    ) -> BenchResult<SampleReport> {
        let mut log = self.store.load()?;
        let records = self.submissions.read()?;

        let mut report = SampleReport::default();
        let mut unresolved: Vec<&WorkloadRecord> = Vec::new();
        for record in records
            .iter()
            .filter(|r| r.kind == kind && r.namespace == namespace)
        {
            if !record.is_submitted() {
                report.skipped_errors += 1;
                continue;
            }
            report.tracked += 1;
            if stages.is_resolved(log.get(&record.id)) {
                report.resolved_before += 1;
            } else {
                unresolved.push(record);
            }
        }

        if unresolved.is_empty() {
            report.resolved_after = report.resolved_before;
            info!(
                kind = %kind,
                tracked = report.tracked,
                "every tracked workload is resolved, nothing to poll"
            );
            if !self.store.exists() {
                self.store.persist(&log)?;
            }
            return Ok(report);
        }

        let mut needed = BTreeSet::new();
        for record in &unresolved {
            let timeline = log.get(&record.id);
            for stage in stages.missing(timeline) {
                needed.insert(stage.source());
                let unsettled = SETTLED
                    .iter()
                    .any(|s| timeline.and_then(|t| t.get(*s)).is_none());
                if stage.is_event() && unsettled {
                    needed.insert(ResourceKind::Pod);
                }
            }
        }
        let listed = self.list_kinds(kind, namespace, &needed, &mut report).await?;

        let ids: HashSet<String> = unresolved.iter().map(|r| r.id.clone()).collect();
        let index = ResourceIndex::build(listed, &ids);

        for record in &unresolved {
            let missing: Vec<Stage> = stages
                .missing(log.get(&record.id))
                .filter(|stage| !report.failed_kinds.contains(&stage.source()))
                .collect();
            for stage in missing {
                let at = match index.observe(stage, &record.id, record.replicas) {
                    Some(at) => at,
                    None if stage.is_event() => {
                        let Some(at) = settled_at(&index, log.get(&record.id), record) else {
                            continue;
                        };
                        debug!(
                            id = %record.id,
                            stage = %stage,
                            "no event by readiness, using scheduling decision"
                        );
                        at
                    }
                    None => continue,
                };
                let timeline = log
                    .timelines
                    .entry(record.id.clone())
                    .or_insert_with(|| EventTimeline::new(kind));
                if timeline.record(stage, at) {
                    debug!(id = %record.id, stage = %stage, at = %at, "stage observed");
                    report.stages_added += 1;
                }
            }
        }

        report.resolved_after = report.resolved_before
            + unresolved
                .iter()
                .filter(|r| stages.is_resolved(log.get(&r.id)))
                .count();

        if report.stages_added > 0 || !self.store.exists() {
            self.store.persist(&log)?;
        }
        info!(
            kind = %kind,
            tracked = report.tracked,
            resolved = report.resolved_after,
            stages_added = report.stages_added,
            skipped_errors = report.skipped_errors,
            "sampling pass finished"
        );
        Ok(report)
    }

    /// List each needed kind once. Fails only when no kind could be listed.
    async fn list_kinds(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        needed: &BTreeSet<ResourceKind>,
        report: &mut SampleReport,
    ) -> BenchResult<Vec<ResourceState>> {
        let mut listed = Vec::new();
        let mut last_error = String::new();
        for &resource in needed {
            match self.client.list(namespace, kind, resource).await {
                Ok(states) => {
                    debug!(resource = %resource, count = states.len(), "listed resources");
                    listed.extend(states);
                }
                Err(e) => {
                    warn!(
                        resource = %resource,
                        namespace = %namespace,
                        error = %e,
                        "listing failed, dependent stages stay unresolved"
                    );
                    last_error = e.to_string();
                    report.failed_kinds.push(resource);
                }
            }
        }

        if report.failed_kinds.len() == needed.len() {
            let kinds: Vec<&str> = report.failed_kinds.iter().map(|k| k.as_str()).collect();
            return Err(BenchError::Transport {
                namespace: namespace.to_string(),
                kinds: kinds.join(", "),
                message: last_error,
            });
        }
        Ok(listed)
    }
}

/// Scheduling decision of a workload whose first pod is ready, from the log or
/// from this pass's listing.
fn settled_at(
    index: &ResourceIndex,
    timeline: Option<&EventTimeline>,
    record: &WorkloadRecord,
) -> Option<DateTime<Utc>> {
    let seen = |stage: Stage| {
        timeline
            .and_then(|t| t.get(stage))
            .or_else(|| index.observe(stage, &record.id, record.replicas))
    };
    seen(Stage::PodReady)?;
    seen(Stage::Scheduled)
}
