//! Delta aggregation: joins the submission and sample logs into per-workload
//! stage-to-stage durations.
//!
//! Pure; the CLI decides where the result goes.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::journal::SampleLog;
use crate::model::{EventTimeline, Stage, StageSet, WorkloadKind, WorkloadRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowStatus {
    /// Every configured stage was observed.
    Complete,
    /// Submitted, but at least one stage is still unobserved.
    Partial,
    /// Observed timestamps that cannot be measured from, see [`anomaly`].
    Anomalous,
    /// The creation call failed.
    Error,
}

impl RowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Anomalous => "anomalous",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDelta {
    pub stage: Stage,
    /// Seconds since the previous observed stage (or since submission).
    pub delta_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaRow {
    pub id: String,
    pub kind: WorkloadKind,
    pub submitted_at: DateTime<Utc>,
    pub deltas: Vec<StageDelta>,
    pub status: RowStatus,
    /// Seconds from submission to the scheduling decision, when observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling_seconds: Option<i64>,
    /// Submission error of `error` rows, or what makes an `anomalous` row unusable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeltaRow {
    pub fn delta(&self, stage: Stage) -> Option<i64> {
        self.deltas
            .iter()
            .find(|d| d.stage == stage)
            .map(|d| d.delta_seconds)
    }
}

/// Status counts over every joined workload, before exclusion and truncation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub complete: usize,
    pub partial: usize,
    pub error: usize,
    #[serde(default)]
    pub anomalous: usize,
    /// Rows dropped by the `skip_*` options.
    pub excluded: usize,
}

/// Mean delta of one stage over the rows that observed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageAverage {
    pub stage: Stage,
    pub mean_seconds: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDataset {
    pub stages: Vec<Stage>,
    pub rows: Vec<DeltaRow>,
    pub summary: Summary,
    pub averages: Vec<StageAverage>,
    /// Mean of `scheduling_seconds` over the kept rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling_average: Option<StageAverage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Restrict both logs to one workload kind.
    pub kind: Option<WorkloadKind>,
    /// Keep only the first K rows (after exclusions).
    pub head: Option<usize>,
    /// Keep only the last K rows (after exclusions and `head`).
    pub tail: Option<usize>,
    pub skip_errors: bool,
    pub skip_partial: bool,
    pub skip_anomalies: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            kind: None,
            head: None,
            tail: None,
            skip_errors: true,
            skip_partial: false,
            skip_anomalies: true,
        }
    }
}

/// Why a workload's timeline cannot be measured from, if it cannot.
///
/// A pod group older than the first pod means that pod was replaced; a
/// scheduling decision before submission means clocks disagree.
pub fn anomaly(record: &WorkloadRecord, timeline: &EventTimeline) -> Option<String> {
    if let (Some(pod), Some(group)) = (
        timeline.get(Stage::FirstPodCreated),
        timeline.get(Stage::PodGroupCreated),
    ) {
        if group.timestamp() < pod.timestamp() {
            return Some(format!(
                "pod group created {}s before the first pod",
                pod.timestamp() - group.timestamp()
            ));
        }
    }
    let scheduled = timeline.get(Stage::Scheduled)?;
    let total = scheduled.timestamp() - record.submitted_at.timestamp();
    (total < 0).then(|| format!("scheduling decision {}s before submission", -total))
}

/// Build the row of one workload.
///
/// Timestamps are compared at whole-second precision; negative deltas are
/// reported as observed.
pub fn delta_row(
    record: &WorkloadRecord,
    timeline: Option<&EventTimeline>,
    stages: &StageSet,
) -> DeltaRow {
    let mut deltas = Vec::new();
    let mut previous = record.submitted_at;
    let mut observed = 0;
    for stage in stages.iter() {
        let Some(at) = timeline.and_then(|t| t.get(stage)) else {
            continue;
        };
        deltas.push(StageDelta {
            stage,
            delta_seconds: at.timestamp() - previous.timestamp(),
        });
        previous = at;
        observed += 1;
    }

    let flagged = timeline.and_then(|t| anomaly(record, t));
    let (status, error) = if !record.is_submitted() {
        (RowStatus::Error, record.submission_error.clone())
    } else if flagged.is_some() {
        (RowStatus::Anomalous, flagged)
    } else if observed == stages.len() {
        (RowStatus::Complete, None)
    } else {
        (RowStatus::Partial, None)
    };

    DeltaRow {
        id: record.id.clone(),
        kind: record.kind,
        submitted_at: record.submitted_at,
        deltas,
        status,
        scheduling_seconds: timeline
            .and_then(|t| t.get(Stage::Scheduled))
            .map(|at| at.timestamp() - record.submitted_at.timestamp()),
        error,
    }
}

/// Join `submissions` with `samples` into rows ordered by submission time.
pub fn aggregate(
    submissions: &[WorkloadRecord],
    samples: &SampleLog,
    stages: &StageSet,
    options: &AggregateOptions,
) -> AnalysisDataset {
    let wanted = |kind: WorkloadKind| !matches!(options.kind, Some(k) if k != kind);

    let mut seen = HashSet::new();
    let mut rows: Vec<DeltaRow> = submissions
        .iter()
        .filter(|r| wanted(r.kind))
        .filter(|r| seen.insert(r.id.as_str()))
        .map(|r| delta_row(r, samples.get(&r.id), stages))
        .collect();
    rows.sort_by(|a, b| (a.submitted_at, &a.id).cmp(&(b.submitted_at, &b.id)));

    let orphans: Vec<&str> = samples
        .timelines
        .iter()
        .filter(|(id, t)| wanted(t.kind) && !seen.contains(id.as_str()))
        .map(|(id, _)| id.as_str())
        .collect();
    if !orphans.is_empty() {
        warn!(
            count = orphans.len(),
            first = orphans[0],
            "sampled workloads without a submission record are ignored"
        );
    }

    let mut summary = Summary {
        total: rows.len(),
        ..Summary::default()
    };
    for row in &rows {
        match row.status {
            RowStatus::Complete => summary.complete += 1,
            RowStatus::Partial => summary.partial += 1,
            RowStatus::Error => summary.error += 1,
            RowStatus::Anomalous => summary.anomalous += 1,
        }
    }

    rows.retain(|row| {
        let excluded = match row.status {
            RowStatus::Error => options.skip_errors,
            RowStatus::Partial => options.skip_partial,
            RowStatus::Anomalous => options.skip_anomalies,
            RowStatus::Complete => false,
        };
        !excluded
    });
    summary.excluded = summary.total - rows.len();

    if let Some(head) = options.head {
        rows.truncate(head);
    }
    if let Some(tail) = options.tail {
        let skip = rows.len().saturating_sub(tail);
        rows.drain(..skip);
    }

    let averages = stages
        .iter()
        .filter_map(|stage| mean(stage, rows.iter().filter_map(|r| r.delta(stage))))
        .collect();
    let scheduling_average = mean(
        Stage::Scheduled,
        rows.iter().filter_map(|r| r.scheduling_seconds),
    );
    AnalysisDataset {
        stages: stages.stages().to_vec(),
        rows,
        summary,
        averages,
        scheduling_average,
    }
}

fn mean(stage: Stage, values: impl Iterator<Item = i64>) -> Option<StageAverage> {
    let values: Vec<i64> = values.collect();
    if values.is_empty() {
        return None;
    }
    Some(StageAverage {
        stage,
        mean_seconds: values.iter().sum::<i64>() as f64 / values.len() as f64,
        samples: values.len(),
    })
}
