//! Records persisted by the pipeline and the lifecycle stage vocabulary.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Workload flavour; selects the polled resource kinds and the default stage set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkloadKind {
    Training,
    Distributed,
    Interactive,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 3] = [Self::Training, Self::Distributed, Self::Interactive];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Distributed => "distributed",
            Self::Interactive => "interactive",
        }
    }

    /// Expected pod count for a workload of this kind.
    pub fn replicas(self, workers: u32) -> u32 {
        match self {
            Self::Distributed => workers.saturating_add(1),
            Self::Training | Self::Interactive => 1,
        }
    }

    pub fn default_stages(self) -> StageSet {
        let stages = match self {
            Self::Distributed => vec![
                Stage::Created,
                Stage::JobCreated,
                Stage::FirstPodCreated,
                Stage::LastPodCreated,
                Stage::PodGroupCreated,
                Stage::Scheduled,
                Stage::PodReady,
            ],
            Self::Training | Self::Interactive => vec![
                Stage::Created,
                Stage::JobCreated,
                Stage::FirstPodCreated,
                Stage::PodGroupCreated,
                Stage::Scheduled,
                Stage::PodReady,
            ],
        };
        StageSet(stages)
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown workload type '{s}' (expected training, distributed or interactive)")
            })
    }
}

/// Kind of cluster resource a stage is observed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// The workload custom resource itself.
    Workload,
    /// The job the workload controller creates.
    Job,
    Pod,
    PodGroup,
    /// Cluster events (evictions, volume provisioning).
    Event,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Workload => "workload",
            Self::Job => "job",
            Self::Pod => "pod",
            Self::PodGroup => "pod-group",
            Self::Event => "event",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named lifecycle stage with a defining, observable resource condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Created,
    JobCreated,
    FirstPodCreated,
    LastPodCreated,
    PodGroupCreated,
    Scheduled,
    PodReady,
    FirstEviction,
    FirstPvcBindRequest,
    FirstPvcBind,
}

impl Stage {
    pub const ALL: [Stage; 10] = [
        Self::Created,
        Self::JobCreated,
        Self::FirstPodCreated,
        Self::LastPodCreated,
        Self::PodGroupCreated,
        Self::Scheduled,
        Self::PodReady,
        Self::FirstEviction,
        Self::FirstPvcBindRequest,
        Self::FirstPvcBind,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::JobCreated => "job-created",
            Self::FirstPodCreated => "first-pod-created",
            Self::LastPodCreated => "last-pod-created",
            Self::PodGroupCreated => "pod-group-created",
            Self::Scheduled => "scheduled",
            Self::PodReady => "pod-ready",
            Self::FirstEviction => "first-eviction",
            Self::FirstPvcBindRequest => "first-pvc-bind-request",
            Self::FirstPvcBind => "first-pvc-bind",
        }
    }

    /// Resource kind that has to be listed to observe this stage.
    pub fn source(self) -> ResourceKind {
        match self {
            Self::Created => ResourceKind::Workload,
            Self::JobCreated => ResourceKind::Job,
            Self::FirstPodCreated | Self::LastPodCreated | Self::Scheduled | Self::PodReady => {
                ResourceKind::Pod
            }
            Self::PodGroupCreated => ResourceKind::PodGroup,
            Self::FirstEviction | Self::FirstPvcBindRequest | Self::FirstPvcBind => {
                ResourceKind::Event
            }
        }
    }

    /// Stages read from cluster events, which may never fire for a workload.
    pub fn is_event(self) -> bool {
        self.source() == ResourceKind::Event
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s.trim())
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|st| st.as_str()).collect();
                format!("unknown stage '{s}' (known: {})", known.join(", "))
            })
    }
}

/// Ordered, duplicate-free list of stages measured for one workload kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Stage>", into = "Vec<Stage>")]
pub struct StageSet(Vec<Stage>);

impl StageSet {
    pub fn new(stages: Vec<Stage>) -> Result<Self, String> {
        if stages.is_empty() {
            return Err("stage list must not be empty".into());
        }
        let mut seen = BTreeSet::new();
        for stage in &stages {
            if !seen.insert(*stage) {
                return Err(format!("stage '{stage}' listed more than once"));
            }
        }
        Ok(Self(stages))
    }

    /// Parse a comma-separated list such as `created,scheduled`.
    pub fn parse_list(list: &str) -> Result<Self, String> {
        let stages = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Stage::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(stages)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = Stage> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.0.contains(&stage)
    }

    /// Stages of this set not yet present in `timeline` (all of them when absent).
    pub fn missing<'a>(
        &'a self,
        timeline: Option<&'a EventTimeline>,
    ) -> impl Iterator<Item = Stage> + 'a {
        self.iter()
            .filter(move |stage| !timeline.is_some_and(|t| t.stages.contains_key(stage)))
    }

    pub fn is_resolved(&self, timeline: Option<&EventTimeline>) -> bool {
        self.missing(timeline).next().is_none()
    }
}

impl TryFrom<Vec<Stage>> for StageSet {
    type Error = String;

    fn try_from(stages: Vec<Stage>) -> Result<Self, Self::Error> {
        Self::new(stages)
    }
}

impl From<StageSet> for Vec<Stage> {
    fn from(set: StageSet) -> Self {
        set.0
    }
}

impl fmt::Display for StageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|s| s.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

/// Parameters of one creation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadRequest {
    pub id: String,
    pub kind: WorkloadKind,
    pub project: String,
    pub namespace: String,
    pub workers: u32,
    pub gpus: u32,
    pub pvc: bool,
}

impl WorkloadRequest {
    pub fn replicas(&self) -> u32 {
        self.kind.replicas(self.workers)
    }
}

/// One submission attempt, as appended to the submission log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRecord {
    pub id: String,
    pub kind: WorkloadKind,
    pub project: String,
    pub namespace: String,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    /// Taken right before the creation call was issued.
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_error: Option<String>,
}

fn default_replicas() -> u32 {
    1
}

impl WorkloadRecord {
    pub fn is_submitted(&self) -> bool {
        self.submission_error.is_none()
    }
}

/// Observed stage timestamps of one workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTimeline {
    pub kind: WorkloadKind,
    #[serde(default)]
    pub stages: BTreeMap<Stage, DateTime<Utc>>,
}

impl EventTimeline {
    pub fn new(kind: WorkloadKind) -> Self {
        Self {
            kind,
            stages: BTreeMap::new(),
        }
    }

    /// Record a stage unless it is already known. Returns whether anything changed.
    pub fn record(&mut self, stage: Stage, at: DateTime<Utc>) -> bool {
        match self.stages.entry(stage) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(at);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, stage: Stage) -> Option<DateTime<Utc>> {
        self.stages.get(&stage).copied()
    }
}
