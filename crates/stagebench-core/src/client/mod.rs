//! Resource client: the pipeline's only view of the orchestration control plane.
//!
//! The core creates workloads and lists resources through [`ResourceClient`]
//! and never learns how the calls are carried out. [`KubectlClient`] drives a
//! `kubectl` subprocess; [`FakeClient`] serves canned states for tests.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{ResourceKind, WorkloadKind, WorkloadRequest};

mod decode;
pub mod fake;
pub mod kubectl;

pub use decode::decode_list;
pub use fake::FakeClient;
pub use kubectl::KubectlClient;

/// Labels that tie pods and pod groups back to their workload.
const WORKLOAD_LABELS: [&str; 3] = ["release", "training.kubeflow.org/job-name", "workloadName"];

/// Transport failures.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("`{command}` timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    #[error("invalid manifest for {id}: {message}")]
    Manifest { id: String, message: String },

    #[error("resource client unavailable: {0}")]
    Unavailable(String),
}

/// Status condition of a resource (`status.conditions[]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub type_: String,
    pub status: String,
    pub reason: Option<String>,
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    pub fn new(type_: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            status: status.into(),
            reason: None,
            last_transition_time: None,
        }
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.last_transition_time = Some(at);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn is_true(&self) -> bool {
        self.status.eq_ignore_ascii_case("true")
    }
}

/// Snapshot of one listed resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceState {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    /// Short workload name carried in the workload spec, when it differs from `name`.
    pub workload_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub conditions: Vec<Condition>,
    /// Event reason (`Evict`, `ProvisioningSucceeded`, ...).
    pub reason: Option<String>,
    pub message: Option<String>,
    pub involved_object: Option<String>,
    pub first_timestamp: Option<DateTime<Utc>>,
}

impl ResourceState {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: String::new(),
            labels: BTreeMap::new(),
            workload_name: None,
            created_at: None,
            conditions: Vec::new(),
            reason: None,
            message: None,
            involved_object: None,
            first_timestamp: None,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn created(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Build a cluster event.
    pub fn event(
        name: impl Into<String>,
        reason: impl Into<String>,
        involved_object: impl Into<String>,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        let mut state = Self::new(ResourceKind::Event, name);
        state.reason = Some(reason.into());
        state.involved_object = Some(involved_object.into());
        state.message = Some(message.into());
        state.first_timestamp = Some(at);
        state
    }

    /// Workload id this resource belongs to, when derivable from the resource alone.
    ///
    /// Events carry no owner reference and are attributed by the sampler.
    pub fn workload_key(&self) -> Option<&str> {
        match self.kind {
            ResourceKind::Workload => Some(self.workload_name.as_deref().unwrap_or(&self.name)),
            ResourceKind::Job => Some(&self.name),
            ResourceKind::Pod | ResourceKind::PodGroup => WORKLOAD_LABELS
                .iter()
                .find_map(|key| self.labels.get(*key))
                .map(String::as_str),
            ResourceKind::Event => None,
        }
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Time an event was first seen, falling back to its creation time.
    pub fn event_time(&self) -> Option<DateTime<Utc>> {
        self.first_timestamp.or(self.created_at)
    }
}

/// Capability to create workloads and list resources in a namespace.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Issue one creation call; returns the id the control plane knows the workload by.
    async fn create(&self, request: &WorkloadRequest) -> Result<String, ClientError>;

    /// List every resource of `resource` kind in `namespace`.
    ///
    /// `workload` selects kind-specific resource types (workload CRD, job type).
    async fn list(
        &self,
        namespace: &str,
        workload: WorkloadKind,
        resource: ResourceKind,
    ) -> Result<Vec<ResourceState>, ClientError>;

    fn transport_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workload_key_uses_spec_name_for_workloads() {
        let mut wl = ResourceState::new(ResourceKind::Workload, "j-1a2b3c-20260101");
        assert_eq!(wl.workload_key(), Some("j-1a2b3c-20260101"));
        wl.workload_name = Some("j-1a2b3c".into());
        assert_eq!(wl.workload_key(), Some("j-1a2b3c"));
    }

    #[test]
    fn workload_key_reads_pod_labels() {
        let training = ResourceState::new(ResourceKind::Pod, "j-1a2b3c-0-0").with_label("release", "j-1a2b3c");
        assert_eq!(training.workload_key(), Some("j-1a2b3c"));

        let worker = ResourceState::new(ResourceKind::Pod, "j-1a2b3c-worker-0")
            .with_label("training.kubeflow.org/job-name", "j-1a2b3c");
        assert_eq!(worker.workload_key(), Some("j-1a2b3c"));

        let orphan = ResourceState::new(ResourceKind::Pod, "other");
        assert_eq!(orphan.workload_key(), None);
    }
}
