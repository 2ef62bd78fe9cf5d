use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ClientError, ResourceClient, ResourceState};
use crate::journal::SubmissionLog;
use crate::model::{ResourceKind, WorkloadKind, WorkloadRequest};

/// In-memory client serving canned resource states.
///
/// Counts calls so tests can assert on polling behaviour, and can be told to
/// fail specific creation calls or resource kinds.
#[derive(Debug, Default)]
pub struct FakeClient {
    state: Mutex<FakeState>,
    create_calls: AtomicUsize,
    list_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[derive(Debug, Default)]
struct FakeState {
    resources: BTreeMap<ResourceKind, Vec<ResourceState>>,
    failing_creates: BTreeSet<usize>,
    failing_lists: BTreeSet<ResourceKind>,
    created: Vec<WorkloadRequest>,
    create_latency: Option<Duration>,
    watched_log: Option<SubmissionLog>,
    log_sizes: Vec<usize>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`-th creation call (1-based, in call order) fail.
    pub fn fail_create_call(self, n: usize) -> Self {
        self.lock().failing_creates.insert(n);
        self
    }

    /// Hold every creation call for `latency` before answering.
    pub fn with_create_latency(self, latency: Duration) -> Self {
        self.lock().create_latency = Some(latency);
        self
    }

    /// Count the records in `log` at the start of every creation call.
    pub fn watch_log(self, log: SubmissionLog) -> Self {
        self.lock().watched_log = Some(log);
        self
    }

    /// Record counts seen by `watch_log`, in call order.
    pub fn log_sizes(&self) -> Vec<usize> {
        self.lock().log_sizes.clone()
    }

    pub fn fail_list(&self, kind: ResourceKind) {
        self.lock().failing_lists.insert(kind);
    }

    pub fn heal_list(&self, kind: ResourceKind) {
        self.lock().failing_lists.remove(&kind);
    }

    pub fn push_resource(&self, state: ResourceState) {
        self.lock()
            .resources
            .entry(state.kind)
            .or_default()
            .push(state);
    }

    pub fn set_resources(&self, kind: ResourceKind, states: Vec<ResourceState>) {
        self.lock().resources.insert(kind, states);
    }

    /// Requests of successful creation calls, in completion order.
    pub fn created(&self) -> Vec<WorkloadRequest> {
        self.lock().created.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Highest number of creation calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.create_calls.store(0, Ordering::SeqCst);
        self.list_calls.store(0, Ordering::SeqCst);
        self.max_in_flight.store(0, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        // A panicking test thread must not hide the canned state from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ResourceClient for FakeClient {
    async fn create(&self, request: &WorkloadRequest) -> Result<String, ClientError> {
        let call = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let (latency, fail) = {
            let mut state = self.lock();
            if let Some(log) = state.watched_log.clone() {
                let size = log.read().map_or(0, |records| records.len());
                state.log_sizes.push(size);
            }
            (state.create_latency, state.failing_creates.contains(&call))
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if fail {
            return Err(ClientError::CommandFailed {
                command: format!("create {}", request.id),
                status: "exit status: 1".into(),
                stderr: "admission webhook denied the request".into(),
            });
        }

        self.lock().created.push(request.clone());
        Ok(request.id.clone())
    }

    async fn list(
        &self,
        namespace: &str,
        _workload: WorkloadKind,
        resource: ResourceKind,
    ) -> Result<Vec<ResourceState>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        if state.failing_lists.contains(&resource) {
            return Err(ClientError::Unavailable(format!(
                "cannot list {resource} in {namespace}"
            )));
        }
        Ok(state
            .resources
            .get(&resource)
            .map(|states| {
                states
                    .iter()
                    .filter(|s| s.namespace.is_empty() || s.namespace == namespace)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn transport_name(&self) -> &'static str {
        "fake"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str) -> WorkloadRequest {
        WorkloadRequest {
            id: id.into(),
            kind: WorkloadKind::Training,
            project: "project-0".into(),
            namespace: "runai-project-0".into(),
            workers: 1,
            gpus: 1,
            pvc: false,
        }
    }

    #[tokio::test]
    async fn fails_only_the_configured_call() {
        let client = FakeClient::new().fail_create_call(2);
        assert!(client.create(&request("j-000001")).await.is_ok());
        assert!(client.create(&request("j-000002")).await.is_err());
        assert!(client.create(&request("j-000003")).await.is_ok());
        assert_eq!(client.create_calls(), 3);
        assert_eq!(client.created().len(), 2);
    }

    #[tokio::test]
    async fn list_filters_by_namespace_and_kind() {
        let client = FakeClient::new();
        client.push_resource(ResourceState::new(ResourceKind::Pod, "a").in_namespace("runai-p1"));
        client.push_resource(ResourceState::new(ResourceKind::Pod, "b").in_namespace("runai-p2"));
        client.push_resource(ResourceState::new(ResourceKind::Job, "c").in_namespace("runai-p1"));

        let pods = client
            .list("runai-p1", WorkloadKind::Training, ResourceKind::Pod)
            .await
            .unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].name, "a");

        client.fail_list(ResourceKind::Pod);
        assert!(client
            .list("runai-p1", WorkloadKind::Training, ResourceKind::Pod)
            .await
            .is_err());
        assert_eq!(client.list_calls(), 2);
    }
}
