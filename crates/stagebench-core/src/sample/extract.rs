//! Joins listed resources to workload ids and reads stage timestamps off them.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use crate::client::ResourceState;
use crate::model::{ResourceKind, Stage};
use crate::submit::WORKLOAD_ID_PATTERN;

const EVICT: &str = "Evict";
const PVC_BIND_REQUEST: &str = "ExternalProvisioning";
const PVC_BIND: &str = "ProvisioningSucceeded";

struct EventPatterns {
    /// A generated workload id inside a longer resource name.
    workload_id: Regex,
    /// `<namespace>/<name>` object reference; captures the name.
    object_ref: Regex,
}

fn patterns() -> &'static EventPatterns {
    static PATTERNS: OnceLock<EventPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| EventPatterns {
        workload_id: Regex::new(&format!(r"\b{WORKLOAD_ID_PATTERN}\b"))
            .expect("workload id pattern compiles"),
        object_ref: Regex::new(r"\b[a-z0-9][a-z0-9.-]*/([a-z0-9](?:[a-z0-9.-]*[a-z0-9])?)")
            .expect("object reference pattern compiles"),
    })
}

/// Listed resources grouped by the workload they belong to.
#[derive(Debug, Default)]
pub(crate) struct ResourceIndex {
    owned: HashMap<(ResourceKind, String), Vec<ResourceState>>,
}

impl ResourceIndex {
    /// Index `listed` for the workload ids in `ids`; everything else is dropped.
    pub(crate) fn build(listed: Vec<ResourceState>, ids: &HashSet<String>) -> Self {
        let mut index = Self::default();
        let mut pod_groups: HashMap<String, String> = HashMap::new();
        let mut events = Vec::new();

        for state in listed {
            if state.kind == ResourceKind::Event {
                events.push(state);
                continue;
            }
            let Some(key) = state.workload_key().map(str::to_string) else {
                debug!(kind = %state.kind, name = %state.name, "resource without workload reference");
                continue;
            };
            if !ids.contains(&key) {
                continue;
            }
            if state.kind == ResourceKind::PodGroup {
                pod_groups.insert(state.name.clone(), key.clone());
            }
            index.owned.entry((state.kind, key)).or_default().push(state);
        }

        for event in events {
            let owners = attribute(&event, ids, &pod_groups);
            if owners.is_empty() {
                debug!(name = %event.name, "event not attributable to a tracked workload");
                continue;
            }
            for owner in owners {
                index
                    .owned
                    .entry((ResourceKind::Event, owner))
                    .or_default()
                    .push(event.clone());
            }
        }
        index
    }

    fn of(&self, kind: ResourceKind, id: &str) -> &[ResourceState] {
        self.owned
            .get(&(kind, id.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Timestamp of `stage` for workload `id`, if the listed state shows it.
    pub(crate) fn observe(&self, stage: Stage, id: &str, replicas: u32) -> Option<DateTime<Utc>> {
        match stage {
            Stage::Created => earliest_created(self.of(ResourceKind::Workload, id)),
            Stage::JobCreated => earliest_created(self.of(ResourceKind::Job, id)),
            Stage::PodGroupCreated => earliest_created(self.of(ResourceKind::PodGroup, id)),
            Stage::FirstPodCreated => earliest_created(self.of(ResourceKind::Pod, id)),
            Stage::LastPodCreated => {
                let created: Vec<_> = self
                    .of(ResourceKind::Pod, id)
                    .iter()
                    .filter_map(|p| p.created_at)
                    .collect();
                // A later pod would move the maximum, so wait for all of them.
                if created.len() < replicas.max(1) as usize {
                    return None;
                }
                created.into_iter().max()
            }
            Stage::Scheduled => first_pod(self.of(ResourceKind::Pod, id))
                .and_then(|pod| pod.condition("PodScheduled"))
                .filter(|c| c.is_true() || c.reason.is_some())
                .and_then(|c| c.last_transition_time),
            Stage::PodReady => first_pod(self.of(ResourceKind::Pod, id))
                .and_then(|pod| pod.condition("Ready"))
                .filter(|c| c.is_true())
                .and_then(|c| c.last_transition_time),
            Stage::FirstEviction => earliest_event(self.of(ResourceKind::Event, id), EVICT),
            Stage::FirstPvcBindRequest => {
                earliest_event(self.of(ResourceKind::Event, id), PVC_BIND_REQUEST)
            }
            Stage::FirstPvcBind => earliest_event(self.of(ResourceKind::Event, id), PVC_BIND),
        }
    }
}

fn earliest_created(states: &[ResourceState]) -> Option<DateTime<Utc>> {
    states.iter().filter_map(|s| s.created_at).min()
}

/// Earliest-created pod; ties broken by name.
fn first_pod(pods: &[ResourceState]) -> Option<&ResourceState> {
    pods.iter()
        .filter(|p| p.created_at.is_some())
        .min_by(|a, b| (a.created_at, &a.name).cmp(&(b.created_at, &b.name)))
}

fn earliest_event(events: &[ResourceState], reason: &str) -> Option<DateTime<Utc>> {
    events
        .iter()
        .filter(|e| e.reason.as_deref() == Some(reason))
        .filter_map(ResourceState::event_time)
        .min()
}

/// Workload ids an event is credited to.
///
/// Evictions belong to the evicting workload, named by the pod group reference
/// after the message's last " by "; the evicted pod is not credited. Volume
/// provisioning events belong to the workload named by their involved object.
fn attribute(
    event: &ResourceState,
    ids: &HashSet<String>,
    pod_groups: &HashMap<String, String>,
) -> BTreeSet<String> {
    let mut owners = BTreeSet::new();
    match event.reason.as_deref() {
        Some(EVICT) => {
            let message = event.message.as_deref().unwrap_or_default();
            let Some((_, evictor)) = message.rsplit_once(" by ") else {
                return owners;
            };
            for reference in patterns().object_ref.captures_iter(evictor) {
                claim(&reference[1], ids, pod_groups, &mut owners);
            }
        }
        Some(PVC_BIND_REQUEST | PVC_BIND) => {
            if let Some(object) = event.involved_object.as_deref() {
                claim(object, ids, pod_groups, &mut owners);
            }
        }
        _ => {}
    }
    owners
}

/// Credit `name` to the workload owning it: a listed pod group by name, else
/// every tracked workload id embedded in it.
fn claim(
    name: &str,
    ids: &HashSet<String>,
    pod_groups: &HashMap<String, String>,
    owners: &mut BTreeSet<String>,
) {
    if let Some(owner) = pod_groups.get(name) {
        owners.insert(owner.clone());
        return;
    }
    for found in patterns().workload_id.find_iter(name) {
        if ids.contains(found.as_str()) {
            owners.insert(found.as_str().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Condition;
    use chrono::TimeZone;

    fn at(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, sec).unwrap()
    }

    fn ids(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn pod(name: &str, owner: &str, created: u32) -> ResourceState {
        ResourceState::new(ResourceKind::Pod, name)
            .with_label("release", owner)
            .created(at(created))
    }

    #[test]
    fn untracked_and_unlabelled_resources_are_dropped() {
        let index = ResourceIndex::build(
            vec![
                pod("j-aaaaaa-0-0", "j-aaaaaa", 3),
                pod("j-bbbbbb-0-0", "j-bbbbbb", 4),
                ResourceState::new(ResourceKind::Pod, "stray").created(at(1)),
            ],
            &ids(&["j-aaaaaa"]),
        );
        assert_eq!(index.observe(Stage::FirstPodCreated, "j-aaaaaa", 1), Some(at(3)));
        assert_eq!(index.observe(Stage::FirstPodCreated, "j-bbbbbb", 1), None);
    }

    #[test]
    fn last_pod_waits_for_every_replica() {
        let tracked = ids(&["j-dddddd"]);
        let partial = ResourceIndex::build(
            vec![pod("j-dddddd-master-0", "j-dddddd", 2), pod("j-dddddd-worker-0", "j-dddddd", 5)],
            &tracked,
        );
        assert_eq!(partial.observe(Stage::LastPodCreated, "j-dddddd", 3), None);
        assert_eq!(partial.observe(Stage::FirstPodCreated, "j-dddddd", 3), Some(at(2)));

        let full = ResourceIndex::build(
            vec![
                pod("j-dddddd-master-0", "j-dddddd", 2),
                pod("j-dddddd-worker-0", "j-dddddd", 5),
                pod("j-dddddd-worker-1", "j-dddddd", 4),
            ],
            &tracked,
        );
        assert_eq!(full.observe(Stage::LastPodCreated, "j-dddddd", 3), Some(at(5)));
    }

    #[test]
    fn scheduling_and_readiness_come_from_the_first_pod() {
        let first = pod("j-aaaaaa-0-0", "j-aaaaaa", 1)
            .with_condition(
                Condition::new("PodScheduled", "False")
                    .with_reason("Unschedulable")
                    .at(at(6)),
            )
            .with_condition(Condition::new("Ready", "False").at(at(7)));
        let later = pod("j-aaaaaa-0-1", "j-aaaaaa", 2)
            .with_condition(Condition::new("PodScheduled", "True").at(at(3)))
            .with_condition(Condition::new("Ready", "True").at(at(9)));
        let index = ResourceIndex::build(vec![later, first], &ids(&["j-aaaaaa"]));

        assert_eq!(index.observe(Stage::Scheduled, "j-aaaaaa", 1), Some(at(6)));
        assert_eq!(index.observe(Stage::PodReady, "j-aaaaaa", 1), None);
    }

    fn preemption(name: &str, victim: &str, evictor: &str, sec: u32) -> ResourceState {
        ResourceState::event(
            name,
            EVICT,
            victim,
            &format!(
                "Pod runai-project-0/{victim} preempted by higher priority job runai-project-0/{evictor}"
            ),
            at(sec),
        )
    }

    #[test]
    fn evictions_belong_to_the_evicting_pod_group_only() {
        let group = ResourceState::new(ResourceKind::PodGroup, "pg-renamed-7f2")
            .with_label("workloadName", "j-cccccc")
            .created(at(1));
        let index = ResourceIndex::build(
            vec![
                preemption("e1", "j-aaaaaa-0-0", "pg-renamed-7f2", 20),
                preemption("e2", "j-aaaaaa-0-0", "pg-renamed-7f2", 25),
                group,
            ],
            &ids(&["j-aaaaaa", "j-cccccc"]),
        );

        assert_eq!(index.observe(Stage::FirstEviction, "j-cccccc", 1), Some(at(20)));
        assert_eq!(index.observe(Stage::FirstEviction, "j-aaaaaa", 1), None);
        assert_eq!(index.observe(Stage::PodGroupCreated, "j-cccccc", 1), Some(at(1)));
    }

    #[test]
    fn evictor_found_by_id_when_pod_groups_were_not_listed() {
        let reclaim = ResourceState::event(
            "e3",
            EVICT,
            "j-aaaaaa-0-0",
            "Pod runai-project-0/j-aaaaaa-0-0 was reclaimed by job runai-project-0/pg-j-cccccc-0-9f1e.",
            at(30),
        );
        let unrelated = ResourceState::event("e4", EVICT, "j-cccccc-0-0", "evicted", at(5));
        let index = ResourceIndex::build(vec![reclaim, unrelated], &ids(&["j-aaaaaa", "j-cccccc"]));

        assert_eq!(index.observe(Stage::FirstEviction, "j-cccccc", 1), Some(at(30)));
        assert_eq!(index.observe(Stage::FirstEviction, "j-aaaaaa", 1), None);
    }

    #[test]
    fn long_resource_names_still_resolve() {
        let evictor = "pg-j-dddddd-0-a-b-c-d-e-f-g-h-i-j-k-l-m-n-o-p-q-r";
        let index = ResourceIndex::build(
            vec![preemption("e5", "j-aaaaaa-0-0", evictor, 11)],
            &ids(&["j-dddddd"]),
        );
        assert_eq!(index.observe(Stage::FirstEviction, "j-dddddd", 1), Some(at(11)));
    }

    #[test]
    fn pvc_events_match_by_involved_object() {
        let request = ResourceState::event(
            "e1",
            PVC_BIND_REQUEST,
            "j-aaaaaa-ephemeral",
            "waiting for a volume to be created",
            at(10),
        );
        let bound = ResourceState::event(
            "e2",
            PVC_BIND,
            "j-aaaaaa-ephemeral",
            "Successfully provisioned volume pvc-123",
            at(12),
        );
        let index = ResourceIndex::build(vec![bound, request], &ids(&["j-aaaaaa"]));
        assert_eq!(index.observe(Stage::FirstPvcBindRequest, "j-aaaaaa", 1), Some(at(10)));
        assert_eq!(index.observe(Stage::FirstPvcBind, "j-aaaaaa", 1), Some(at(12)));
        assert_eq!(index.observe(Stage::FirstEviction, "j-aaaaaa", 1), None);
    }
}
