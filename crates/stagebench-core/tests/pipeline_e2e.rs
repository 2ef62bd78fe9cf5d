use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use stagebench_core::client::Condition;
use stagebench_core::submit::DEFAULT_CALL_TIMEOUT;
use stagebench_core::{
    aggregate, AggregateOptions, FakeClient, ResourceKind, ResourceState, RowStatus, Sampler,
    Scheduler, Stage, StageSet, SubmissionLog, SubmitPlan, WorkloadKind, WorkloadRecord,
};

const NS: &str = "runai-project-0";

fn plan(count: usize) -> SubmitPlan {
    SubmitPlan {
        count,
        concurrency: 1,
        delay: Duration::ZERO,
        kind: WorkloadKind::Training,
        project: "project-0".into(),
        namespace: NS.into(),
        workers: 1,
        gpus: 1,
        pvc: false,
        call_timeout: DEFAULT_CALL_TIMEOUT,
    }
}

fn after(record: &WorkloadRecord, secs: i64) -> DateTime<Utc> {
    record.submitted_at + chrono::Duration::seconds(secs)
}

fn workload_cr(record: &WorkloadRecord, created: DateTime<Utc>) -> ResourceState {
    let mut state = ResourceState::new(ResourceKind::Workload, format!("{}-cr", record.id))
        .in_namespace(NS)
        .created(created);
    state.workload_name = Some(record.id.clone());
    state
}

fn scheduled_pod(record: &WorkloadRecord, created: DateTime<Utc>, scheduled: DateTime<Utc>) -> ResourceState {
    ResourceState::new(ResourceKind::Pod, format!("{}-0-0", record.id))
        .in_namespace(NS)
        .with_label("release", record.id.clone())
        .created(created)
        .with_condition(Condition::new("PodScheduled", "True").at(scheduled))
}

#[tokio::test]
async fn three_workloads_two_passes_two_complete_one_partial() {
    let dir = tempfile::TempDir::new().unwrap();
    let client = Arc::new(FakeClient::new());
    let log = SubmissionLog::in_dir(dir.path());

    let summary = Scheduler::new(client.clone(), log.clone())
        .run(&plan(3))
        .await
        .unwrap();
    assert_eq!(summary.submitted, 3);
    let records = log.read().unwrap();
    assert_eq!(records.len(), 3);

    let stages = StageSet::new(vec![Stage::Created, Stage::Scheduled]).unwrap();
    let sampler = Sampler::new(client.clone(), dir.path());

    // Pass 1: only the workload resources exist.
    for record in &records {
        client.push_resource(workload_cr(record, after(record, 2)));
    }
    let first = sampler
        .run(WorkloadKind::Training, NS, &stages)
        .await
        .unwrap();
    assert_eq!(first.tracked, 3);
    assert_eq!(first.stages_added, 3);
    assert_eq!(first.resolved_after, 0);

    // Pass 2: two of them got scheduled.
    for record in &records[..2] {
        client.push_resource(scheduled_pod(record, after(record, 3), after(record, 5)));
    }
    let second = sampler
        .run(WorkloadKind::Training, NS, &stages)
        .await
        .unwrap();
    assert_eq!(second.stages_added, 2);
    assert_eq!(second.resolved_after, 2);

    let samples = sampler.store().load().unwrap();
    let data = aggregate(&records, &samples, &stages, &AggregateOptions::default());
    assert_eq!(data.summary.complete, 2);
    assert_eq!(data.summary.partial, 1);
    assert_eq!(data.summary.error, 0);

    for row in &data.rows {
        let created = row.delta(Stage::Created).expect("created observed for every workload");
        assert!((2..=3).contains(&created), "created delta {created}");
        if row.id == records[2].id {
            assert_eq!(row.status, RowStatus::Partial);
            assert_eq!(row.deltas.len(), 1);
        } else {
            assert_eq!(row.status, RowStatus::Complete);
            assert!(row.delta(Stage::Scheduled).unwrap() >= 0);
        }
    }
}

#[tokio::test]
async fn failed_submission_shows_up_as_error_row() {
    let dir = tempfile::TempDir::new().unwrap();
    let client = Arc::new(FakeClient::new().fail_create_call(2));
    let log = SubmissionLog::in_dir(dir.path());
    Scheduler::new(client.clone(), log.clone())
        .run(&plan(3))
        .await
        .unwrap();

    let stages = StageSet::new(vec![Stage::Created]).unwrap();
    let sampler = Sampler::new(client.clone(), dir.path());
    let report = sampler
        .run(WorkloadKind::Training, NS, &stages)
        .await
        .unwrap();
    assert_eq!(report.skipped_errors, 1);
    assert_eq!(report.tracked, 2);

    let options = AggregateOptions {
        skip_errors: false,
        ..AggregateOptions::default()
    };
    let data = aggregate(
        &log.read().unwrap(),
        &sampler.store().load().unwrap(),
        &stages,
        &options,
    );
    assert_eq!(data.summary.error, 1);
    let error_row = data
        .rows
        .iter()
        .find(|r| r.status == RowStatus::Error)
        .unwrap();
    assert!(error_row.error.is_some());
    assert!(error_row.deltas.is_empty());
}
