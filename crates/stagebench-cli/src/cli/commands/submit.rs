use std::time::Duration;

use stagebench_core::config::BenchConfig;
use stagebench_core::journal::create_output_dir;
use stagebench_core::submit::parse_delay;
use stagebench_core::templates::WorkloadTemplates;
use stagebench_core::{BenchError, Scheduler, SubmissionLog, SubmitPlan};

use crate::cli::args::SubmitArgs;
use crate::exit_codes::EXIT_SUCCESS;

pub async fn run(args: SubmitArgs, config: &BenchConfig) -> anyhow::Result<i32> {
    let project = args.project.unwrap_or_else(|| config.project.clone());
    let call_timeout = Duration::from_secs(args.timeout.unwrap_or(config.submit_timeout_secs));
    let plan = SubmitPlan {
        count: args.num_workloads,
        concurrency: args.concurrency,
        delay: parse_delay(args.delay)?,
        kind: args.workload_type,
        namespace: config.namespace(&project),
        project,
        workers: args.num_workers,
        gpus: args.num_gpus,
        pvc: args.pvc,
        call_timeout,
    };
    plan.validate()?;

    let templates = match args.template_dir.as_ref().or(config.template_dir.as_ref()) {
        Some(dir) => WorkloadTemplates::from_dir(dir)?,
        None => WorkloadTemplates::builtin(),
    };

    create_output_dir(&args.output_dir).map_err(BenchError::from)?;

    // The scheduler enforces the per-call bound; the transport only needs a backstop.
    let client = super::kubectl_client(config, templates, call_timeout + Duration::from_secs(5));
    let log = SubmissionLog::in_dir(&args.output_dir);
    let summary = Scheduler::new(client, log.clone()).run(&plan).await?;

    println!(
        "submitted {} of {} {} workloads ({} failed) -> {}",
        summary.submitted,
        summary.total(),
        plan.kind,
        summary.failed,
        log.path().display()
    );
    Ok(EXIT_SUCCESS)
}
