use std::time::Duration;

use stagebench_core::config::BenchConfig;
use stagebench_core::templates::WorkloadTemplates;
use stagebench_core::Sampler;

use crate::cli::args::SampleArgs;
use crate::exit_codes::EXIT_SUCCESS;

pub async fn run(args: SampleArgs, config: &BenchConfig) -> anyhow::Result<i32> {
    super::require_output_dir(&args.output_dir)?;
    let project = args.project.unwrap_or_else(|| config.project.clone());
    let namespace = config.namespace(&project);
    let stages = args
        .stages
        .unwrap_or_else(|| config.stages.for_kind(args.workload_type));

    let client = super::kubectl_client(
        config,
        WorkloadTemplates::builtin(),
        Duration::from_secs(config.list_timeout_secs),
    );
    let report = Sampler::new(client, &args.output_dir)
        .run(args.workload_type, &namespace, &stages)
        .await?;

    println!(
        "{} {} workloads tracked: {} resolved ({} before this pass), {} stages added, {} failed submissions skipped",
        report.tracked,
        args.workload_type,
        report.resolved_after,
        report.resolved_before,
        report.stages_added,
        report.skipped_errors
    );
    if !report.failed_kinds.is_empty() {
        let kinds: Vec<&str> = report.failed_kinds.iter().map(|k| k.as_str()).collect();
        println!("could not list: {}", kinds.join(", "));
    }
    Ok(EXIT_SUCCESS)
}
