use std::fmt::Write as _;

use stagebench_core::config::BenchConfig;
use stagebench_core::journal::{write_analysis, SampleStore};
use stagebench_core::{aggregate, AggregateOptions, AnalysisDataset, BenchError, SubmissionLog};

use crate::cli::args::{AnalyzeArgs, OutputFormat};
use crate::exit_codes::EXIT_SUCCESS;

pub fn run(args: AnalyzeArgs, config: &BenchConfig) -> anyhow::Result<i32> {
    super::require_output_dir(&args.output_dir)?;
    let stages = args
        .stages
        .unwrap_or_else(|| config.stages.for_kind(args.workload_type));

    let submissions = SubmissionLog::in_dir(&args.output_dir)
        .read()
        .map_err(BenchError::from)?;
    let samples = SampleStore::in_dir(&args.output_dir)
        .load()
        .map_err(BenchError::from)?;

    let options = AggregateOptions {
        kind: Some(args.workload_type),
        head: args.head,
        tail: args.tail,
        skip_errors: !args.include_errors,
        skip_partial: args.skip_partial,
        skip_anomalies: !args.include_anomalies,
    };
    let dataset = aggregate(&submissions, &samples, &stages, &options);
    let path = write_analysis(&args.output_dir, &dataset).map_err(BenchError::from)?;
    tracing::info!(path = %path.display(), rows = dataset.rows.len(), "wrote analysis");

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&dataset)?),
        OutputFormat::Text => print!("{}", render_text(&dataset)),
    }
    Ok(EXIT_SUCCESS)
}

fn render_text(dataset: &AnalysisDataset) -> String {
    let mut out = String::new();
    let _ = write!(out, "{:<10} {:<20} {:<9}", "id", "submitted", "status");
    for stage in &dataset.stages {
        let _ = write!(out, " {:>width$}", stage.as_str(), width = stage.as_str().len().max(6));
    }
    out.push('\n');

    for row in &dataset.rows {
        let _ = write!(
            out,
            "{:<10} {:<20} {:<9}",
            row.id,
            row.submitted_at.format("%Y-%m-%dT%H:%M:%S"),
            row.status.as_str()
        );
        for stage in &dataset.stages {
            let width = stage.as_str().len().max(6);
            match row.delta(*stage) {
                Some(secs) => {
                    let _ = write!(out, " {secs:>width$}");
                }
                None => {
                    let _ = write!(out, " {:>width$}", "-");
                }
            }
        }
        out.push('\n');
    }

    let s = &dataset.summary;
    let _ = writeln!(
        out,
        "\n{} workloads: {} complete, {} partial, {} error, {} anomalous ({} excluded, {} shown)",
        s.total,
        s.complete,
        s.partial,
        s.error,
        s.anomalous,
        s.excluded,
        dataset.rows.len()
    );
    for avg in &dataset.averages {
        let _ = writeln!(
            out,
            "  {:<24} average {:>8.2}s over {} workloads",
            avg.stage.as_str(),
            avg.mean_seconds,
            avg.samples
        );
    }
    if let Some(avg) = &dataset.scheduling_average {
        let _ = writeln!(
            out,
            "  {:<24} average {:>8.2}s over {} workloads",
            "submit-to-scheduled", avg.mean_seconds, avg.samples
        );
    }
    out
}
