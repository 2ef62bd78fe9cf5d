use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use stagebench_core::config::{DEFAULT_CONFIG_FILE, DEFAULT_OUTPUT_DIR};
use stagebench_core::{StageSet, WorkloadKind};

#[derive(Parser)]
#[command(
    name = "stagebench",
    version,
    about = "Load-test a workload scheduler: submit jobs at scale and measure lifecycle latencies"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalArgs {
    /// Configuration file (optional unless given explicitly)
    #[arg(long, global = true, env = "STAGEBENCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// kubectl binary used to reach the cluster
    #[arg(long, global = true, env = "STAGEBENCH_KUBECTL")]
    pub kubectl: Option<String>,

    /// kubeconfig context to use
    #[arg(long, global = true, env = "STAGEBENCH_CONTEXT")]
    pub context: Option<String>,
}

impl GlobalArgs {
    /// Config path plus whether it was asked for explicitly.
    pub fn config_path(&self) -> (PathBuf, bool) {
        match &self.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Submit N workloads in batches and record every attempt
    Submit(SubmitArgs),
    /// Poll the cluster and merge observed lifecycle stages into the sample log
    Sample(SampleArgs),
    /// Compute per-stage deltas from the submission and sample logs
    Analyze(AnalyzeArgs),
}

#[derive(clap::Args, Clone, Debug)]
pub struct SubmitArgs {
    #[arg(long, short = 'o', default_value = DEFAULT_OUTPUT_DIR, env = "STAGEBENCH_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    #[arg(long, short = 't', default_value = "training")]
    pub workload_type: WorkloadKind,

    /// Number of workloads to submit
    #[arg(long, short = 'n')]
    pub num_workloads: usize,

    /// Creation calls issued concurrently per batch
    #[arg(long, short = 'p', default_value_t = 8)]
    pub concurrency: usize,

    /// Workers per distributed workload
    #[arg(long, default_value_t = 1)]
    pub num_workers: u32,

    /// GPUs per pod
    #[arg(long, short = 'g', default_value_t = 1)]
    pub num_gpus: u32,

    /// Seconds to wait between batches
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub delay: f64,

    /// Project to submit to (defaults to the config file's project)
    #[arg(long, env = "STAGEBENCH_PROJECT")]
    pub project: Option<String>,

    /// Attach an ephemeral PVC to every workload
    #[arg(long)]
    pub pvc: bool,

    /// Per-call timeout in seconds (defaults to the config file's value)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Directory with template overrides (<kind>.yaml, pvc.yaml)
    #[arg(long)]
    pub template_dir: Option<PathBuf>,
}

#[derive(clap::Args, Clone, Debug)]
pub struct SampleArgs {
    #[arg(long, short = 'o', default_value = DEFAULT_OUTPUT_DIR, env = "STAGEBENCH_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    #[arg(long, short = 't', default_value = "training")]
    pub workload_type: WorkloadKind,

    #[arg(long, short = 'p', env = "STAGEBENCH_PROJECT")]
    pub project: Option<String>,

    /// Stages to resolve, comma separated (overrides the configured list)
    #[arg(long, value_parser = StageSet::parse_list)]
    pub stages: Option<StageSet>,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(clap::Args, Clone, Debug)]
pub struct AnalyzeArgs {
    #[arg(long, short = 'o', default_value = DEFAULT_OUTPUT_DIR, env = "STAGEBENCH_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    #[arg(long, short = 't', default_value = "training")]
    pub workload_type: WorkloadKind,

    /// Keep only the first K workloads
    #[arg(long)]
    pub head: Option<usize>,

    /// Keep only the last K workloads
    #[arg(long)]
    pub tail: Option<usize>,

    /// Keep workloads whose submission failed
    #[arg(long)]
    pub include_errors: bool,

    /// Drop workloads with unobserved stages
    #[arg(long)]
    pub skip_partial: bool,

    /// Keep workloads whose timestamps are inconsistent (replaced pod, clock skew)
    #[arg(long)]
    pub include_anomalies: bool,

    #[arg(long, value_parser = StageSet::parse_list)]
    pub stages: Option<StageSet>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_submit_with_globals_after_subcommand() {
        let cli = Cli::try_parse_from([
            "stagebench",
            "submit",
            "-n",
            "5",
            "-t",
            "distributed",
            "--delay",
            "0.5",
            "--kubectl",
            "/usr/local/bin/kubectl",
        ])
        .unwrap();
        assert_eq!(cli.global.kubectl.as_deref(), Some("/usr/local/bin/kubectl"));
        let Command::Submit(args) = cli.cmd else {
            panic!("expected submit");
        };
        assert_eq!(args.num_workloads, 5);
        assert_eq!(args.workload_type, WorkloadKind::Distributed);
        assert_eq!(args.concurrency, 8);
        assert_eq!(args.output_dir, PathBuf::from("logs"));
    }

    #[test]
    fn rejects_unknown_stage_names() {
        let err = Cli::try_parse_from(["stagebench", "sample", "--stages", "created,bogus"])
            .err()
            .unwrap();
        assert!(err.to_string().contains("bogus"));
    }
}
