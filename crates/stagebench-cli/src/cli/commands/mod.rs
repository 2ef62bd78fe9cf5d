use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stagebench_core::config::{load_config_or_default, BenchConfig};
use stagebench_core::templates::WorkloadTemplates;
use stagebench_core::{BenchError, BenchResult, KubectlClient, ResourceClient};

use super::args::{Cli, Command, GlobalArgs};

pub mod analyze;
pub mod sample;
pub mod submit;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = load_config(&cli.global)?;
    match cli.cmd {
        Command::Submit(args) => submit::run(args, &config).await,
        Command::Sample(args) => sample::run(args, &config).await,
        Command::Analyze(args) => analyze::run(args, &config),
    }
}

/// Config file merged with the global flags that override it.
fn load_config(global: &GlobalArgs) -> BenchResult<BenchConfig> {
    let (path, explicit) = global.config_path();
    let mut config = load_config_or_default(&path, explicit)?;
    if let Some(kubectl) = &global.kubectl {
        config.kubectl = kubectl.clone();
    }
    if global.context.is_some() {
        config.context = global.context.clone();
    }
    Ok(config)
}

fn kubectl_client(
    config: &BenchConfig,
    templates: WorkloadTemplates,
    timeout: Duration,
) -> Arc<dyn ResourceClient> {
    Arc::new(
        KubectlClient::new(config.kubectl.clone())
            .with_context(config.context.clone())
            .with_resources(config.resources.clone())
            .with_templates(templates)
            .with_timeout(timeout),
    )
}

fn require_output_dir(dir: &Path) -> BenchResult<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(BenchError::invalid(format!(
            "output directory {} does not exist",
            dir.display()
        )))
    }
}
