//! `stagebench.yaml` configuration.
//!
//! Every field has a default, so a missing file is equivalent to an empty
//! one. Command-line flags override file values in the CLI.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};
use crate::model::{ResourceKind, StageSet, WorkloadKind};

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;
pub const DEFAULT_CONFIG_FILE: &str = "stagebench.yaml";
pub const DEFAULT_PROJECT: &str = "project-0";
pub const DEFAULT_OUTPUT_DIR: &str = "logs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    pub version: u32,
    pub project: String,
    /// Namespace of a project is `<namespace_prefix><project>`.
    pub namespace_prefix: String,
    pub kubectl: String,
    pub context: Option<String>,
    pub submit_timeout_secs: u64,
    pub list_timeout_secs: u64,
    pub template_dir: Option<PathBuf>,
    pub stages: StageConfig,
    pub resources: ResourceNames,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            project: DEFAULT_PROJECT.to_string(),
            namespace_prefix: "runai-".to_string(),
            kubectl: "kubectl".to_string(),
            context: None,
            submit_timeout_secs: 60,
            list_timeout_secs: 120,
            template_dir: None,
            stages: StageConfig::default(),
            resources: ResourceNames::default(),
        }
    }
}

impl BenchConfig {
    pub fn namespace(&self, project: &str) -> String {
        format!("{}{}", self.namespace_prefix, project)
    }
}

/// Per-kind stage overrides; absent entries use [`WorkloadKind::default_stages`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageConfig {
    pub training: Option<StageSet>,
    pub distributed: Option<StageSet>,
    pub interactive: Option<StageSet>,
}

impl StageConfig {
    pub fn for_kind(&self, kind: WorkloadKind) -> StageSet {
        let configured = match kind {
            WorkloadKind::Training => &self.training,
            WorkloadKind::Distributed => &self.distributed,
            WorkloadKind::Interactive => &self.interactive,
        };
        configured.clone().unwrap_or_else(|| kind.default_stages())
    }
}

/// API resource names handed to the transport (`<plural>.<group>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceNames {
    /// Group of the `<kind>workloads` custom resources.
    pub workload_group: String,
    pub training_jobs: String,
    pub distributed_jobs: String,
    pub pods: String,
    pub pod_groups: String,
    pub events: String,
}

impl Default for ResourceNames {
    fn default() -> Self {
        Self {
            workload_group: "run.ai".to_string(),
            training_jobs: "runaijobs.run.ai".to_string(),
            distributed_jobs: "pytorchjobs.kubeflow.org".to_string(),
            pods: "pods".to_string(),
            pod_groups: "podgroups.scheduling.run.ai".to_string(),
            events: "events".to_string(),
        }
    }
}

impl ResourceNames {
    pub fn api_resource(&self, resource: ResourceKind, workload: WorkloadKind) -> String {
        match resource {
            ResourceKind::Workload => {
                format!("{}workloads.{}", workload.as_str(), self.workload_group)
            }
            ResourceKind::Job => match workload {
                WorkloadKind::Distributed => self.distributed_jobs.clone(),
                WorkloadKind::Training | WorkloadKind::Interactive => self.training_jobs.clone(),
            },
            ResourceKind::Pod => self.pods.clone(),
            ResourceKind::PodGroup => self.pod_groups.clone(),
            ResourceKind::Event => self.events.clone(),
        }
    }
}

pub fn load_config(path: &Path) -> BenchResult<BenchConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| BenchError::Config {
        path: path.to_path_buf(),
        message: format!("failed to read config: {e}"),
    })?;
    let cfg: BenchConfig = serde_yaml::from_str(&raw).map_err(|e| BenchError::Config {
        path: path.to_path_buf(),
        message: format!("failed to parse YAML: {e}"),
    })?;
    if cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(BenchError::Config {
            path: path.to_path_buf(),
            message: format!(
                "unsupported config version {} (supported: {})",
                cfg.version, SUPPORTED_CONFIG_VERSION
            ),
        });
    }
    Ok(cfg)
}

/// Load `path`, or defaults when it does not exist and was not asked for explicitly.
pub fn load_config_or_default(path: &Path, explicit: bool) -> BenchResult<BenchConfig> {
    if !explicit && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(BenchConfig::default());
    }
    load_config(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Stage;

    #[test]
    fn empty_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stagebench.yaml");
        std::fs::write(&path, "version: 1\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg, BenchConfig::default());
        assert_eq!(cfg.namespace("project-0"), "runai-project-0");
    }

    #[test]
    fn stage_overrides_apply_per_kind() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stagebench.yaml");
        std::fs::write(
            &path,
            "version: 1\nstages:\n  training: [created, scheduled]\nnamespace_prefix: ''\n",
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(
            cfg.stages.for_kind(WorkloadKind::Training).stages(),
            &[Stage::Created, Stage::Scheduled]
        );
        assert_eq!(
            cfg.stages.for_kind(WorkloadKind::Distributed),
            WorkloadKind::Distributed.default_stages()
        );
        assert_eq!(cfg.namespace("team-a"), "team-a");
    }

    #[test]
    fn unknown_stage_is_a_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stagebench.yaml");
        std::fs::write(&path, "version: 1\nstages:\n  training: [created, pod-running]\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("pod-running"));
    }

    #[test]
    fn rejects_other_versions_and_missing_explicit_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stagebench.yaml");
        std::fs::write(&path, "version: 2\n").unwrap();
        assert!(load_config(&path).is_err());

        let missing = dir.path().join("absent.yaml");
        assert!(load_config_or_default(&missing, false).is_ok());
        assert!(load_config_or_default(&missing, true).is_err());
    }

    #[test]
    fn api_resources_depend_on_workload_kind() {
        let names = ResourceNames::default();
        assert_eq!(
            names.api_resource(ResourceKind::Workload, WorkloadKind::Distributed),
            "distributedworkloads.run.ai"
        );
        assert_eq!(
            names.api_resource(ResourceKind::Job, WorkloadKind::Distributed),
            "pytorchjobs.kubeflow.org"
        );
        assert_eq!(
            names.api_resource(ResourceKind::Job, WorkloadKind::Interactive),
            "runaijobs.run.ai"
        );
    }
}
