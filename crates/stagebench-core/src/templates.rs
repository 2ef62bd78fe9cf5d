//! Workload manifest templates.
//!
//! Templates are plain YAML with placeholder tokens. The built-in set can be
//! overridden per kind by dropping `<kind>.yaml` (and `pvc.yaml`) into a
//! template directory.

use std::path::Path;

use crate::error::{BenchError, BenchResult};
use crate::model::{WorkloadKind, WorkloadRequest};

pub const JOB_NAME: &str = "JOB_NAME_PLACEHOLDER";
pub const PROJECT: &str = "PROJECT_PLACEHOLDER";
pub const NAMESPACE: &str = "NAMESPACE_PLACEHOLDER";
pub const NUM_WORKERS: &str = "NUM_WORKERS_PLACEHOLDER";
pub const NUM_GPUS: &str = "NUM_GPUS_PLACEHOLDER";

pub const TRAINING_YAML: &str = r#"apiVersion: run.ai/v2alpha1
kind: TrainingWorkload
metadata:
  name: JOB_NAME_PLACEHOLDER
  namespace: NAMESPACE_PLACEHOLDER
  labels:
    project: PROJECT_PLACEHOLDER
spec:
  name:
    value: JOB_NAME_PLACEHOLDER
  image:
    value: gcr.io/run-ai-lab/ubuntu:loop
  imagePullPolicy:
    value: IfNotPresent
  command:
    value: sleep infinity
  gpu:
    value: "NUM_GPUS_PLACEHOLDER"
"#;

pub const DISTRIBUTED_YAML: &str = r#"apiVersion: run.ai/v2alpha1
kind: DistributedWorkload
metadata:
  name: JOB_NAME_PLACEHOLDER
  namespace: NAMESPACE_PLACEHOLDER
  labels:
    project: PROJECT_PLACEHOLDER
spec:
  name:
    value: JOB_NAME_PLACEHOLDER
  jobType: PyTorchJob
  image:
    value: gcr.io/run-ai-lab/ubuntu:loop
  imagePullPolicy:
    value: IfNotPresent
  command:
    value: sleep infinity
  cleanPodPolicy:
    value: None
  workers:
    value: NUM_WORKERS_PLACEHOLDER
  gpu:
    value: "NUM_GPUS_PLACEHOLDER"
"#;

pub const INTERACTIVE_YAML: &str = r#"apiVersion: run.ai/v2alpha1
kind: InteractiveWorkload
metadata:
  name: JOB_NAME_PLACEHOLDER
  namespace: NAMESPACE_PLACEHOLDER
  labels:
    project: PROJECT_PLACEHOLDER
spec:
  name:
    value: JOB_NAME_PLACEHOLDER
  image:
    value: gcr.io/run-ai-lab/ubuntu:loop
  imagePullPolicy:
    value: IfNotPresent
  command:
    value: sleep infinity
  gpu:
    value: "NUM_GPUS_PLACEHOLDER"
"#;

/// Spec fragment attaching an ephemeral volume; indented to sit under `spec:`.
pub const PVC_YAML: &str = r#"  pvcs:
    items:
      pvc--0:
        value:
          claimName: JOB_NAME_PLACEHOLDER-ephemeral
          existingPvc:
            value: false
          path:
            value: /path-new
          readOnly:
            value: false
          ephemeral:
            value: true
          claimInfo:
            value:
              size:
                value: 1Mi
              storageClass:
                value: openebs-lvmpv
              accessModes:
                value:
                  readWriteOnce:
                    value: true
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadTemplates {
    training: String,
    distributed: String,
    interactive: String,
    pvc: String,
}

impl Default for WorkloadTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}

impl WorkloadTemplates {
    pub fn builtin() -> Self {
        Self {
            training: TRAINING_YAML.to_string(),
            distributed: DISTRIBUTED_YAML.to_string(),
            interactive: INTERACTIVE_YAML.to_string(),
            pvc: PVC_YAML.to_string(),
        }
    }

    /// Built-ins overridden by whichever template files exist in `dir`.
    pub fn from_dir(dir: &Path) -> BenchResult<Self> {
        if !dir.is_dir() {
            return Err(BenchError::Template {
                message: format!("template directory {} does not exist", dir.display()),
            });
        }
        let mut templates = Self::builtin();
        for (file, slot) in [
            ("training.yaml", &mut templates.training),
            ("distributed.yaml", &mut templates.distributed),
            ("interactive.yaml", &mut templates.interactive),
            ("pvc.yaml", &mut templates.pvc),
        ] {
            let path = dir.join(file);
            if path.exists() {
                *slot = std::fs::read_to_string(&path).map_err(|e| BenchError::Template {
                    message: format!("failed to read {}: {}", path.display(), e),
                })?;
                tracing::debug!(path = %path.display(), "loaded template override");
            }
        }
        Ok(templates)
    }

    fn for_kind(&self, kind: WorkloadKind) -> &str {
        match kind {
            WorkloadKind::Training => &self.training,
            WorkloadKind::Distributed => &self.distributed,
            WorkloadKind::Interactive => &self.interactive,
        }
    }

    /// Render the manifest for one creation call.
    pub fn render(&self, request: &WorkloadRequest) -> Result<String, String> {
        let mut manifest = self.for_kind(request.kind).to_string();

        if request.pvc {
            manifest = match manifest.find("\nstatus:") {
                Some(at) => {
                    let (head, tail) = manifest.split_at(at + 1);
                    format!("{head}{}{tail}", self.pvc)
                }
                None => {
                    if !manifest.ends_with('\n') {
                        manifest.push('\n');
                    }
                    manifest + &self.pvc
                }
            };
        }

        let manifest = manifest
            .replace(JOB_NAME, &request.id)
            .replace(PROJECT, &request.project)
            .replace(NAMESPACE, &request.namespace)
            .replace(NUM_WORKERS, &request.workers.to_string())
            .replace(NUM_GPUS, &request.gpus.to_string());

        if let Some(at) = manifest.find("_PLACEHOLDER") {
            let line = manifest[..at].lines().count().max(1);
            return Err(format!("unreplaced placeholder on line {line}"));
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: WorkloadKind, pvc: bool) -> WorkloadRequest {
        WorkloadRequest {
            id: "j-1a2b3c".into(),
            kind,
            project: "project-0".into(),
            namespace: "runai-project-0".into(),
            workers: 7,
            gpus: 1,
            pvc,
        }
    }

    #[test]
    fn builtin_templates_render_completely() {
        let templates = WorkloadTemplates::builtin();
        for kind in WorkloadKind::ALL {
            let manifest = templates.render(&request(kind, true)).unwrap();
            assert!(manifest.contains("name: j-1a2b3c"));
            assert!(manifest.contains("namespace: runai-project-0"));
            assert!(manifest.contains("claimName: j-1a2b3c-ephemeral"));
            let doc: serde_yaml::Value = serde_yaml::from_str(&manifest).unwrap();
            assert!(doc["spec"]["pvcs"].is_mapping(), "pvc must land under spec");
        }
        let distributed = templates
            .render(&request(WorkloadKind::Distributed, false))
            .unwrap();
        assert!(distributed.contains("value: 7"));
        assert!(!distributed.contains("pvcs:"));
    }

    #[test]
    fn pvc_is_spliced_before_status() {
        let mut templates = WorkloadTemplates::builtin();
        templates.training = "spec:\n  name: JOB_NAME_PLACEHOLDER\nstatus:\n  phase: x\n".into();
        let manifest = templates
            .render(&request(WorkloadKind::Training, true))
            .unwrap();
        let pvc_at = manifest.find("  pvcs:").unwrap();
        let status_at = manifest.find("\nstatus:").unwrap();
        assert!(pvc_at < status_at);
    }

    #[test]
    fn leftover_placeholder_is_rejected() {
        let mut templates = WorkloadTemplates::builtin();
        templates.training = "metadata:\n  name: JOB_NAME_PLACEHOLDER\n  x: IMAGE_PLACEHOLDER\n".into();
        let err = templates
            .render(&request(WorkloadKind::Training, false))
            .unwrap_err();
        assert!(err.contains("line 3"));
    }

    #[test]
    fn directory_overrides_single_kind() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("training.yaml"), "kind: Custom\nname: JOB_NAME_PLACEHOLDER\n").unwrap();
        let templates = WorkloadTemplates::from_dir(dir.path()).unwrap();

        let training = templates
            .render(&request(WorkloadKind::Training, false))
            .unwrap();
        assert_eq!(training, "kind: Custom\nname: j-1a2b3c\n");
        let interactive = templates
            .render(&request(WorkloadKind::Interactive, false))
            .unwrap();
        assert!(interactive.contains("InteractiveWorkload"));

        assert!(WorkloadTemplates::from_dir(&dir.path().join("absent")).is_err());
    }
}
