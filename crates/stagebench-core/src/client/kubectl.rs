//! `kubectl` subprocess transport.
//!
//! Creation pipes the rendered manifest into `kubectl apply -f -`; listing
//! runs `kubectl get <resource> -n <namespace> -o json`. Credentials and
//! cluster selection come from the caller's kubeconfig.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{decode_list, ClientError, ResourceClient, ResourceState};
use crate::config::ResourceNames;
use crate::model::{ResourceKind, WorkloadKind, WorkloadRequest};
use crate::templates::WorkloadTemplates;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct KubectlClient {
    program: String,
    context: Option<String>,
    resources: ResourceNames,
    templates: WorkloadTemplates,
    timeout: Duration,
}

impl KubectlClient {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            context: None,
            resources: ResourceNames::default(),
            templates: WorkloadTemplates::builtin(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_resources(mut self, resources: ResourceNames) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_templates(mut self, templates: WorkloadTemplates) -> Self {
        self.templates = templates;
        self
    }

    /// Upper bound for a single `kubectl` invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn base_args(&self) -> Vec<String> {
        match &self.context {
            Some(ctx) => vec!["--context".to_string(), ctx.clone()],
            None => Vec::new(),
        }
    }

    fn describe(&self, args: &[String]) -> String {
        format!("{} {}", self.program, args.join(" "))
    }

    async fn run(&self, args: Vec<String>, stdin: Option<&str>) -> Result<Vec<u8>, ClientError> {
        let command = self.describe(&args);
        debug!(command = %command, "running kubectl");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ClientError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let exchange = async {
            if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
                pipe.write_all(input.as_bytes()).await?;
                pipe.shutdown().await?;
            }
            child.wait_with_output().await
        };

        // On timeout the future is dropped, and with it the child (kill_on_drop).
        let output = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ClientError::Spawn {
                    program: self.program.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(ClientError::Timeout {
                    command,
                    after: self.timeout,
                })
            }
        };

        if !output.status.success() {
            return Err(ClientError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl ResourceClient for KubectlClient {
    async fn create(&self, request: &WorkloadRequest) -> Result<String, ClientError> {
        let manifest = self
            .templates
            .render(request)
            .map_err(|message| ClientError::Manifest {
                id: request.id.clone(),
                message,
            })?;

        let mut args = self.base_args();
        args.extend(["apply", "-f", "-"].map(String::from));
        self.run(args, Some(&manifest)).await?;
        Ok(request.id.clone())
    }

    async fn list(
        &self,
        namespace: &str,
        workload: WorkloadKind,
        resource: ResourceKind,
    ) -> Result<Vec<ResourceState>, ClientError> {
        let api_resource = self.resources.api_resource(resource, workload);
        let mut args = self.base_args();
        args.extend(
            ["get", api_resource.as_str(), "-n", namespace, "-o", "json"].map(String::from),
        );
        let raw = self.run(args, None).await?;
        decode_list(resource, &raw)
    }

    fn transport_name(&self) -> &'static str {
        "kubectl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_prepended() {
        let client = KubectlClient::new("kubectl").with_context(Some("staging".into()));
        let mut args = client.base_args();
        args.push("get".into());
        assert_eq!(client.describe(&args), "kubectl --context staging get");
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let client = KubectlClient::new("/nonexistent/stagebench-kubectl");
        let err = client
            .list("runai-project-0", WorkloadKind::Training, ResourceKind::Pod)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_carries_stderr() {
        // `false` ignores its arguments and exits 1.
        let client = KubectlClient::new("false");
        let err = client
            .list("runai-project-0", WorkloadKind::Training, ResourceKind::Pod)
            .await
            .unwrap_err();
        match err {
            ClientError::CommandFailed { command, .. } => {
                assert!(command.starts_with("false get pods -n runai-project-0"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
