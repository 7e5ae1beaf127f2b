// Kubernetes access through kubectl: pod listing and in-pod command execution.
// Everything above this module talks to the ClusterApi trait only.

mod pods;

use std::future::Future;
use std::process::Output;

use thiserror::Error;
use tokio::process::Command;
use tracing::instrument;

use crate::config::ClusterConfig;

pub use pods::{Container, Pod, PodList, PodMetadata, PodSpec, PodStatus, Resources};

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{operation} failed ({status}): {stderr}")]
    CommandFailed {
        operation: &'static str,
        status: String,
        stderr: String,
    },
    #[error("invalid pod list: {0}")]
    InvalidPodList(#[from] serde_json::Error),
}

/// The two cluster calls the collector needs. Implementations must be cheap to share.
pub trait ClusterApi: Send + Sync {
    fn list_pods(
        &self,
        namespace: &str,
    ) -> impl Future<Output = Result<Vec<Pod>, ClusterError>> + Send;

    /// Runs `command` through `/bin/sh -c` inside `pod` and returns its stdout.
    fn exec(
        &self,
        namespace: &str,
        pod: &str,
        command: &str,
    ) -> impl Future<Output = Result<String, ClusterError>> + Send;
}

pub struct KubectlClient {
    kubectl_path: String,
    kubeconfig: Option<String>,
}

impl KubectlClient {
    pub fn new(config: &ClusterConfig) -> Self {
        Self {
            kubectl_path: config.kubectl_path.clone(),
            kubeconfig: config.kubeconfig.clone(),
        }
    }

    fn command(&self, namespace: &str) -> Command {
        let mut cmd = Command::new(&self.kubectl_path);
        if let Some(ref kubeconfig) = self.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        cmd.arg("-n").arg(namespace);
        // A timed-out exec is dropped by the caller; the child must not outlive it.
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command, operation: &'static str) -> Result<String, ClusterError> {
        let output = cmd.output().await.map_err(|source| ClusterError::Spawn {
            program: self.kubectl_path.clone(),
            source,
        })?;
        check_output(output, operation)
    }
}

fn check_output(output: Output, operation: &'static str) -> Result<String, ClusterError> {
    if !output.status.success() {
        return Err(ClusterError::CommandFailed {
            operation,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

impl ClusterApi for KubectlClient {
    #[instrument(skip(self), fields(operation = "list_pods"))]
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, ClusterError> {
        let mut cmd = self.command(namespace);
        cmd.args(["get", "pods", "-o", "json"]);
        let stdout = self.run(cmd, "kubectl get pods").await?;
        let list: PodList = serde_json::from_str(&stdout)?;
        Ok(list.items)
    }

    #[instrument(skip(self, command), fields(operation = "exec"))]
    async fn exec(&self, namespace: &str, pod: &str, command: &str) -> Result<String, ClusterError> {
        let mut cmd = self.command(namespace);
        cmd.args(["exec", pod, "--", "/bin/sh", "-c", command]);
        self.run(cmd, "kubectl exec").await
    }
}
