// Shared test helpers: an in-memory cluster and snapshot builders

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDateTime;
use gpuwatch::cluster::{ClusterApi, ClusterError, Pod};
use gpuwatch::config::AppConfig;
use gpuwatch::models::{GpuReading, PodSnapshot};
use gpuwatch::probe::GPU_QUERY;

pub const TEST_CONFIG: &str = r#"
[server]
port = 8501
host = "127.0.0.1"

[cluster]
namespace = "informatics"
probe_timeout_secs = 5
max_concurrent_probes = 4

[store]
path = "data/usage.json"
"#;

pub fn test_config() -> AppConfig {
    AppConfig::load_from_str(TEST_CONFIG).unwrap()
}

pub enum ExecOutcome {
    Output(String),
    Fail(String),
    Hang,
}

/// Fake cluster: fixed pod list (or listing failure) and canned exec results per pod.
pub struct FakeCluster {
    pods: Option<Vec<Pod>>,
    exec: HashMap<String, ExecOutcome>,
    exec_calls: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn new(pods: Vec<Pod>) -> Self {
        Self {
            pods: Some(pods),
            exec: HashMap::new(),
            exec_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            pods: None,
            exec: HashMap::new(),
            exec_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_exec(mut self, pod: &str, outcome: ExecOutcome) -> Self {
        self.exec.insert(pod.to_string(), outcome);
        self
    }

    pub fn exec_calls(&self) -> Vec<String> {
        let mut calls = self.exec_calls.lock().unwrap().clone();
        calls.sort();
        calls
    }
}

impl ClusterApi for FakeCluster {
    async fn list_pods(&self, _namespace: &str) -> Result<Vec<Pod>, ClusterError> {
        match self.pods {
            Some(ref pods) => Ok(pods.clone()),
            None => Err(ClusterError::CommandFailed {
                operation: "kubectl get pods",
                status: "exit status: 1".into(),
                stderr: "The connection to the server was refused".into(),
            }),
        }
    }

    async fn exec(&self, _namespace: &str, pod: &str, command: &str) -> Result<String, ClusterError> {
        assert_eq!(command, GPU_QUERY);
        self.exec_calls.lock().unwrap().push(pod.to_string());
        match self.exec.get(pod) {
            Some(ExecOutcome::Output(out)) => Ok(out.clone()),
            Some(ExecOutcome::Fail(stderr)) => Err(ClusterError::CommandFailed {
                operation: "kubectl exec",
                status: "exit status: 126".into(),
                stderr: stderr.clone(),
            }),
            Some(ExecOutcome::Hang) => std::future::pending().await,
            None => Err(ClusterError::CommandFailed {
                operation: "kubectl exec",
                status: "exit status: 1".into(),
                stderr: format!("pods \"{pod}\" not found"),
            }),
        }
    }
}

/// A pod as kubectl would list it.
pub fn pod(name: &str, user_label: Option<&str>, phase: &str, gpus: u32) -> Pod {
    let labels = match user_label {
        Some(user) => serde_json::json!({ "eidf/user": user }),
        None => serde_json::json!({}),
    };
    let limits = if gpus > 0 {
        serde_json::json!({ "nvidia.com/gpu": gpus.to_string(), "cpu": "4" })
    } else {
        serde_json::json!({ "cpu": "4" })
    };
    serde_json::from_value(serde_json::json!({
        "metadata": { "name": name, "uid": format!("{name}-uid"), "labels": labels },
        "spec": { "containers": [ { "name": "main", "resources": { "limits": limits } } ] },
        "status": { "phase": phase }
    }))
    .unwrap()
}

/// One nvidia-smi output line.
pub fn smi_line(name: &str, used: u64, total: u64, gpu_util: u32) -> String {
    format!(
        "{name}, {used}, {free}, {total}, {gpu_util}, {mem_util}\n",
        free = total - used,
        mem_util = used * 100 / total
    )
}

pub fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

pub fn reading(name: &str, used: u64, total: u64) -> GpuReading {
    GpuReading {
        gpu_name: name.into(),
        memory_used_mb: used,
        memory_free_mb: total - used,
        memory_total_mb: total,
        gpu_util_pct: 0,
        memory_util_pct: (used * 100 / total) as u32,
    }
}

pub fn snapshot(
    pod_name: &str,
    username: &str,
    timestamp: NaiveDateTime,
    gpu_readings: Vec<GpuReading>,
) -> PodSnapshot {
    PodSnapshot {
        pod_name: pod_name.into(),
        username: username.into(),
        pod_id: format!("{pod_name}-uid"),
        timestamp,
        gpu_readings,
    }
}
