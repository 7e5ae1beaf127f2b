// Pod discovery: running pods in the namespace that hold GPU limits.

use tracing::{debug, instrument};

use crate::cluster::{ClusterApi, ClusterError, Pod};
use crate::config::ClusterConfig;
use crate::models::GpuPod;

/// Username used when a pod lacks the owner label.
pub const UNKNOWN_USER: &str = "unknown";

/// Lists GPU-bearing pods. API errors propagate: the caller aborts the cycle.
#[instrument(skip(api, config), fields(namespace = %config.namespace, operation = "discover"))]
pub async fn discover<C: ClusterApi>(
    api: &C,
    config: &ClusterConfig,
) -> Result<Vec<GpuPod>, ClusterError> {
    let pods = api.list_pods(&config.namespace).await?;
    let total = pods.len();
    let selected = select_gpu_pods(&pods, config);
    debug!(pods_total = total, gpu_pods = selected.len(), "pods listed");
    Ok(selected)
}

/// Keeps running pods with a GPU limit, in listing order.
pub fn select_gpu_pods(pods: &[Pod], config: &ClusterConfig) -> Vec<GpuPod> {
    pods.iter()
        .filter(|p| p.is_running() && p.requests_resource(&config.gpu_resource))
        .map(|p| GpuPod {
            pod_name: p.metadata.name.clone(),
            username: owner_username(p, config),
            pod_id: p.metadata.uid.clone(),
        })
        .collect()
}

fn owner_username(pod: &Pod, config: &ClusterConfig) -> String {
    match pod.metadata.labels.get(&config.user_label) {
        Some(label) => strip_user_suffix(label, &config.user_suffix),
        None => UNKNOWN_USER.to_string(),
    }
}

/// "alice-infk8s" -> "alice". Only a trailing suffix is removed.
pub fn strip_user_suffix(label: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return label.to_string();
    }
    label.strip_suffix(suffix).unwrap_or(label).to_string()
}
