// Minimal view of `kubectl get pods -o json`. Unknown fields are ignored.

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<Pod>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: PodMetadata,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub resources: Resources,
}

/// Quantities are kept as raw JSON values; kubectl emits strings but numbers are tolerated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub limits: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodStatus {
    #[serde(default)]
    pub phase: String,
}

impl Pod {
    pub fn is_running(&self) -> bool {
        self.status.phase == "Running"
    }

    /// True when any container has a non-zero limit for `resource`.
    pub fn requests_resource(&self, resource: &str) -> bool {
        self.spec.containers.iter().any(|c| {
            c.resources
                .limits
                .get(resource)
                .is_some_and(quantity_is_nonzero)
        })
    }
}

/// Unparseable quantities count as present.
fn quantity_is_nonzero(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::String(s) => s.trim().parse::<u64>().map_or(true, |n| n > 0),
        serde_json::Value::Number(n) => n.as_u64().is_none_or(|n| n > 0),
        serde_json::Value::Null => false,
        _ => true,
    }
}
