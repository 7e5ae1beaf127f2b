use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cluster: ClusterConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub namespace: String,
    /// Passed to kubectl as --kubeconfig; kubectl defaults apply when unset.
    #[serde(default)]
    pub kubeconfig: Option<String>,
    #[serde(default = "default_kubectl_path")]
    pub kubectl_path: String,
    /// Pod label naming the owning user.
    #[serde(default = "default_user_label")]
    pub user_label: String,
    /// Stripped from the label value to get the bare username.
    #[serde(default = "default_user_suffix")]
    pub user_suffix: String,
    /// Container resource limit that marks a pod as GPU-bearing.
    #[serde(default = "default_gpu_resource")]
    pub gpu_resource: String,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
}

fn default_kubectl_path() -> String {
    "kubectl".into()
}

fn default_user_label() -> String {
    "eidf/user".into()
}

fn default_user_suffix() -> String {
    "-infk8s".into()
}

fn default_gpu_resource() -> String {
    "nvidia.com/gpu".into()
}

fn default_probe_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_probes() -> usize {
    8
}

impl ClusterConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    14
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Optional cron expression (local time, with seconds field). Overrides interval_secs.
    #[serde(default)]
    pub schedule: Option<String>,
}

fn default_interval_secs() -> u64 {
    15 * 60
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            schedule: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &str) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {}", path, e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.cluster.namespace.is_empty(),
            "cluster.namespace must be non-empty"
        );
        anyhow::ensure!(
            !self.cluster.kubectl_path.is_empty(),
            "cluster.kubectl_path must be non-empty"
        );
        anyhow::ensure!(
            !self.cluster.user_label.is_empty(),
            "cluster.user_label must be non-empty"
        );
        anyhow::ensure!(
            !self.cluster.gpu_resource.is_empty(),
            "cluster.gpu_resource must be non-empty"
        );
        anyhow::ensure!(
            self.cluster.probe_timeout_secs > 0,
            "cluster.probe_timeout_secs must be > 0, got {}",
            self.cluster.probe_timeout_secs
        );
        anyhow::ensure!(
            self.cluster.max_concurrent_probes > 0,
            "cluster.max_concurrent_probes must be > 0, got {}",
            self.cluster.max_concurrent_probes
        );
        anyhow::ensure!(!self.store.path.is_empty(), "store.path must be non-empty");
        anyhow::ensure!(
            self.store.retention_days > 0,
            "store.retention_days must be > 0, got {}",
            self.store.retention_days
        );
        anyhow::ensure!(
            self.collection.interval_secs > 0,
            "collection.interval_secs must be > 0, got {}",
            self.collection.interval_secs
        );
        if let Some(ref expr) = self.collection.schedule {
            cron::Schedule::from_str(expr).map_err(|e| {
                anyhow::anyhow!("collection.schedule is not a valid cron expression: {}", e)
            })?;
        }
        Ok(())
    }
}
