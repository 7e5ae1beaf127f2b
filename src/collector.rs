// Snapshot collector: discovery, then one probe per pod, stamped with a shared timestamp.

use std::sync::Arc;

use chrono::NaiveDateTime;
use futures_util::{StreamExt, stream};
use tracing::{debug, instrument};

use crate::cluster::{ClusterApi, ClusterError};
use crate::config::ClusterConfig;
use crate::discovery;
use crate::models::{GpuReading, PodSnapshot, local_now};
use crate::probe;

pub struct Collector<C> {
    api: Arc<C>,
    config: ClusterConfig,
}

impl<C: ClusterApi> Collector<C> {
    pub fn new(api: Arc<C>, config: ClusterConfig) -> Self {
        Self { api, config }
    }

    pub async fn collect(&self) -> Result<Vec<PodSnapshot>, ClusterError> {
        self.collect_at(local_now()).await
    }

    /// One cycle. Discovery errors abort it; a pod whose probe yields nothing is left out.
    /// Probes run concurrently (bounded) and results keep discovery order.
    #[instrument(skip(self), fields(operation = "collect"))]
    pub async fn collect_at(
        &self,
        timestamp: NaiveDateTime,
    ) -> Result<Vec<PodSnapshot>, ClusterError> {
        let pods = discovery::discover(self.api.as_ref(), &self.config).await?;

        let timeout = self.config.probe_timeout();
        let probes: Vec<_> = pods
            .iter()
            .map(|pod| {
                let api = Arc::clone(&self.api);
                let namespace = self.config.namespace.clone();
                let pod_name = pod.pod_name.clone();
                async move { probe::probe(api.as_ref(), &namespace, &pod_name, timeout).await }
            })
            .collect();
        let readings: Vec<Vec<GpuReading>> = stream::iter(probes)
            .buffered(self.config.max_concurrent_probes)
            .collect()
            .await;

        let snapshots = pods
            .into_iter()
            .zip(readings)
            .filter_map(|(pod, gpu_readings)| {
                if gpu_readings.is_empty() {
                    debug!(pod = %pod.pod_name, "no GPU readings, pod left out of snapshot");
                    return None;
                }
                Some(PodSnapshot {
                    pod_name: pod.pod_name,
                    username: pod.username,
                    pod_id: pod.pod_id,
                    timestamp,
                    gpu_readings,
                })
            })
            .collect();
        Ok(snapshots)
    }
}
