// Background collection worker: one cycle per tick (fixed interval or cron schedule).
// Cycles run one at a time in this task; ticks that come due mid-cycle are skipped,
// so the store never sees two writers from the same process.

use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{error, info, instrument, warn};

use crate::cluster::{ClusterApi, ClusterError};
use crate::collector::Collector;
use crate::config::CollectionConfig;
use crate::store::{AppendReport, SnapshotStore};

/// Sleep used when a cron schedule has no upcoming fire time.
const CRON_IDLE_SLEEP: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum CycleError {
    /// Pod listing failed; nothing was written. Retried on the next tick.
    #[error("pod discovery failed: {0}")]
    Discovery(#[from] ClusterError),
    /// The store could not be written; the cycle's data is lost.
    #[error("store write failed: {0:#}")]
    Store(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub pods: usize,
    pub gpus: usize,
    pub store: AppendReport,
}

pub struct WorkerDeps<C> {
    pub collector: Arc<Collector<C>>,
    pub store: Arc<SnapshotStore>,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

/// Worker timing config.
pub struct WorkerConfig {
    pub interval_secs: u64,
    /// Cron expression (local time); takes precedence over interval_secs.
    pub schedule: Option<String>,
}

impl From<&CollectionConfig> for WorkerConfig {
    fn from(config: &CollectionConfig) -> Self {
        Self {
            interval_secs: config.interval_secs,
            schedule: config.schedule.clone(),
        }
    }
}

/// Collect once and append the result. Also used by `collect --once`.
#[instrument(skip_all, fields(operation = "cycle"))]
pub async fn run_cycle<C: ClusterApi>(
    collector: &Collector<C>,
    store: &SnapshotStore,
) -> Result<CycleReport, CycleError> {
    let snapshots = collector.collect().await?;
    let pods = snapshots.len();
    let gpus: usize = snapshots.iter().map(|s| s.gpu_readings.len()).sum();
    let report = store.append(snapshots).await.map_err(CycleError::Store)?;
    info!(
        pods,
        gpus,
        appended = report.appended,
        pruned = report.pruned,
        retained = report.retained,
        "collection cycle complete"
    );
    Ok(CycleReport {
        pods,
        gpus,
        store: report,
    })
}

enum Ticker {
    Interval(Interval),
    Cron(cron::Schedule),
}

impl Ticker {
    fn new(config: &WorkerConfig) -> Self {
        if let Some(ref expr) = config.schedule {
            match cron::Schedule::from_str(expr) {
                Ok(schedule) => return Ticker::Cron(schedule),
                Err(e) => {
                    warn!(cron = %expr, error = %e, "invalid collection schedule; using interval");
                }
            }
        }
        let mut tick = interval(Duration::from_secs(config.interval_secs));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Ticker::Interval(tick)
    }

    async fn tick(&mut self) {
        match self {
            Ticker::Interval(tick) => {
                tick.tick().await;
            }
            Ticker::Cron(schedule) => {
                let now = chrono::Local::now();
                match schedule.after(&now).next() {
                    Some(next) => {
                        let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                        tokio::time::sleep(delay).await;
                    }
                    None => tokio::time::sleep(CRON_IDLE_SLEEP).await,
                }
            }
        }
    }
}

pub fn spawn<C: ClusterApi + 'static>(
    deps: WorkerDeps<C>,
    config: WorkerConfig,
) -> tokio::task::JoinHandle<()> {
    let WorkerDeps {
        collector,
        store,
        mut shutdown_rx,
    } = deps;

    tokio::spawn(async move {
        let mut ticker = Ticker::new(&config);
        let mut cycles_total: u64 = 0;
        let mut cycles_failed: u64 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    cycles_total += 1;
                    match run_cycle(collector.as_ref(), store.as_ref()).await {
                        Ok(_) => {}
                        Err(e @ CycleError::Discovery(_)) => {
                            cycles_failed += 1;
                            warn!(error = %e, cycles_total, cycles_failed, "collection cycle aborted");
                        }
                        Err(e @ CycleError::Store(_)) => {
                            cycles_failed += 1;
                            error!(error = %e, cycles_total, cycles_failed, "collection cycle lost");
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    info!(cycles_total, cycles_failed, "Worker shutting down");
                    break;
                }
            }
        }
    })
}
