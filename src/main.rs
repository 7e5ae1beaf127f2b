use anyhow::Result;
use clap::{Parser, Subcommand};
use gpuwatch::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Cluster GPU usage monitor.
#[derive(Parser, Debug)]
#[command(name = "gpuwatch")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample GPU usage on the configured schedule and append it to the store.
    Collect {
        /// Run a single cycle and exit (for cron).
        #[arg(long)]
        once: bool,
    },
    /// Serve the dashboard API.
    Serve {
        /// Also run the collection loop in this process.
        #[arg(long)]
        collect: bool,
    },
}

type KubectlCollector = collector::Collector<cluster::KubectlClient>;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let cli = Cli::parse();
    let app_config = config::AppConfig::load_from_path(&cli.config)?;

    let store = Arc::new(store::SnapshotStore::from_config(&app_config.store));
    let api = Arc::new(cluster::KubectlClient::new(&app_config.cluster));
    let collector = Arc::new(collector::Collector::new(api, app_config.cluster.clone()));

    match cli.command {
        Command::Collect { once: true } => {
            let report = worker::run_cycle(collector.as_ref(), store.as_ref()).await?;
            tracing::info!(pods = report.pods, gpus = report.gpus, "single collection done");
        }
        Command::Collect { once: false } => {
            let (shutdown_tx, worker_handle) =
                spawn_worker(collector, store, &app_config.collection);
            shutdown_signal().await;
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            let _ = worker_handle.await;
        }
        Command::Serve { collect } => {
            let worker = collect
                .then(|| spawn_worker(collector, store.clone(), &app_config.collection));

            let app = routes::app(store);
            let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(collector = collect, "Listening on http://{}", addr);

            tokio::select! {
                result = axum::serve(listener, app) => {
                    result?;
                }
                _ = shutdown_signal() => {
                    tracing::info!("Received shutdown signal");
                }
            }
            if let Some((shutdown_tx, worker_handle)) = worker {
                let _ = shutdown_tx.send(());
                let _ = worker_handle.await;
            }
        }
    }

    Ok(())
}

fn spawn_worker(
    collector: Arc<KubectlCollector>,
    store: Arc<store::SnapshotStore>,
    collection: &config::CollectionConfig,
) -> (
    tokio::sync::oneshot::Sender<()>,
    tokio::task::JoinHandle<()>,
) {
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = worker::spawn(
        worker::WorkerDeps {
            collector,
            store,
            shutdown_rx,
        },
        worker::WorkerConfig::from(collection),
    );
    (shutdown_tx, handle)
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
