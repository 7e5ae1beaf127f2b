// JSON time-series store: one array of pod snapshots, rewritten on every append.
// Appends hold an advisory lock on `<path>.lock` (shared by every process using the
// store) for the whole read-modify-write. Readers never lock and always see a whole
// file because writes go to a uniquely named temp file that is renamed into place.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{NaiveDateTime, TimeDelta};
use fslock::LockFile;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::config::StoreConfig;
use crate::models::{PodSnapshot, local_now};

#[derive(Debug, Error)]
enum ReadError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("decoding {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of one append, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendReport {
    pub appended: usize,
    pub pruned: usize,
    pub retained: usize,
}

pub struct SnapshotStore {
    path: PathBuf,
    retention: TimeDelta,
    /// Queues this process's appends ahead of the file lock.
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self {
            path: path.into(),
            retention: TimeDelta::days(retention_days as i64),
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.path, config.retention_days)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn retention(&self) -> TimeDelta {
        self.retention
    }

    /// Full retained series in insertion order. Missing or unreadable store is empty.
    #[instrument(skip(self), fields(repo = "store", operation = "load"))]
    pub async fn load(&self) -> Vec<PodSnapshot> {
        match self.read().await {
            Ok(series) => series,
            Err(e) => {
                warn!(error = %e, "store unreadable, treating as empty");
                Vec::new()
            }
        }
    }

    pub async fn append(&self, snapshots: Vec<PodSnapshot>) -> anyhow::Result<AppendReport> {
        self.append_at(snapshots, local_now()).await
    }

    /// Appends, prunes entries not newer than `now - retention`, and replaces the file.
    #[instrument(
        skip(self, snapshots),
        fields(repo = "store", operation = "append", snapshots_count = snapshots.len())
    )]
    pub async fn append_at(
        &self,
        snapshots: Vec<PodSnapshot>,
        now: NaiveDateTime,
    ) -> anyhow::Result<AppendReport> {
        let _guard = self.write_lock.lock().await;
        self.create_parent().await?;
        let _file_lock = self.lock_exclusive().await?;

        let mut series = match self.read().await {
            Ok(series) => series,
            Err(ReadError::Corrupt { source, .. }) => {
                let moved_to = self.quarantine().await?;
                warn!(
                    error = %source,
                    moved_to = %moved_to.display(),
                    "store was corrupt; moved aside and starting a new series"
                );
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let appended = snapshots.len();
        series.extend(snapshots);
        let cutoff = now
            .checked_sub_signed(self.retention)
            .unwrap_or(NaiveDateTime::MIN);
        let pruned = prune(&mut series, cutoff);
        self.write(&series).await?;

        Ok(AppendReport {
            appended,
            pruned,
            retained: series.len(),
        })
    }

    async fn read(&self) -> Result<Vec<PodSnapshot>, ReadError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ReadError::Io {
                    path: self.path.display().to_string(),
                    source,
                });
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes).map_err(|source| ReadError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })
    }

    async fn create_parent(&self) -> anyhow::Result<()> {
        let parent = parent_dir(&self.path);
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))
    }

    /// Blocks (off the runtime) until no other writer holds `<path>.lock`.
    /// Released when the returned handle is dropped.
    async fn lock_exclusive(&self) -> anyhow::Result<LockFile> {
        let lock_path = self.sibling("lock");
        tokio::task::spawn_blocking(move || -> anyhow::Result<LockFile> {
            let mut lock = LockFile::open(lock_path.as_path())
                .map_err(|e| anyhow::anyhow!("opening {}: {}", lock_path.display(), e))?;
            lock.lock()
                .map_err(|e| anyhow::anyhow!("locking {}: {}", lock_path.display(), e))?;
            Ok(lock)
        })
        .await?
    }

    async fn write(&self, series: &[PodSnapshot]) -> anyhow::Result<()> {
        let body = serde_json::to_vec_pretty(series)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || replace_file(&path, &body)).await?
    }

    async fn quarantine(&self) -> anyhow::Result<PathBuf> {
        let stamp = local_now().format("%Y%m%d%H%M%S").to_string();
        let target = self.sibling(&format!("corrupt-{stamp}"));
        tokio::fs::rename(&self.path, &target)
            .await
            .with_context(|| format!("moving corrupt store to {}", target.display()))?;
        info!(path = %target.display(), "corrupt store preserved");
        Ok(target)
    }

    /// `<path>.<suffix>` in the same directory, so a rename stays on one filesystem.
    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }
}

/// Writes `body` to a fresh temp file beside `path`, syncs it, then renames it over `path`.
/// The temp file is deleted on drop if any step before the rename fails.
fn replace_file(path: &Path, body: &[u8]) -> anyhow::Result<()> {
    let prefix = match path.file_name() {
        Some(name) => format!("{}.", name.to_string_lossy()),
        None => ".store.".to_string(),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(parent_dir(path))
        .with_context(|| format!("creating temp file for {}", path.display()))?;
    tmp.write_all(body)
        .with_context(|| format!("writing {}", tmp.path().display()))?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Drops snapshots with `timestamp <= cutoff`; returns how many were dropped.
pub fn prune(series: &mut Vec<PodSnapshot>, cutoff: NaiveDateTime) -> usize {
    let before = series.len();
    series.retain(|s| s.timestamp > cutoff);
    before - series.len()
}
