// GPU telemetry probe: runs the nvidia-smi query inside a pod and parses its CSV output.
// A failed probe yields no readings; it never fails the collection cycle.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::cluster::{ClusterApi, ClusterError};
use crate::models::GpuReading;

pub const GPU_QUERY: &str = "nvidia-smi --query-gpu=gpu_name,memory.used,memory.free,memory.total,utilization.gpu,utilization.memory --format=csv,noheader,nounits";

const FIELD_COUNT: usize = 6;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Exec(#[from] ClusterError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedLine {
    #[error("expected 6 fields, got {0}")]
    FieldCount(usize),
    #[error("{field}: not a number: {value:?}")]
    NotANumber { field: &'static str, value: String },
    #[error("memory.total is zero")]
    ZeroTotal,
}

/// Probe with the failure kept explicit.
pub async fn try_probe<C: ClusterApi>(
    api: &C,
    namespace: &str,
    pod: &str,
    timeout: Duration,
) -> Result<Vec<GpuReading>, ProbeError> {
    let stdout = tokio::time::timeout(timeout, api.exec(namespace, pod, GPU_QUERY))
        .await
        .map_err(|_| ProbeError::Timeout(timeout))??;
    Ok(parse_gpu_query(&stdout))
}

/// Probe one pod; any failure is logged and reported as an empty reading set.
#[instrument(skip(api, timeout), fields(operation = "probe"))]
pub async fn probe<C: ClusterApi>(
    api: &C,
    namespace: &str,
    pod: &str,
    timeout: Duration,
) -> Vec<GpuReading> {
    match try_probe(api, namespace, pod, timeout).await {
        Ok(readings) => {
            debug!(gpus = readings.len(), "probe ok");
            readings
        }
        Err(e) => {
            warn!(error = %e, pod, "GPU probe failed");
            Vec::new()
        }
    }
}

/// One reading per well-formed non-empty line, in output order. Malformed lines are skipped.
pub fn parse_gpu_query(stdout: &str) -> Vec<GpuReading> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match parse_line(line) {
            Ok(reading) => Some(reading),
            Err(e) => {
                warn!(error = %e, line, "skipping malformed nvidia-smi line");
                None
            }
        })
        .collect()
}

pub fn parse_line(line: &str) -> Result<GpuReading, MalformedLine> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != FIELD_COUNT {
        return Err(MalformedLine::FieldCount(fields.len()));
    }
    let reading = GpuReading {
        gpu_name: fields[0].trim().to_string(),
        memory_used_mb: number(fields[1], "memory.used")?,
        memory_free_mb: number(fields[2], "memory.free")?,
        memory_total_mb: number(fields[3], "memory.total")?,
        gpu_util_pct: percent(fields[4], "utilization.gpu")?,
        memory_util_pct: percent(fields[5], "utilization.memory")?,
    };
    if reading.memory_total_mb == 0 {
        return Err(MalformedLine::ZeroTotal);
    }
    Ok(reading)
}

/// First whitespace-separated token, so unit suffixes ("MiB", "%") are dropped.
fn number(raw: &str, field: &'static str) -> Result<u64, MalformedLine> {
    raw.split_whitespace()
        .next()
        .and_then(|token| token.parse::<u64>().ok())
        .ok_or_else(|| MalformedLine::NotANumber {
            field,
            value: raw.trim().to_string(),
        })
}

fn percent(raw: &str, field: &'static str) -> Result<u32, MalformedLine> {
    number(raw, field).map(|n| n.min(100) as u32)
}
