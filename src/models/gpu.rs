// GPU readings and pod snapshots (persisted store format)

use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

/// Timestamp layout used in the store and in every JSON view.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Local wall-clock time at the store's one-second resolution.
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

/// Serde adapter for `NaiveDateTime` as `"YYYY-MM-DD HH:MM:SS"`.
pub mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Option<NaiveDateTime>`; `None` is `null`.
pub mod option_timestamp_format {
    use chrono::NaiveDateTime;
    use serde::Serializer;

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(ts: &Option<NaiveDateTime>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string()),
            None => s.serialize_none(),
        }
    }
}

/// One GPU as reported by a single probe. Field names on disk are the raw query names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuReading {
    pub gpu_name: String,
    #[serde(rename = "memory_used")]
    pub memory_used_mb: u64,
    #[serde(rename = "memory_free")]
    pub memory_free_mb: u64,
    #[serde(rename = "memory_total")]
    pub memory_total_mb: u64,
    #[serde(rename = "gpu_util")]
    pub gpu_util_pct: u32,
    #[serde(rename = "memory_util")]
    pub memory_util_pct: u32,
}

impl GpuReading {
    /// Used memory as a percentage of total; total is authoritative.
    pub fn mem_used_pct(&self) -> f64 {
        if self.memory_total_mb == 0 {
            return 0.0;
        }
        self.memory_used_mb as f64 / self.memory_total_mb as f64 * 100.0
    }
}

/// All GPU readings of one pod at one collection instant. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSnapshot {
    pub pod_name: String,
    pub username: String,
    pub pod_id: String,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    #[serde(rename = "gpu_usage", default)]
    pub gpu_readings: Vec<GpuReading>,
}

/// A running, GPU-bearing pod as returned by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuPod {
    pub pod_name: String,
    pub username: String,
    pub pod_id: String,
}
