// Derived views: flattened readings, per-user/per-GPU aggregates, trend points.
// Recomputed from the series on every read; never persisted.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::timestamp_format;

/// One row per (snapshot, GPU). Window rollups reuse this shape with averaged values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatReading {
    pub pod_name: String,
    pub username: String,
    pub pod_id: String,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    /// Position within the pod's GPU list; only meaningful over a short span.
    pub gpu_index: usize,
    pub gpu_name: String,
    pub memory_used_mb: f64,
    pub memory_free_mb: f64,
    pub memory_total_mb: f64,
    pub gpu_util_pct: f64,
    pub memory_util_pct: f64,
    pub gpu_mem_used_pct: f64,
    pub inactive: bool,
    /// Raw rows folded into this one (1 for unwindowed rows).
    pub samples: usize,
}

/// Aggregate for one (username, gpu_name) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageAggregate {
    pub username: String,
    pub gpu_name: String,
    pub count: usize,
    pub inactive: usize,
    pub memory_free_gb: f64,
    pub mean_mem_used_pct: f64,
    pub mean_gpu_util_pct: f64,
    pub pod_names: BTreeSet<String>,
    /// Contributing pods as a display string, e.g. "p1, p2".
    pub pod_names_joined: String,
}

/// Per-username sums of the (username, gpu_name) aggregates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTotals {
    pub username: String,
    pub count_total: usize,
    pub count_total_inactive: usize,
    pub memory_free_total_gb: f64,
}

/// Category ordering for user axes; always descending, ties by username.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOrder {
    Count,
    Inactive,
    MemoryFree,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTable {
    pub rows: Vec<UsageAggregate>,
    pub totals: Vec<UserTotals>,
}

impl UsageTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn totals_for(&self, username: &str) -> Option<&UserTotals> {
        self.totals.iter().find(|t| t.username == username)
    }

    /// Usernames ordered for a chart axis.
    pub fn users_by(&self, order: UserOrder) -> Vec<String> {
        let mut totals: Vec<&UserTotals> = self.totals.iter().collect();
        totals.sort_by(|a, b| {
            let primary = match order {
                UserOrder::Count => b.count_total.cmp(&a.count_total),
                UserOrder::Inactive => b.count_total_inactive.cmp(&a.count_total_inactive),
                UserOrder::MemoryFree => b
                    .memory_free_total_gb
                    .total_cmp(&a.memory_free_total_gb),
            };
            primary.then_with(|| a.username.cmp(&b.username))
        });
        totals.into_iter().map(|t| t.username.clone()).collect()
    }
}

/// GPU and inactive-GPU counts for one user at one collection instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub username: String,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub gpu_count: usize,
    pub inactive_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsageAverage {
    pub username: String,
    pub gpu_name: String,
    pub mean_mem_used_pct: f64,
    pub samples: usize,
}

/// A pod whose every GPU is inactive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdlePod {
    pub pod_name: String,
    pub username: String,
    pub pod_id: String,
    pub gpu_count: usize,
}
