// Aggregation over an in-memory series: flatten, latest instant, time windows,
// per-user/per-GPU rollups and trends. Pure functions; storage is not visible here.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{NaiveDateTime, TimeDelta};

use crate::models::{
    FlatReading, IdlePod, MemoryUsageAverage, PodSnapshot, TrendPoint, UsageAggregate, UsageTable,
    UserTotals,
};

/// A GPU is inactive when less than this share of its memory is in use.
pub const INACTIVE_THRESHOLD_PCT: f64 = 1.0;

const MIB_PER_GIB: f64 = 1024.0;

/// One row per GPU reading, carrying its snapshot's fields. GPU index is the reading's position.
pub fn flatten(series: &[PodSnapshot]) -> Vec<FlatReading> {
    series
        .iter()
        .flat_map(|snapshot| {
            snapshot
                .gpu_readings
                .iter()
                .enumerate()
                .map(move |(gpu_index, reading)| {
                    let gpu_mem_used_pct = reading.mem_used_pct();
                    FlatReading {
                        pod_name: snapshot.pod_name.clone(),
                        username: snapshot.username.clone(),
                        pod_id: snapshot.pod_id.clone(),
                        timestamp: snapshot.timestamp,
                        gpu_index,
                        gpu_name: reading.gpu_name.clone(),
                        memory_used_mb: reading.memory_used_mb as f64,
                        memory_free_mb: reading.memory_free_mb as f64,
                        memory_total_mb: reading.memory_total_mb as f64,
                        gpu_util_pct: reading.gpu_util_pct as f64,
                        memory_util_pct: reading.memory_util_pct as f64,
                        gpu_mem_used_pct,
                        inactive: gpu_mem_used_pct < INACTIVE_THRESHOLD_PCT,
                        samples: 1,
                    }
                })
        })
        .collect()
}

/// Rows at the most recent timestamp. Empty in, empty out.
pub fn latest_instant(rows: &[FlatReading]) -> Vec<FlatReading> {
    let Some(latest) = rows.iter().map(|r| r.timestamp).max() else {
        return Vec::new();
    };
    rows.iter()
        .filter(|r| r.timestamp == latest)
        .cloned()
        .collect()
}

/// Rows newer than `now - duration`, collapsed to one row per (pod, GPU index).
pub fn window(rows: &[FlatReading], now: NaiveDateTime, duration: TimeDelta) -> Vec<FlatReading> {
    let cutoff = now.checked_sub_signed(duration).unwrap_or(NaiveDateTime::MIN);
    let recent: Vec<&FlatReading> = rows.iter().filter(|r| r.timestamp > cutoff).collect();
    collapse(&recent)
}

/// Averages numeric fields per (pod_name, gpu_index); `inactive` holds only if every sample
/// was inactive. Identity fields come from the newest sample. Output keeps first-seen order.
pub fn collapse(rows: &[&FlatReading]) -> Vec<FlatReading> {
    let mut order: Vec<(&str, usize)> = Vec::new();
    let mut by_gpu: HashMap<(&str, usize), Vec<&FlatReading>> = HashMap::new();
    for r in rows {
        let key = (r.pod_name.as_str(), r.gpu_index);
        by_gpu
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(r);
    }

    order
        .into_iter()
        .filter_map(|key| by_gpu.get(&key))
        .filter_map(|samples| collapse_one(samples))
        .collect()
}

fn collapse_one(samples: &[&FlatReading]) -> Option<FlatReading> {
    let newest = samples.iter().max_by_key(|r| r.timestamp)?;
    let weights: Vec<f64> = samples.iter().map(|r| r.samples as f64).collect();
    let avg = |f: fn(&FlatReading) -> f64| weighted_mean(samples.iter().map(|r| f(r)), &weights);

    Some(FlatReading {
        pod_name: newest.pod_name.clone(),
        username: newest.username.clone(),
        pod_id: newest.pod_id.clone(),
        timestamp: newest.timestamp,
        gpu_index: newest.gpu_index,
        gpu_name: newest.gpu_name.clone(),
        memory_used_mb: avg(|r| r.memory_used_mb),
        memory_free_mb: avg(|r| r.memory_free_mb),
        memory_total_mb: avg(|r| r.memory_total_mb),
        gpu_util_pct: avg(|r| r.gpu_util_pct),
        memory_util_pct: avg(|r| r.memory_util_pct),
        gpu_mem_used_pct: avg(|r| r.gpu_mem_used_pct),
        inactive: samples.iter().all(|r| r.inactive),
        samples: samples.iter().map(|r| r.samples).sum(),
    })
}

/// Groups by (username, gpu_name) and sums the groups per username.
pub fn group_by_user_and_gpu(rows: &[FlatReading]) -> UsageTable {
    let mut groups: BTreeMap<(&str, &str), Vec<&FlatReading>> = BTreeMap::new();
    for r in rows {
        groups
            .entry((r.username.as_str(), r.gpu_name.as_str()))
            .or_default()
            .push(r);
    }

    let aggregates: Vec<UsageAggregate> = groups
        .into_iter()
        .map(|((username, gpu_name), members)| {
            let pod_names: BTreeSet<String> = members.iter().map(|r| r.pod_name.clone()).collect();
            let pod_names_joined = pod_names
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            UsageAggregate {
                username: username.to_string(),
                gpu_name: gpu_name.to_string(),
                count: members.len(),
                inactive: members.iter().filter(|r| r.inactive).count(),
                memory_free_gb: members.iter().map(|r| r.memory_free_mb).sum::<f64>()
                    / MIB_PER_GIB,
                mean_mem_used_pct: mean(members.iter().map(|r| r.gpu_mem_used_pct)),
                mean_gpu_util_pct: mean(members.iter().map(|r| r.gpu_util_pct)),
                pod_names,
                pod_names_joined,
            }
        })
        .collect();

    let totals = user_totals(&aggregates);
    UsageTable {
        rows: aggregates,
        totals,
    }
}

/// Per-username sums of the partial aggregates, ordered by username.
pub fn user_totals(aggregates: &[UsageAggregate]) -> Vec<UserTotals> {
    let mut by_user: BTreeMap<&str, UserTotals> = BTreeMap::new();
    for a in aggregates {
        let t = by_user
            .entry(a.username.as_str())
            .or_insert_with(|| UserTotals {
                username: a.username.clone(),
                count_total: 0,
                count_total_inactive: 0,
                memory_free_total_gb: 0.0,
            });
        t.count_total += a.count;
        t.count_total_inactive += a.inactive;
        t.memory_free_total_gb += a.memory_free_gb;
    }
    by_user.into_values().collect()
}

/// GPU and inactive counts per (timestamp, username) over whatever rows are given.
pub fn trend_over_time(rows: &[FlatReading]) -> Vec<TrendPoint> {
    let mut points: BTreeMap<(NaiveDateTime, &str), (usize, usize)> = BTreeMap::new();
    for r in rows {
        let (count, inactive) = points
            .entry((r.timestamp, r.username.as_str()))
            .or_default();
        *count += 1;
        if r.inactive {
            *inactive += 1;
        }
    }
    points
        .into_iter()
        .map(|((timestamp, username), (gpu_count, inactive_count))| TrendPoint {
            username: username.to_string(),
            timestamp,
            gpu_count,
            inactive_count,
        })
        .collect()
}

/// Mean memory use per (username, gpu_name) across all rows.
pub fn average_memory_usage(rows: &[FlatReading]) -> Vec<MemoryUsageAverage> {
    let mut groups: BTreeMap<(&str, &str), Vec<f64>> = BTreeMap::new();
    for r in rows {
        groups
            .entry((r.username.as_str(), r.gpu_name.as_str()))
            .or_default()
            .push(r.gpu_mem_used_pct);
    }
    groups
        .into_iter()
        .map(|((username, gpu_name), pcts)| MemoryUsageAverage {
            username: username.to_string(),
            gpu_name: gpu_name.to_string(),
            mean_mem_used_pct: mean(pcts.iter().copied()),
            samples: pcts.len(),
        })
        .collect()
}

/// Pods in `rows` whose every GPU is inactive, ordered by pod name.
pub fn idle_pods(rows: &[FlatReading]) -> Vec<IdlePod> {
    let mut pods: BTreeMap<&str, (IdlePod, bool)> = BTreeMap::new();
    let mut seen_gpus: BTreeSet<(&str, usize)> = BTreeSet::new();
    for r in rows {
        let (pod, all_inactive) = pods.entry(r.pod_name.as_str()).or_insert_with(|| {
            (
                IdlePod {
                    pod_name: r.pod_name.clone(),
                    username: r.username.clone(),
                    pod_id: r.pod_id.clone(),
                    gpu_count: 0,
                },
                true,
            )
        });
        if seen_gpus.insert((r.pod_name.as_str(), r.gpu_index)) {
            pod.gpu_count += 1;
        }
        *all_inactive &= r.inactive;
    }
    pods.into_values()
        .filter(|(_, all_inactive)| *all_inactive)
        .map(|(pod, _)| pod)
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

fn weighted_mean(values: impl Iterator<Item = f64>, weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        return 0.0;
    }
    values.zip(weights).map(|(v, w)| v * w).sum::<f64>() / total
}
