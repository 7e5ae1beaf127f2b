// Dashboard document: every view the presentation layer draws, derived fresh from the series.

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;

use crate::aggregation::{
    average_memory_usage, flatten, group_by_user_and_gpu, idle_pods, latest_instant,
    trend_over_time, window,
};
use crate::models::{
    IdlePod, MemoryUsageAverage, PodSnapshot, TrendPoint, UsageTable, UserOrder,
    option_timestamp_format, timestamp_format,
};

pub fn last_hour() -> TimeDelta {
    TimeDelta::hours(1)
}

pub fn last_day() -> TimeDelta {
    TimeDelta::days(1)
}

/// User axis orderings for the current-usage charts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAxes {
    pub by_count: Vec<String>,
    pub by_inactive: Vec<String>,
    pub by_memory_free: Vec<String>,
}

impl UserAxes {
    pub fn of(table: &UsageTable) -> Self {
        Self {
            by_count: table.users_by(UserOrder::Count),
            by_inactive: table.users_by(UserOrder::Inactive),
            by_memory_free: table.users_by(UserOrder::MemoryFree),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    #[serde(with = "timestamp_format")]
    pub generated_at: NaiveDateTime,
    /// Most recent collection instant; None when the store is empty.
    #[serde(with = "option_timestamp_format")]
    pub latest_timestamp: Option<NaiveDateTime>,
    pub current: UsageTable,
    pub current_axes: UserAxes,
    pub last_hour: UsageTable,
    pub last_day: UsageTable,
    /// Pods with every GPU inactive at the latest instant.
    pub idle_pods: Vec<IdlePod>,
    pub average_memory_usage: Vec<MemoryUsageAverage>,
    pub trend: Vec<TrendPoint>,
}

pub fn build(series: &[PodSnapshot], now: NaiveDateTime) -> Dashboard {
    let rows = flatten(series);
    let current_rows = latest_instant(&rows);
    let current = group_by_user_and_gpu(&current_rows);

    Dashboard {
        generated_at: now,
        latest_timestamp: current_rows.first().map(|r| r.timestamp),
        current_axes: UserAxes::of(&current),
        current,
        last_hour: group_by_user_and_gpu(&window(&rows, now, last_hour())),
        last_day: group_by_user_and_gpu(&window(&rows, now, last_day())),
        idle_pods: idle_pods(&current_rows),
        average_memory_usage: average_memory_usage(&rows),
        trend: trend_over_time(&rows),
    }
}
