// Aggregation tests: flatten, latest instant, window rollups, user/GPU grouping, trends

mod common;

use chrono::TimeDelta;
use common::{reading, snapshot, ts};
use gpuwatch::aggregation::*;
use gpuwatch::dashboard;
use gpuwatch::models::*;

fn alice_two_gpus(gpu_names: [&str; 2]) -> Vec<PodSnapshot> {
    vec![snapshot(
        "p1",
        "alice",
        ts("2026-03-02 10:00:00"),
        vec![
            reading(gpu_names[0], 5, 1000),
            reading(gpu_names[1], 950, 1000),
        ],
    )]
}

#[test]
fn flatten_one_row_per_gpu_with_inactive_flag() {
    let rows = flatten(&alice_two_gpus(["A100", "A100"]));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].gpu_index, 0);
    assert_eq!(rows[1].gpu_index, 1);
    assert!((rows[0].gpu_mem_used_pct - 0.5).abs() < 1e-9);
    assert!((rows[1].gpu_mem_used_pct - 95.0).abs() < 1e-9);
    assert_eq!(
        rows.iter().map(|r| r.inactive).collect::<Vec<_>>(),
        vec![true, false]
    );
    assert!(rows.iter().all(|r| r.username == "alice" && r.pod_id == "p1-uid"));
    assert!(rows.iter().all(|r| r.samples == 1));
}

#[test]
fn latest_instant_returns_rows_at_max_timestamp() {
    let mut series = alice_two_gpus(["A100", "A100"]);
    series.insert(
        0,
        snapshot("p0", "bob", ts("2026-03-02 09:45:00"), vec![reading("H100", 1, 10)]),
    );
    let rows = flatten(&series);
    let current = latest_instant(&rows);
    assert_eq!(current.len(), 2);
    assert!(current.iter().all(|r| r.timestamp == ts("2026-03-02 10:00:00")));
}

#[test]
fn group_same_gpu_name_counts_both_and_one_inactive() {
    let table = group_by_user_and_gpu(&latest_instant(&flatten(&alice_two_gpus(["A100", "A100"]))));
    assert_eq!(table.rows.len(), 1);
    let row = &table.rows[0];
    assert_eq!(row.username, "alice");
    assert_eq!(row.gpu_name, "A100");
    assert_eq!(row.count, 2);
    assert_eq!(row.inactive, 1);
    assert!((row.memory_free_gb - (995.0 + 50.0) / 1024.0).abs() < 1e-9);
    assert_eq!(row.pod_names_joined, "p1");

    let totals = table.totals_for("alice").unwrap();
    assert_eq!(totals.count_total, 2);
    assert_eq!(totals.count_total_inactive, 1);
}

#[test]
fn group_different_gpu_names_gives_two_rows() {
    let table = group_by_user_and_gpu(&flatten(&alice_two_gpus(["A100", "H100"])));
    assert_eq!(table.rows.len(), 2);
    let inactive: usize = table.rows.iter().map(|r| r.inactive).sum();
    assert_eq!(inactive, 1);
    assert_eq!(table.totals.len(), 1);
    assert_eq!(table.totals[0].count_total, 2);
    assert_eq!(table.totals[0].count_total_inactive, 1);
}

#[test]
fn user_totals_equal_sum_of_partials() {
    let t = ts("2026-03-02 10:00:00");
    let series = vec![
        snapshot("p1", "alice", t, vec![reading("A100", 0, 100), reading("H100", 50, 100)]),
        snapshot("p2", "alice", t, vec![reading("A100", 90, 100)]),
        snapshot("p3", "bob", t, vec![reading("V100", 0, 100), reading("V100", 0, 100)]),
        snapshot("p4", "carol", t, vec![reading("A100", 10, 100)]),
    ];
    let table = group_by_user_and_gpu(&flatten(&series));
    for total in &table.totals {
        let partials: Vec<&UsageAggregate> = table
            .rows
            .iter()
            .filter(|r| r.username == total.username)
            .collect();
        assert_eq!(total.count_total, partials.iter().map(|r| r.count).sum::<usize>());
        assert_eq!(
            total.count_total_inactive,
            partials.iter().map(|r| r.inactive).sum::<usize>()
        );
        let free: f64 = partials.iter().map(|r| r.memory_free_gb).sum();
        assert!((total.memory_free_total_gb - free).abs() < 1e-9);
    }

    let alice_a100 = table
        .rows
        .iter()
        .find(|r| r.username == "alice" && r.gpu_name == "A100")
        .unwrap();
    assert_eq!(alice_a100.count, 2);
    assert_eq!(alice_a100.pod_names_joined, "p1, p2");
}

#[test]
fn users_by_orders_descending_with_name_tiebreak() {
    let t = ts("2026-03-02 10:00:00");
    let series = vec![
        snapshot("p1", "alice", t, vec![reading("A100", 50, 100)]),
        snapshot("p2", "bob", t, vec![reading("A100", 0, 100), reading("A100", 0, 100)]),
        snapshot("p3", "carol", t, vec![reading("A100", 0, 1000)]),
    ];
    let table = group_by_user_and_gpu(&flatten(&series));
    assert_eq!(table.users_by(UserOrder::Count), vec!["bob", "alice", "carol"]);
    assert_eq!(table.users_by(UserOrder::Inactive), vec!["bob", "carol", "alice"]);
    assert_eq!(table.users_by(UserOrder::MemoryFree), vec!["carol", "bob", "alice"]);
}

#[test]
fn window_collapse_is_active_if_any_sample_active() {
    let now = ts("2026-03-02 11:00:00");
    let series: Vec<PodSnapshot> = [("10:15:00", 0), ("10:30:00", 500), ("10:45:00", 2)]
        .iter()
        .map(|(time, used)| {
            snapshot(
                "p1",
                "alice",
                ts(&format!("2026-03-02 {time}")),
                vec![reading("A100", *used, 1000)],
            )
        })
        .collect();
    let rows = flatten(&series);
    assert_eq!(
        rows.iter().map(|r| r.inactive).collect::<Vec<_>>(),
        vec![true, false, true]
    );

    let windowed = window(&rows, now, TimeDelta::hours(1));
    assert_eq!(windowed.len(), 1);
    let gpu = &windowed[0];
    assert!(!gpu.inactive);
    assert_eq!(gpu.samples, 3);
    assert_eq!(gpu.timestamp, ts("2026-03-02 10:45:00"));
    assert!((gpu.memory_free_mb - (1000.0 + 500.0 + 998.0) / 3.0).abs() < 1e-9);
    assert!((gpu.gpu_mem_used_pct - (0.0 + 50.0 + 0.2) / 3.0).abs() < 1e-9);
}

#[test]
fn window_inactive_only_when_every_sample_inactive() {
    let now = ts("2026-03-02 11:00:00");
    let series = vec![
        snapshot("p1", "alice", ts("2026-03-02 10:15:00"), vec![reading("A100", 1, 1000)]),
        snapshot("p1", "alice", ts("2026-03-02 10:30:00"), vec![reading("A100", 2, 1000)]),
    ];
    let windowed = window(&flatten(&series), now, TimeDelta::hours(1));
    assert_eq!(windowed.len(), 1);
    assert!(windowed[0].inactive);

    let table = group_by_user_and_gpu(&windowed);
    assert_eq!(table.rows[0].count, 1);
    assert_eq!(table.rows[0].inactive, 1);
}

#[test]
fn window_keeps_gpus_of_multi_gpu_pods_apart() {
    let now = ts("2026-03-02 11:00:00");
    let series = vec![
        snapshot(
            "p1",
            "alice",
            ts("2026-03-02 10:15:00"),
            vec![reading("A100", 0, 1000), reading("A100", 800, 1000)],
        ),
        snapshot(
            "p1",
            "alice",
            ts("2026-03-02 10:30:00"),
            vec![reading("A100", 0, 1000), reading("A100", 900, 1000)],
        ),
    ];
    let windowed = window(&flatten(&series), now, TimeDelta::hours(1));
    assert_eq!(windowed.len(), 2);
    assert!(windowed[0].inactive);
    assert!(!windowed[1].inactive);
    assert!((windowed[1].memory_used_mb - 850.0).abs() < 1e-9);
}

#[test]
fn window_drops_rows_outside_duration() {
    let now = ts("2026-03-02 11:00:00");
    let series = vec![
        snapshot("old", "alice", ts("2026-03-01 09:00:00"), vec![reading("A100", 0, 1000)]),
        snapshot("day", "alice", ts("2026-03-02 01:00:00"), vec![reading("A100", 0, 1000)]),
        snapshot("hour", "alice", ts("2026-03-02 10:30:00"), vec![reading("A100", 0, 1000)]),
    ];
    let rows = flatten(&series);
    let hour: Vec<String> = window(&rows, now, dashboard::last_hour())
        .into_iter()
        .map(|r| r.pod_name)
        .collect();
    assert_eq!(hour, vec!["hour"]);
    let day: Vec<String> = window(&rows, now, dashboard::last_day())
        .into_iter()
        .map(|r| r.pod_name)
        .collect();
    assert_eq!(day, vec!["day", "hour"]);
}

#[test]
fn trend_counts_per_user_per_timestamp() {
    let t1 = ts("2026-03-02 10:00:00");
    let t2 = ts("2026-03-02 10:15:00");
    let series = vec![
        snapshot("p1", "alice", t1, vec![reading("A100", 0, 100), reading("A100", 50, 100)]),
        snapshot("p2", "bob", t1, vec![reading("A100", 50, 100)]),
        snapshot("p1", "alice", t2, vec![reading("A100", 0, 100), reading("A100", 0, 100)]),
    ];
    let trend = trend_over_time(&flatten(&series));
    assert_eq!(
        trend,
        vec![
            TrendPoint {
                username: "alice".into(),
                timestamp: t1,
                gpu_count: 2,
                inactive_count: 1,
            },
            TrendPoint {
                username: "bob".into(),
                timestamp: t1,
                gpu_count: 1,
                inactive_count: 0,
            },
            TrendPoint {
                username: "alice".into(),
                timestamp: t2,
                gpu_count: 2,
                inactive_count: 2,
            },
        ]
    );
}

#[test]
fn average_memory_usage_over_whole_series() {
    let series = vec![
        snapshot("p1", "alice", ts("2026-03-01 10:00:00"), vec![reading("A100", 20, 100)]),
        snapshot("p1", "alice", ts("2026-03-02 10:00:00"), vec![reading("A100", 60, 100)]),
    ];
    let avg = average_memory_usage(&flatten(&series));
    assert_eq!(avg.len(), 1);
    assert!((avg[0].mean_mem_used_pct - 40.0).abs() < 1e-9);
    assert_eq!(avg[0].samples, 2);
}

#[test]
fn empty_series_yields_empty_views() {
    let rows = flatten(&[]);
    assert!(rows.is_empty());
    assert!(latest_instant(&rows).is_empty());
    assert!(window(&rows, ts("2026-03-02 10:00:00"), TimeDelta::hours(1)).is_empty());
    let table = group_by_user_and_gpu(&rows);
    assert!(table.is_empty());
    assert!(table.totals.is_empty());
    assert!(trend_over_time(&rows).is_empty());
    assert!(average_memory_usage(&rows).is_empty());
    assert!(idle_pods(&rows).is_empty());
}

#[test]
fn dashboard_on_empty_series_is_zero_state() {
    let d = dashboard::build(&[], ts("2026-03-02 10:00:00"));
    assert!(d.latest_timestamp.is_none());
    assert!(d.current.is_empty());
    assert!(d.last_hour.is_empty());
    assert!(d.last_day.is_empty());
    assert!(d.idle_pods.is_empty());
    assert!(d.trend.is_empty());
    assert!(d.current_axes.by_count.is_empty());
}

#[test]
fn dashboard_combines_views() {
    let now = ts("2026-03-02 10:20:00");
    let series = vec![
        snapshot("p1", "alice", ts("2026-03-01 10:15:00"), vec![reading("A100", 500, 1000)]),
        snapshot("p1", "alice", ts("2026-03-02 10:15:00"), vec![reading("A100", 0, 1000)]),
        snapshot("p2", "bob", ts("2026-03-02 10:15:00"), vec![reading("H100", 700, 1000)]),
    ];
    let d = dashboard::build(&series, now);
    assert_eq!(d.latest_timestamp, Some(ts("2026-03-02 10:15:00")));
    let json = serde_json::to_value(&d).unwrap();
    assert_eq!(json["latestTimestamp"], "2026-03-02 10:15:00");
    assert_eq!(json["generatedAt"], "2026-03-02 10:20:00");
    assert_eq!(d.current.totals.len(), 2);
    assert_eq!(d.idle_pods.len(), 1);
    assert_eq!(d.idle_pods[0].pod_name, "p1");
    // Yesterday's sample is 24h05m old, outside the day window.
    assert_eq!(d.last_day.totals_for("alice").unwrap().count_total_inactive, 1);
    assert_eq!(d.trend.len(), 3);
    assert_eq!(d.current_axes.by_inactive, vec!["alice", "bob"]);
}
