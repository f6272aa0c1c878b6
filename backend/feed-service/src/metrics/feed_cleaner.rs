//! Background job metrics
//!
//! Prometheus metrics for the feed index cleaner and the cache warmer

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};
use std::time::Duration;

static CLEANUP_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_cleaner_runs_total",
        "Total feed cleanup cycles (success/error)",
        &["status"]
    )
    .expect("Failed to register feed cleaner runs metric")
});

static JOB_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "feed_job_duration_seconds",
        "Duration of feed background job cycles",
        &["job"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("Failed to register feed job duration metric")
});

static ENTRIES_DELETED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_cleaner_entries_deleted_total",
        "Total feed index entries removed",
        &["reason"]
    )
    .expect("Failed to register feed cleaner entries deleted metric")
});

static WARMER_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_cache_warmer_runs_total",
        "Total cache warm cycles (success/error)",
        &["status"]
    )
    .expect("Failed to register cache warmer runs metric")
});

static WARMER_USERS_REFRESHED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "feed_cache_warmer_users_refreshed",
        "Number of feeds refreshed in the last warm cycle"
    )
    .expect("Failed to register cache warmer users metric")
});

/// Record cleanup run result (success/error)
pub fn record_cleanup_run(status: &str) {
    CLEANUP_RUNS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_job_duration(job: &str, duration: Duration) {
    JOB_DURATION_SECONDS
        .with_label_values(&[job])
        .observe(duration.as_secs_f64());
}

/// Record entries removed by retention cleanup or post removal
pub fn record_entries_deleted(reason: &str, count: u64) {
    ENTRIES_DELETED_TOTAL
        .with_label_values(&[reason])
        .inc_by(count);
}

pub fn record_warmer_run(status: &str) {
    WARMER_RUNS_TOTAL.with_label_values(&[status]).inc();
}

pub fn set_users_refreshed(count: i64) {
    WARMER_USERS_REFRESHED.set(count);
}
