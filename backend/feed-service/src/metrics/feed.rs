use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};
use std::time::Duration;

lazy_static! {
    /// Duration of feed reads by source (cache, store).
    pub static ref FEED_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "feed_request_duration_seconds",
        "Feed request duration segmented by data source",
        &["source"]
    )
    .expect("failed to register feed_request_duration_seconds");

    /// Total feed reads by source.
    pub static ref FEED_REQUEST_TOTAL: IntCounterVec = register_int_counter_vec!(
        "feed_request_total",
        "Total feed requests segmented by data source",
        &["source"]
    )
    .expect("failed to register feed_request_total");

    /// Feed cache events (hit/miss/error).
    pub static ref FEED_CACHE_EVENTS: IntCounterVec = register_int_counter_vec!(
        "feed_cache_events_total",
        "Feed cache events segmented by outcome",
        &["event"]
    )
    .expect("failed to register feed_cache_events_total");

    /// Redis failures by operation (read/write/invalidate).
    pub static ref FEED_CACHE_ERRORS: IntCounterVec = register_int_counter_vec!(
        "feed_cache_errors_total",
        "Feed cache errors segmented by operation",
        &["operation"]
    )
    .expect("failed to register feed_cache_errors_total");

    /// Feed cache write-back results (success/error).
    pub static ref FEED_CACHE_WRITE_TOTAL: IntCounterVec = register_int_counter_vec!(
        "feed_cache_write_total",
        "Feed cache write attempts segmented by outcome",
        &["result"]
    )
    .expect("failed to register feed_cache_write_total");

    /// Fan-out runs (success/error).
    pub static ref FEED_FANOUT_TOTAL: IntCounterVec = register_int_counter_vec!(
        "feed_fanout_total",
        "Fan-out operations segmented by outcome",
        &["result"]
    )
    .expect("failed to register feed_fanout_total");

    /// Feed index entries created by fan-out.
    pub static ref FEED_FANOUT_ENTRIES: IntCounterVec = register_int_counter_vec!(
        "feed_fanout_entries_total",
        "Feed index entries written by fan-out",
        &["result"]
    )
    .expect("failed to register feed_fanout_entries_total");

    /// Cache invalidations issued after fan-out or removal (success/error).
    pub static ref FEED_INVALIDATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "feed_invalidations_total",
        "Per-user feed cache invalidations segmented by outcome",
        &["result"]
    )
    .expect("failed to register feed_invalidations_total");

    /// Like status lookups that failed and were degraded to unknown.
    pub static ref FEED_LIKE_STATUS_FAILURES: IntCounterVec = register_int_counter_vec!(
        "feed_like_status_failures_total",
        "Like status lookups that could not be resolved",
        &["reason"]
    )
    .expect("failed to register feed_like_status_failures_total");

    /// Events consumed by type and outcome.
    pub static ref FEED_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "feed_events_total",
        "Feed events processed segmented by type and outcome",
        &["event_type", "result"]
    )
    .expect("failed to register feed_events_total");
}

pub fn record_request(source: &str, elapsed: Duration) {
    FEED_REQUEST_TOTAL.with_label_values(&[source]).inc();
    FEED_REQUEST_DURATION_SECONDS
        .with_label_values(&[source])
        .observe(elapsed.as_secs_f64());
}

pub fn record_cache_event(event: &str) {
    FEED_CACHE_EVENTS.with_label_values(&[event]).inc();
}

pub fn record_cache_error(operation: &str) {
    FEED_CACHE_ERRORS.with_label_values(&[operation]).inc();
}

pub fn record_cache_write(result: &str) {
    FEED_CACHE_WRITE_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_fanout(result: &str, inserted: u64) {
    FEED_FANOUT_TOTAL.with_label_values(&[result]).inc();
    if inserted > 0 {
        FEED_FANOUT_ENTRIES
            .with_label_values(&["inserted"])
            .inc_by(inserted);
    }
}

pub fn record_invalidations(succeeded: u64, failed: u64) {
    FEED_INVALIDATIONS_TOTAL
        .with_label_values(&["success"])
        .inc_by(succeeded);
    FEED_INVALIDATIONS_TOTAL
        .with_label_values(&["error"])
        .inc_by(failed);
}

pub fn record_like_status_failure(reason: &str) {
    FEED_LIKE_STATUS_FAILURES.with_label_values(&[reason]).inc();
}

pub fn record_event(event_type: &str, result: &str) {
    FEED_EVENTS_TOTAL
        .with_label_values(&[event_type, result])
        .inc();
}
