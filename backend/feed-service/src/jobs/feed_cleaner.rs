//! Feed Cleaner Background Job
//!
//! Deletes feed index entries that have aged past the retention period so
//! the index only holds what a feed can still show.

use crate::config::CleanupConfig;
use crate::db::FeedIndexStore;
use crate::error::Result;
use crate::metrics::feed_cleaner as metrics;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Delete every entry created at or before `now - retention_days`.
/// Returns the number of entries removed.
pub async fn cleanup_old_feed_items(
    index: &dyn FeedIndexStore,
    now: DateTime<Utc>,
    retention_days: i64,
) -> Result<u64> {
    let cutoff = now - ChronoDuration::days(retention_days);
    let deleted = index.delete_older_than(cutoff).await?;

    metrics::record_entries_deleted("retention", deleted);
    tracing::info!(
        deleted,
        cutoff = %cutoff,
        "Removed expired feed index entries"
    );
    Ok(deleted)
}

pub async fn start_feed_cleaner(
    index: Arc<dyn FeedIndexStore>,
    config: CleanupConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    if !config.enabled {
        tracing::info!("Feed cleaner disabled by configuration");
        return;
    }

    let check_interval = Duration::from_secs(config.interval_secs.max(1));
    tracing::info!(
        "Starting feed cleaner background job (check_interval={}s, retention_days={})",
        check_interval.as_secs(),
        config.retention_days
    );

    loop {
        // Wait for the next check interval
        tokio::select! {
            _ = tokio::time::sleep(check_interval) => {}
            _ = shutdown.changed() => {
                tracing::info!("Feed cleaner stopping");
                return;
            }
        }

        tracing::info!("Running feed cleanup cycle");
        let cycle_start = Instant::now();

        match cleanup_old_feed_items(index.as_ref(), Utc::now(), config.retention_days).await {
            Ok(_) => {
                metrics::record_cleanup_run("success");
                metrics::record_job_duration("feed_cleaner", cycle_start.elapsed());
                tracing::info!(
                    duration_ms = cycle_start.elapsed().as_millis() as u64,
                    "Feed cleanup cycle completed successfully"
                );
            }
            Err(e) => {
                // The next cycle retries
                metrics::record_cleanup_run("error");
                metrics::record_job_duration("feed_cleaner", cycle_start.elapsed());
                tracing::error!(
                    error = %e,
                    duration_ms = cycle_start.elapsed().as_millis() as u64,
                    "Feed cleanup failed"
                );
            }
        }
    }
}
