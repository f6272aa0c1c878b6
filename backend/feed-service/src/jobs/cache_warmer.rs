//! Cache Warmer Background Job
//!
//! Rebuilds the cached feeds of recently active users so their next read
//! is a cache hit. A user counts as active when their feed index received
//! entries within the activity window.

use crate::config::WarmerConfig;
use crate::db::FeedIndexStore;
use crate::error::Result;
use crate::metrics::feed_cleaner as metrics;
use crate::services::FeedBuilder;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Initial delay to let the service finish starting
const STARTUP_DELAY: Duration = Duration::from_secs(30);

/// Refresh the cached feed of every active user, at most
/// `max_users_per_cycle` per run. Returns how many feeds were refreshed;
/// individual failures are logged and skipped.
pub async fn refresh_active_user_feeds(
    index: &dyn FeedIndexStore,
    builder: &FeedBuilder,
    config: &WarmerConfig,
    now: DateTime<Utc>,
) -> Result<usize> {
    let since = now - ChronoDuration::hours(config.activity_window_hours);
    let users = index.active_users(since, config.max_users_per_cycle).await?;

    if users.is_empty() {
        tracing::debug!("No active users to warm");
        return Ok(0);
    }

    let refreshed: Vec<bool> = stream::iter(users)
        .map(|user_id| async move {
            match builder.refresh_user_feed(user_id).await {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Failed to warm feed");
                    false
                }
            }
        })
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    let warmed = refreshed.iter().filter(|ok| **ok).count();
    tracing::info!(
        candidates = refreshed.len(),
        warmed,
        "Cache warm cycle finished"
    );
    Ok(warmed)
}

/// Start the cache warmer background job
pub async fn start_cache_warmer(
    index: Arc<dyn FeedIndexStore>,
    builder: Arc<FeedBuilder>,
    config: WarmerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    if !config.enabled {
        tracing::info!("Cache warmer disabled by configuration");
        return;
    }

    let interval = Duration::from_secs(config.interval_secs.max(1));
    tracing::info!(
        interval_secs = interval.as_secs(),
        max_users = config.max_users_per_cycle,
        activity_window_hours = config.activity_window_hours,
        "Starting cache warmer background job"
    );

    let mut delay = STARTUP_DELAY;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                tracing::info!("Cache warmer stopping");
                return;
            }
        }
        delay = interval;

        let cycle_start = Instant::now();
        match refresh_active_user_feeds(index.as_ref(), builder.as_ref(), &config, Utc::now()).await
        {
            Ok(warmed) => {
                metrics::record_warmer_run("success");
                metrics::set_users_refreshed(warmed as i64);
                metrics::record_job_duration("cache_warmer", cycle_start.elapsed());
            }
            Err(e) => {
                metrics::record_warmer_run("error");
                metrics::record_job_duration("cache_warmer", cycle_start.elapsed());
                tracing::error!(error = %e, "Cache warm cycle failed");
            }
        }
    }
}
