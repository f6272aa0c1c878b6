//! Fan-out on write.
//!
//! A new post is materialized into every follower's feed index with one
//! bulk insert; the followers' cached feeds are then invalidated in the
//! background with bounded concurrency.

use crate::cache::FeedCache;
use crate::db::{FeedIndexStore, FollowGraph};
use crate::error::Result;
use crate::metrics::{feed as feed_metrics, feed_cleaner as job_metrics};
use crate::models::{FanOutSummary, FeedIndexEntry, RemovalSummary};
use crate::services::background::BackgroundTasks;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct FanOutWriter {
    follows: Arc<dyn FollowGraph>,
    index: Arc<dyn FeedIndexStore>,
    cache: Arc<dyn FeedCache>,
    tasks: BackgroundTasks,
    invalidation_concurrency: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationSummary {
    pub succeeded: u64,
    pub failed: u64,
}

impl FanOutWriter {
    pub fn new(
        follows: Arc<dyn FollowGraph>,
        index: Arc<dyn FeedIndexStore>,
        cache: Arc<dyn FeedCache>,
        tasks: BackgroundTasks,
        invalidation_concurrency: usize,
    ) -> Self {
        Self {
            follows,
            index,
            cache,
            tasks,
            invalidation_concurrency: invalidation_concurrency.max(1),
        }
    }

    /// Deliver `post_id` to every follower of `author_id`.
    ///
    /// Returns once the feed index write has committed; cache invalidation
    /// continues in the background. Re-delivering a post is a no-op for
    /// followers that already have it.
    pub async fn fan_out_post(&self, post_id: Uuid, author_id: Uuid) -> Result<FanOutSummary> {
        let mut followers = match self.follows.get_follower_ids(author_id).await {
            Ok(followers) => followers,
            Err(e) => {
                warn!(post_id = %post_id, author_id = %author_id, error = %e, "Failed to load followers for fan-out");
                feed_metrics::record_fanout("error", 0);
                return Err(e);
            }
        };
        followers.sort_unstable();
        followers.dedup();

        if followers.is_empty() {
            debug!(post_id = %post_id, author_id = %author_id, "Author has no followers; nothing to fan out");
            feed_metrics::record_fanout("success", 0);
            return Ok(FanOutSummary::default());
        }

        let delivered_at = Utc::now();
        let entries: Vec<FeedIndexEntry> = followers
            .iter()
            .map(|follower| FeedIndexEntry::new(*follower, post_id, delivered_at))
            .collect();

        let inserted = match self.index.bulk_insert(&entries).await {
            Ok(inserted) => inserted,
            Err(e) => {
                warn!(post_id = %post_id, followers = followers.len(), error = %e, "Feed index bulk insert failed");
                feed_metrics::record_fanout("error", 0);
                return Err(e);
            }
        };
        feed_metrics::record_fanout("success", inserted);

        info!(
            post_id = %post_id,
            author_id = %author_id,
            followers = followers.len(),
            inserted,
            "Fanned out post"
        );

        let summary = FanOutSummary {
            followers: followers.len(),
            inserted,
        };
        self.schedule_invalidation("fanout_invalidation", followers);
        Ok(summary)
    }

    /// Remove a deleted post from every feed index and invalidate the
    /// affected users' cached feeds.
    pub async fn remove_post_from_feeds(&self, post_id: Uuid) -> Result<RemovalSummary> {
        let mut users = self.index.remove_post(post_id).await?;
        users.sort_unstable();
        users.dedup();

        job_metrics::record_entries_deleted("post_removed", users.len() as u64);
        info!(post_id = %post_id, feeds = users.len(), "Removed post from feeds");

        let summary = RemovalSummary {
            feeds_affected: users.len(),
        };
        if !users.is_empty() {
            self.schedule_invalidation("removal_invalidation", users);
        }
        Ok(summary)
    }

    fn schedule_invalidation(&self, name: &'static str, user_ids: Vec<Uuid>) {
        let cache = Arc::clone(&self.cache);
        let concurrency = self.invalidation_concurrency;
        self.tasks.spawn(name, async move {
            invalidate_feeds(cache, user_ids, concurrency).await;
        });
    }
}

/// Invalidate each user's cached feed with at most `concurrency` requests
/// in flight. Failures are logged and counted; they never abort the batch.
pub async fn invalidate_feeds(
    cache: Arc<dyn FeedCache>,
    user_ids: Vec<Uuid>,
    concurrency: usize,
) -> InvalidationSummary {
    let total = user_ids.len();
    let succeeded = AtomicU64::new(0);
    let failed = AtomicU64::new(0);

    stream::iter(user_ids)
        .for_each_concurrent(concurrency.max(1), |user_id| {
            let cache = Arc::clone(&cache);
            let succeeded = &succeeded;
            let failed = &failed;
            async move {
                match cache.invalidate_user_feed(user_id).await {
                    Ok(()) => {
                        succeeded.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        warn!(user_id = %user_id, error = %e, "Failed to invalidate feed cache");
                    }
                }
            }
        })
        .await;

    let summary = InvalidationSummary {
        succeeded: succeeded.into_inner(),
        failed: failed.into_inner(),
    };
    feed_metrics::record_invalidations(summary.succeeded, summary.failed);
    debug!(
        total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "Feed invalidation batch finished"
    );
    summary
}
