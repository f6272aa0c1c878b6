//! Feed event routing
//!
//! Maps incoming post/like/comment events onto feed operations. The
//! transport (Kafka, HTTP) only supplies an event type and a JSON payload.
//!
//! [`FeedEventHandler::deliver`] decides whether a transport may acknowledge
//! an event: applied and malformed events are acknowledged, events that hit
//! an unavailable dependency are retried with backoff until they apply or the
//! service shuts down.

use crate::db::{EngagementCounters, PostStore};
use crate::error::Result;
use crate::metrics::feed as feed_metrics;
use crate::services::FanOutWriter;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Payload of `post.created`
#[derive(Debug, Clone, Deserialize)]
pub struct PostCreatedEvent {
    pub post_id: Uuid,
    /// Author
    pub user_id: Uuid,
    #[serde(default)]
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Payload of `post.deleted`
#[derive(Debug, Clone, Deserialize)]
pub struct PostDeletedEvent {
    pub post_id: Uuid,
}

/// Payload of like/comment events
#[derive(Debug, Clone, Deserialize)]
pub struct EngagementEvent {
    pub post_id: Uuid,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub enum FeedEvent {
    PostCreated(PostCreatedEvent),
    PostDeleted(PostDeletedEvent),
    LikeCreated(EngagementEvent),
    LikeDeleted(EngagementEvent),
    CommentCreated(EngagementEvent),
    CommentDeleted(EngagementEvent),
}

impl FeedEvent {
    /// Parse a payload by event type. Unknown types yield `Ok(None)`.
    pub fn parse(event_type: &str, payload: &[u8]) -> Result<Option<Self>> {
        let event = match event_type {
            "post.created" => FeedEvent::PostCreated(serde_json::from_slice(payload)?),
            "post.deleted" => FeedEvent::PostDeleted(serde_json::from_slice(payload)?),
            "like.created" => FeedEvent::LikeCreated(serde_json::from_slice(payload)?),
            "like.deleted" => FeedEvent::LikeDeleted(serde_json::from_slice(payload)?),
            "comment.created" => FeedEvent::CommentCreated(serde_json::from_slice(payload)?),
            "comment.deleted" => FeedEvent::CommentDeleted(serde_json::from_slice(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            FeedEvent::PostCreated(_) => "post.created",
            FeedEvent::PostDeleted(_) => "post.deleted",
            FeedEvent::LikeCreated(_) => "like.created",
            FeedEvent::LikeDeleted(_) => "like.deleted",
            FeedEvent::CommentCreated(_) => "comment.created",
            FeedEvent::CommentDeleted(_) => "comment.deleted",
        }
    }
}

/// How an event left [`FeedEventHandler::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Applied; acknowledge it
    Applied,
    /// Can never apply (malformed payload); acknowledge and move on
    Skipped,
    /// Shutdown arrived while retrying; leave it unacknowledged for redelivery
    Interrupted,
}

impl Delivery {
    pub fn should_acknowledge(self) -> bool {
        matches!(self, Delivery::Applied | Delivery::Skipped)
    }
}

/// Backoff between attempts at an event whose dependencies are failing.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

pub struct FeedEventHandler {
    posts: Arc<dyn PostStore>,
    counters: Arc<dyn EngagementCounters>,
    fanout: Arc<FanOutWriter>,
}

impl FeedEventHandler {
    pub fn new(
        posts: Arc<dyn PostStore>,
        counters: Arc<dyn EngagementCounters>,
        fanout: Arc<FanOutWriter>,
    ) -> Self {
        Self {
            posts,
            counters,
            fanout,
        }
    }

    /// Parse and apply one raw event. Unknown event types are ignored.
    pub async fn handle_raw(&self, event_type: &str, payload: &[u8]) -> Result<()> {
        match FeedEvent::parse(event_type, payload) {
            Ok(Some(event)) => self.handle(event).await,
            Ok(None) => {
                debug!("Ignoring event type: {}", event_type);
                feed_metrics::record_event("unknown", "ignored");
                Ok(())
            }
            Err(e) => {
                feed_metrics::record_event(event_type_label(event_type), "invalid");
                Err(e)
            }
        }
    }

    /// Apply one raw event, retrying while it fails for reasons other than
    /// its own content. Fan-out is idempotent, so retries are safe.
    pub async fn deliver(
        &self,
        event_type: &str,
        payload: &[u8],
        retry: &RetryPolicy,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Delivery {
        let mut backoff = retry.initial_backoff;
        let mut attempt: u32 = 1;

        loop {
            let err = match self.handle_raw(event_type, payload).await {
                Ok(()) => return Delivery::Applied,
                Err(e) => e,
            };

            if err.is_client_error() {
                warn!(event_type, error = %err, "Skipping feed event that cannot apply");
                return Delivery::Skipped;
            }
            if *shutdown.borrow() {
                return Delivery::Interrupted;
            }

            warn!(
                event_type,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Feed event failed; retrying"
            );
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown.changed() => return Delivery::Interrupted,
            }

            backoff = (backoff * 2).min(retry.max_backoff);
            attempt += 1;
        }
    }

    pub async fn handle(&self, event: FeedEvent) -> Result<()> {
        let event_type = event.event_type();
        let outcome = self.apply(event).await;

        match &outcome {
            Ok(()) => feed_metrics::record_event(event_type, "success"),
            Err(e) => {
                feed_metrics::record_event(event_type, "error");
                warn!(event_type, error = %e, "Failed to apply feed event");
            }
        }
        outcome
    }

    async fn apply(&self, event: FeedEvent) -> Result<()> {
        match event {
            FeedEvent::PostCreated(created) => {
                let created_at = created.created_at.unwrap_or_else(Utc::now);
                self.posts
                    .create_post(created.post_id, created.user_id, &created.content, created_at)
                    .await?;
                let summary = self
                    .fanout
                    .fan_out_post(created.post_id, created.user_id)
                    .await?;
                info!(
                    post_id = %created.post_id,
                    followers = summary.followers,
                    inserted = summary.inserted,
                    "Applied post.created"
                );
            }
            FeedEvent::PostDeleted(deleted) => {
                // Hide the post first so no rebuild can serve it again
                let existed = self.posts.delete_post(deleted.post_id).await?;
                let summary = self.fanout.remove_post_from_feeds(deleted.post_id).await?;
                info!(
                    post_id = %deleted.post_id,
                    existed,
                    feeds_affected = summary.feeds_affected,
                    "Applied post.deleted"
                );
            }
            FeedEvent::LikeCreated(e) => self.adjust(e.post_id, 1, Counter::Likes).await?,
            FeedEvent::LikeDeleted(e) => self.adjust(e.post_id, -1, Counter::Likes).await?,
            FeedEvent::CommentCreated(e) => self.adjust(e.post_id, 1, Counter::Comments).await?,
            FeedEvent::CommentDeleted(e) => self.adjust(e.post_id, -1, Counter::Comments).await?,
        }
        Ok(())
    }

    async fn adjust(&self, post_id: Uuid, delta: i32, counter: Counter) -> Result<()> {
        let found = match counter {
            Counter::Likes => self.counters.adjust_likes(post_id, delta).await?,
            Counter::Comments => self.counters.adjust_comments(post_id, delta).await?,
        };
        if !found {
            // Engagement on a post this service never saw; nothing to rank
            debug!(post_id = %post_id, "Counter update for unknown post");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Counter {
    Likes,
    Comments,
}

const EVENT_TYPES: [&str; 6] = [
    "post.created",
    "post.deleted",
    "like.created",
    "like.deleted",
    "comment.created",
    "comment.deleted",
];

/// Metric label for a raw event type; bounded to the known set.
fn event_type_label(event_type: &str) -> &'static str {
    EVENT_TYPES
        .iter()
        .find(|known| **known == event_type)
        .copied()
        .unwrap_or("unknown")
}
