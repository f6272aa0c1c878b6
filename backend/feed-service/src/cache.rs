//! Redis-based feed cache
//!
//! Each user's feed is a sorted set keyed `feed:{user_id}`: members are
//! post ids, scores are post creation times in unix seconds. Every write
//! refreshes the TTL and trims the set to the newest `max_items` members.
//!
//! The cache is an accelerator only. Callers on the read path treat any
//! error as a miss.

use crate::config::FeedConfig;
use crate::error::{AppError, Result};
use crate::metrics::feed as feed_metrics;
use crate::models::Post;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

#[async_trait]
pub trait FeedCache: Send + Sync {
    /// Cached post ids for `user_id`, newest first, starting at `offset`.
    /// `None` means a miss (absent or empty set).
    async fn get_cached_feed(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Option<Vec<Uuid>>>;

    /// Add posts to the user's cached feed and refresh its TTL atomically.
    async fn cache_feed_items(&self, user_id: Uuid, posts: &[Post]) -> Result<()>;

    async fn invalidate_user_feed(&self, user_id: Uuid) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

pub fn feed_key(user_id: Uuid) -> String {
    format!("feed:{}", user_id)
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub max_items: usize,
}

impl From<&FeedConfig> for CacheSettings {
    fn from(config: &FeedConfig) -> Self {
        Self {
            ttl_secs: config.cache_ttl_secs,
            max_items: config.cache_max_items,
        }
    }
}

/// Feed cache layer using Redis sorted sets
#[derive(Clone)]
pub struct RedisFeedCache {
    client: Arc<ConnectionManager>,
    settings: CacheSettings,
}

impl RedisFeedCache {
    pub async fn new(redis_url: &str, settings: CacheSettings) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::Cache(format!("Failed to create Redis client: {}", e)))?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Cache(format!("Failed to create Redis connection: {}", e)))?;

        Ok(Self::from_manager(manager, settings))
    }

    pub fn from_manager(manager: ConnectionManager, settings: CacheSettings) -> Self {
        Self {
            client: Arc::new(manager),
            settings,
        }
    }

    fn conn(&self) -> ConnectionManager {
        self.client.as_ref().clone()
    }
}

#[async_trait]
impl FeedCache for RedisFeedCache {
    async fn get_cached_feed(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Option<Vec<Uuid>>> {
        if limit == 0 {
            return Ok(None);
        }

        let key = feed_key(user_id);
        let start = offset as isize;
        let stop = (offset + limit - 1) as isize;

        let members: Vec<String> = redis::cmd("ZREVRANGE")
            .arg(&key)
            .arg(start)
            .arg(stop)
            .query_async(&mut self.conn())
            .await
            .map_err(|e| {
                warn!("Redis ZREVRANGE failed for {}: {}", key, e);
                feed_metrics::record_cache_error("read");
                AppError::from(e)
            })?;

        if members.is_empty() {
            debug!("Cache miss for {}", key);
            return Ok(None);
        }

        let ids: Vec<Uuid> = members
            .iter()
            .filter_map(|member| match Uuid::parse_str(member) {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(key = %key, member = %member, "Skipping malformed feed cache member");
                    None
                }
            })
            .collect();

        debug!("Cache hit for {} ({} ids)", key, ids.len());
        Ok(Some(ids))
    }

    async fn cache_feed_items(&self, user_id: Uuid, posts: &[Post]) -> Result<()> {
        if posts.is_empty() {
            return Ok(());
        }

        let key = feed_key(user_id);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for post in posts {
            pipe.cmd("ZADD")
                .arg(&key)
                .arg(post.created_at.timestamp())
                .arg(post.id.to_string())
                .ignore();
        }
        // Keep only the newest `max_items` members
        pipe.cmd("ZREMRANGEBYRANK")
            .arg(&key)
            .arg(0)
            .arg(-(self.settings.max_items as i64) - 1)
            .ignore();
        pipe.cmd("EXPIRE")
            .arg(&key)
            .arg(self.settings.ttl_secs)
            .ignore();

        pipe.query_async::<_, ()>(&mut self.conn())
            .await
            .map_err(|e| {
                warn!("Redis feed write failed for {}: {}", key, e);
                feed_metrics::record_cache_error("write");
                AppError::from(e)
            })?;

        debug!("Cached {} feed items under {}", posts.len(), key);
        Ok(())
    }

    async fn invalidate_user_feed(&self, user_id: Uuid) -> Result<()> {
        let key = feed_key(user_id);

        redis::cmd("DEL")
            .arg(&key)
            .query_async::<_, i64>(&mut self.conn())
            .await
            .map_err(|e| {
                warn!("Redis DEL failed for {}: {}", key, e);
                feed_metrics::record_cache_error("invalidate");
                AppError::from(e)
            })?;

        debug!("Invalidated {}", key);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.conn())
            .await
            .map_err(|e| {
                warn!("Redis PING failed: {}", e);
                AppError::Cache(format!("Redis health check failed: {}", e))
            })?;
        Ok(())
    }
}
