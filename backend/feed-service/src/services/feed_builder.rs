//! Fallback feed construction from the follow graph and the post store.

use crate::cache::FeedCache;
use crate::config::FeedConfig;
use crate::db::{FollowGraph, PostStore};
use crate::error::Result;
use crate::models::Post;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub struct FeedBuilder {
    follows: Arc<dyn FollowGraph>,
    posts: Arc<dyn PostStore>,
    cache: Arc<dyn FeedCache>,
    config: FeedConfig,
}

impl FeedBuilder {
    pub fn new(
        follows: Arc<dyn FollowGraph>,
        posts: Arc<dyn PostStore>,
        cache: Arc<dyn FeedCache>,
        config: FeedConfig,
    ) -> Self {
        Self {
            follows,
            posts,
            cache,
            config,
        }
    }

    /// Ranked posts from everyone `user_id` follows, limited to the feed
    /// window and to `limit` posts. Users following nobody get an empty feed.
    pub async fn build_feed_for_user(&self, user_id: Uuid, limit: usize) -> Result<Vec<Post>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let following = self.follows.get_following_ids(user_id).await?;
        if following.is_empty() {
            debug!(user_id = %user_id, "User follows nobody; feed is empty");
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let since = now - Duration::days(self.config.window_days);
        let posts = self
            .posts
            .get_posts_by_author_set(&following, since, now, limit)
            .await?;

        debug!(
            user_id = %user_id,
            following = following.len(),
            posts = posts.len(),
            "Built feed from post store"
        );
        Ok(posts)
    }

    /// Drop the user's cached feed and repopulate it with a fresh build.
    /// Cache failures are returned to the caller.
    pub async fn refresh_user_feed(&self, user_id: Uuid) -> Result<usize> {
        self.cache.invalidate_user_feed(user_id).await?;

        let posts = self
            .build_feed_for_user(user_id, self.config.cache_max_items)
            .await?;
        self.cache.cache_feed_items(user_id, &posts).await?;

        info!(user_id = %user_id, posts = posts.len(), "Refreshed user feed");
        Ok(posts.len())
    }
}
