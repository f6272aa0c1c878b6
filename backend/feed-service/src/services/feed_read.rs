//! Cache-aside feed reads.
//!
//! A user's ranked feed window (up to `cache_max_items` posts) lives in the
//! feed cache. A read that the cached window can satisfy is served from it
//! after hydrating and re-ranking; anything else is built from the post
//! store and the top of the build is written back in the background.
//! Both paths produce the same order, so cursors issued by one path resume
//! correctly on the other.

use crate::cache::FeedCache;
use crate::config::FeedConfig;
use crate::db::{LikeStatusReader, PostStore};
use crate::error::{AppError, Result};
use crate::metrics::feed as feed_metrics;
use crate::models::{FeedPost, Post, PostConnection};
use crate::pagination;
use crate::services::background::BackgroundTasks;
use crate::services::feed_builder::FeedBuilder;
use crate::services::ranking;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Deepest position a cursor may resume from.
pub const MAX_FEED_DEPTH: usize = 10_000;

/// What the cache had to offer for one read.
enum CacheLookup {
    /// The cached window covers the read; posts are hydrated and ranked
    Served(Vec<Post>),
    /// Nothing usable cached; a build should be written back
    Miss,
    /// The cached window references posts that no longer exist or have
    /// aged out of the feed window
    Stale,
    /// The cache holds the full top window but the read goes deeper
    BeyondWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteBack {
    /// Add the build to whatever is cached
    Merge,
    /// Clear the cached set first
    Replace,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedSource {
    Cache,
    Store,
}

impl FeedSource {
    fn as_str(self) -> &'static str {
        match self {
            FeedSource::Cache => "cache",
            FeedSource::Store => "store",
        }
    }
}

pub struct FeedReader {
    cache: Arc<dyn FeedCache>,
    posts: Arc<dyn PostStore>,
    likes: Arc<dyn LikeStatusReader>,
    builder: Arc<FeedBuilder>,
    tasks: BackgroundTasks,
    config: FeedConfig,
}

impl FeedReader {
    pub fn new(
        cache: Arc<dyn FeedCache>,
        posts: Arc<dyn PostStore>,
        likes: Arc<dyn LikeStatusReader>,
        builder: Arc<FeedBuilder>,
        tasks: BackgroundTasks,
        config: FeedConfig,
    ) -> Self {
        Self {
            cache,
            posts,
            likes,
            builder,
            tasks,
            config,
        }
    }

    /// One page of `user_id`'s ranked feed.
    ///
    /// `first` is clamped to the configured page bounds. `after` is a cursor
    /// from a previous page; the page starts right after that edge.
    pub async fn get_feed(
        &self,
        user_id: Uuid,
        first: Option<i64>,
        after: Option<&str>,
    ) -> Result<PostConnection> {
        let started = Instant::now();
        let limit = self.config.clamp_page_size(first);
        let offset = pagination::resume_offset(after)?;
        if offset > MAX_FEED_DEPTH {
            return Err(AppError::InvalidCursor(
                "Cursor is beyond the end of the feed".to_string(),
            ));
        }

        // One extra post tells us whether another page exists
        let wanted = offset + limit + 1;

        let (window, source) = match self.lookup_cached_window(user_id, wanted).await? {
            CacheLookup::Served(window) => (window, FeedSource::Cache),
            CacheLookup::Miss => (
                self.build_window(user_id, wanted, WriteBack::Merge).await?,
                FeedSource::Store,
            ),
            CacheLookup::Stale => (
                self.build_window(user_id, wanted, WriteBack::Replace).await?,
                FeedSource::Store,
            ),
            CacheLookup::BeyondWindow => (
                self.build_window(user_id, wanted, WriteBack::Skip).await?,
                FeedSource::Store,
            ),
        };

        let mut page: Vec<Post> = window.into_iter().skip(offset).take(limit + 1).collect();
        let has_next_page = page.len() > limit;
        page.truncate(limit);

        let like_status = self.resolve_like_status(user_id, &page).await;
        let nodes: Vec<FeedPost> = page
            .into_iter()
            .map(|post| {
                let is_liked = like_status
                    .as_ref()
                    .map(|status| status.get(&post.id).copied().unwrap_or(false));
                FeedPost { post, is_liked }
            })
            .collect();

        feed_metrics::record_request(source.as_str(), started.elapsed());
        debug!(
            user_id = %user_id,
            source = source.as_str(),
            offset,
            returned = nodes.len(),
            has_next_page,
            "Served feed page"
        );

        Ok(pagination::build_connection(nodes, offset, has_next_page))
    }

    /// Cache failures are treated as a miss.
    async fn lookup_cached_window(&self, user_id: Uuid, wanted: usize) -> Result<CacheLookup> {
        let cap = self.config.cache_max_items;
        let ids = match self.cache.get_cached_feed(user_id, cap, 0).await {
            Ok(Some(ids)) if !ids.is_empty() => ids,
            Ok(_) => {
                feed_metrics::record_cache_event("miss");
                return Ok(CacheLookup::Miss);
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Feed cache read failed; building from store");
                feed_metrics::record_cache_event("error");
                return Ok(CacheLookup::Miss);
            }
        };

        // A full cache only holds the top of the feed
        let window_complete = ids.len() < cap;
        if !window_complete && wanted > ids.len() {
            feed_metrics::record_cache_event("beyond_window");
            return Ok(CacheLookup::BeyondWindow);
        }

        let now = Utc::now();
        let since = now - Duration::days(self.config.window_days);
        let posts = self.posts.get_posts_by_ids(&ids).await?;
        let expired = posts.iter().filter(|p| p.created_at <= since).count();
        if posts.len() < ids.len() || expired > 0 {
            feed_metrics::record_cache_event("stale");
            debug!(
                user_id = %user_id,
                cached = ids.len(),
                found = posts.len(),
                expired,
                "Cached feed no longer matches the store; rebuilding"
            );
            return Ok(CacheLookup::Stale);
        }

        feed_metrics::record_cache_event("hit");
        let ranked = ranking::rank_posts(posts, now);
        Ok(CacheLookup::Served(ranked.into_iter().map(|r| r.post).collect()))
    }

    /// Build from the store, sized to cover both the read and the cache
    /// window, and hand the top of the feed to the cache in the background.
    async fn build_window(
        &self,
        user_id: Uuid,
        wanted: usize,
        write_back: WriteBack,
    ) -> Result<Vec<Post>> {
        let cap = self.config.cache_max_items;
        let posts = self
            .builder
            .build_feed_for_user(user_id, wanted.max(cap))
            .await?;

        if write_back != WriteBack::Skip && !posts.is_empty() {
            let top: Vec<Post> = posts.iter().take(cap).cloned().collect();
            self.schedule_write_back(user_id, top, write_back == WriteBack::Replace);
        }

        Ok(posts)
    }

    fn schedule_write_back(&self, user_id: Uuid, posts: Vec<Post>, replace: bool) {
        let cache = Arc::clone(&self.cache);
        self.tasks.spawn("feed_write_back", async move {
            if replace {
                if let Err(e) = cache.invalidate_user_feed(user_id).await {
                    feed_metrics::record_cache_write("error");
                    warn!(user_id = %user_id, error = %e, "Failed to clear stale feed cache");
                    return;
                }
            }
            match cache.cache_feed_items(user_id, &posts).await {
                Ok(()) => feed_metrics::record_cache_write("success"),
                Err(e) => {
                    feed_metrics::record_cache_write("error");
                    warn!(user_id = %user_id, error = %e, "Feed cache write-back failed");
                }
            }
        });
    }

    /// Like status for the page. `None` when it cannot be determined; the
    /// page is still served.
    async fn resolve_like_status(&self, user_id: Uuid, page: &[Post]) -> Option<HashMap<Uuid, bool>> {
        if page.is_empty() {
            return Some(HashMap::new());
        }

        let ids: Vec<Uuid> = page.iter().map(|p| p.id).collect();
        match self.likes.get_like_status(user_id, &ids).await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Like status lookup failed; serving feed without it");
                feed_metrics::record_like_status_failure("lookup_failed");
                None
            }
        }
    }
}
