//! In-memory collaborators for feed-service integration tests.
//!
//! Each fake mirrors the contract of its Postgres/Redis counterpart and
//! exposes a failure switch plus the counters the tests assert on.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use feed_service::cache::FeedCache;
use feed_service::config::FeedConfig;
use feed_service::db::{
    EngagementCounters, FeedIndexStore, FollowGraph, LikeStatusReader, PostStore,
};
use feed_service::error::{AppError, Result};
use feed_service::models::{FeedIndexEntry, Post, PostConnection};
use feed_service::services::ranking;
use feed_service::{Collaborators, FeedApp};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

fn unavailable(what: &str) -> AppError {
    AppError::Dependency(format!("{} unavailable", what))
}

// ---------------------------------------------------------------------------
// Post store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryPostStore {
    posts: Mutex<HashMap<Uuid, Post>>,
    pub fail: AtomicBool,
}

impl InMemoryPostStore {
    /// Insert a post created `age` ago with the given engagement.
    pub fn insert(&self, author_id: Uuid, age: Duration, likes: i32, comments: i32) -> Post {
        let created_at = Utc::now() - age;
        let post = Post {
            id: Uuid::new_v4(),
            author_id,
            content: format!("post by {}", author_id),
            created_at,
            updated_at: created_at,
            likes_count: likes,
            comments_count: comments,
        };
        self.posts
            .lock()
            .unwrap()
            .insert(post.id, post.clone());
        post
    }

    pub fn get(&self, id: Uuid) -> Option<Post> {
        self.posts.lock().unwrap().get(&id).cloned()
    }

    pub fn delete(&self, id: Uuid) {
        self.posts.lock().unwrap().remove(&id);
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable("post store"));
        }
        Ok(())
    }
}

#[async_trait]
impl PostStore for InMemoryPostStore {
    async fn create_post(
        &self,
        id: Uuid,
        author_id: Uuid,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Post> {
        self.check()?;
        let mut posts = self.posts.lock().unwrap();
        let post = posts.entry(id).or_insert_with(|| Post {
            id,
            author_id,
            content: content.to_string(),
            created_at,
            updated_at: created_at,
            likes_count: 0,
            comments_count: 0,
        });
        post.content = content.to_string();
        Ok(post.clone())
    }

    async fn get_posts_by_author_set(
        &self,
        author_ids: &[Uuid],
        since: DateTime<Utc>,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        self.check()?;
        let authors: HashSet<Uuid> = author_ids.iter().copied().collect();
        let candidates: Vec<Post> = self
            .posts
            .lock()
            .unwrap()
            .values()
            .filter(|p| authors.contains(&p.author_id) && p.created_at > since)
            .cloned()
            .collect();

        Ok(ranking::rank_posts(candidates, as_of)
            .into_iter()
            .take(limit)
            .map(|r| r.post)
            .collect())
    }

    async fn get_posts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Post>> {
        self.check()?;
        let posts = self.posts.lock().unwrap();
        Ok(ids.iter().filter_map(|id| posts.get(id).cloned()).collect())
    }

    async fn delete_post(&self, post_id: Uuid) -> Result<bool> {
        self.check()?;
        Ok(self.posts.lock().unwrap().remove(&post_id).is_some())
    }
}

#[async_trait]
impl EngagementCounters for InMemoryPostStore {
    async fn adjust_likes(&self, post_id: Uuid, delta: i32) -> Result<bool> {
        self.check()?;
        let mut posts = self.posts.lock().unwrap();
        Ok(match posts.get_mut(&post_id) {
            Some(post) => {
                post.likes_count = (post.likes_count + delta).max(0);
                true
            }
            None => false,
        })
    }

    async fn adjust_comments(&self, post_id: Uuid, delta: i32) -> Result<bool> {
        self.check()?;
        let mut posts = self.posts.lock().unwrap();
        Ok(match posts.get_mut(&post_id) {
            Some(post) => {
                post.comments_count = (post.comments_count + delta).max(0);
                true
            }
            None => false,
        })
    }
}

// ---------------------------------------------------------------------------
// Follow graph
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryFollowGraph {
    /// (follower, followed)
    edges: Mutex<HashSet<(Uuid, Uuid)>>,
    pub fail: AtomicBool,
}

impl InMemoryFollowGraph {
    pub fn follow(&self, follower: Uuid, followed: Uuid) {
        self.edges.lock().unwrap().insert((follower, followed));
    }

    pub fn unfollow(&self, follower: Uuid, followed: Uuid) {
        self.edges.lock().unwrap().remove(&(follower, followed));
    }
}

#[async_trait]
impl FollowGraph for InMemoryFollowGraph {
    async fn get_follower_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable("follow graph"));
        }
        Ok(self
            .edges
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, followed)| *followed == user_id)
            .map(|(follower, _)| *follower)
            .collect())
    }

    async fn get_following_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable("follow graph"));
        }
        Ok(self
            .edges
            .lock()
            .unwrap()
            .iter()
            .filter(|(follower, _)| *follower == user_id)
            .map(|(_, followed)| *followed)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Likes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryLikes {
    /// (user, post)
    liked: Mutex<HashSet<(Uuid, Uuid)>>,
    pub fail: AtomicBool,
}

impl InMemoryLikes {
    pub fn like(&self, user_id: Uuid, post_id: Uuid) {
        self.liked.lock().unwrap().insert((user_id, post_id));
    }
}

#[async_trait]
impl LikeStatusReader for InMemoryLikes {
    async fn get_like_status(
        &self,
        user_id: Uuid,
        post_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, bool>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable("likes"));
        }
        let liked = self.liked.lock().unwrap();
        Ok(post_ids
            .iter()
            .map(|post_id| (*post_id, liked.contains(&(user_id, *post_id))))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Feed index
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryFeedIndex {
    entries: Mutex<HashMap<(Uuid, Uuid), FeedIndexEntry>>,
    pub insert_calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl InMemoryFeedIndex {
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn contains(&self, user_id: Uuid, post_id: Uuid) -> bool {
        self.entries.lock().unwrap().contains_key(&(user_id, post_id))
    }

    pub fn insert_at(&self, user_id: Uuid, post_id: Uuid, created_at: DateTime<Utc>) {
        self.entries.lock().unwrap().insert(
            (user_id, post_id),
            FeedIndexEntry::new(user_id, post_id, created_at),
        );
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable("feed index"));
        }
        Ok(())
    }
}

#[async_trait]
impl FeedIndexStore for InMemoryFeedIndex {
    async fn bulk_insert(&self, entries: &[FeedIndexEntry]) -> Result<u64> {
        self.check()?;
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.entries.lock().unwrap();
        let mut inserted = 0;
        for entry in entries {
            let key = (entry.user_id, entry.post_id);
            if !stored.contains_key(&key) {
                stored.insert(key, entry.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.check()?;
        let mut stored = self.entries.lock().unwrap();
        let before = stored.len();
        stored.retain(|_, entry| entry.created_at > cutoff);
        Ok((before - stored.len()) as u64)
    }

    async fn remove_post(&self, post_id: Uuid) -> Result<Vec<Uuid>> {
        self.check()?;
        let mut stored = self.entries.lock().unwrap();
        let users: Vec<Uuid> = stored
            .keys()
            .filter(|(_, post)| *post == post_id)
            .map(|(user, _)| *user)
            .collect();
        stored.retain(|(_, post), _| *post != post_id);
        Ok(users)
    }

    async fn active_users(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<Uuid>> {
        self.check()?;
        let stored = self.entries.lock().unwrap();
        let mut latest: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        for entry in stored.values().filter(|e| e.created_at > since) {
            let slot = latest.entry(entry.user_id).or_insert(entry.created_at);
            if entry.created_at > *slot {
                *slot = entry.created_at;
            }
        }
        let mut users: Vec<(Uuid, DateTime<Utc>)> = latest.into_iter().collect();
        users.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(users.into_iter().take(limit).map(|(user, _)| user).collect())
    }
}

// ---------------------------------------------------------------------------
// Feed cache
// ---------------------------------------------------------------------------

/// Sorted-set cache with Redis semantics: members scored by creation time,
/// read newest first, trimmed to `max_items` on write.
pub struct InMemoryFeedCache {
    sets: Mutex<HashMap<Uuid, HashMap<Uuid, i64>>>,
    max_items: usize,
    pub unavailable: AtomicBool,
    pub hits: AtomicUsize,
    pub misses: AtomicUsize,
    pub writes: AtomicUsize,
    pub invalidations: AtomicUsize,
    /// Simulated latency of each invalidation, in milliseconds
    pub invalidation_delay_ms: AtomicU64,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    invalidated_users: Mutex<HashSet<Uuid>>,
}

impl InMemoryFeedCache {
    pub fn new(max_items: usize) -> Self {
        Self {
            sets: Mutex::new(HashMap::new()),
            max_items,
            unavailable: AtomicBool::new(false),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            invalidations: AtomicUsize::new(0),
            invalidation_delay_ms: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            invalidated_users: Mutex::new(HashSet::new()),
        }
    }

    pub fn cached_ids(&self, user_id: Uuid) -> Vec<Uuid> {
        let sets = self.sets.lock().unwrap();
        sets.get(&user_id).map(ordered).unwrap_or_default()
    }

    pub fn seed(&self, user_id: Uuid, members: &[(Uuid, i64)]) {
        let mut sets = self.sets.lock().unwrap();
        let set = sets.entry(user_id).or_default();
        for (member, score) in members {
            set.insert(*member, *score);
        }
    }

    pub fn was_invalidated(&self, user_id: Uuid) -> bool {
        self.invalidated_users.lock().unwrap().contains(&user_id)
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Cache("connection refused".to_string()));
        }
        Ok(())
    }
}

/// Members newest first; equal scores in reverse member order like ZREVRANGE.
fn ordered(set: &HashMap<Uuid, i64>) -> Vec<Uuid> {
    let mut members: Vec<(Uuid, i64)> = set.iter().map(|(m, s)| (*m, *s)).collect();
    members.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| b.0.to_string().cmp(&a.0.to_string()))
    });
    members.into_iter().map(|(m, _)| m).collect()
}

#[async_trait]
impl FeedCache for InMemoryFeedCache {
    async fn get_cached_feed(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Option<Vec<Uuid>>> {
        self.check()?;
        let ids: Vec<Uuid> = self
            .cached_ids(user_id)
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect();
        if ids.is_empty() {
            self.misses.fetch_add(1, Ordering::SeqCst);
            return Ok(None);
        }
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(Some(ids))
    }

    async fn cache_feed_items(&self, user_id: Uuid, posts: &[Post]) -> Result<()> {
        self.check()?;
        if posts.is_empty() {
            return Ok(());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut sets = self.sets.lock().unwrap();
        let set = sets.entry(user_id).or_default();
        for post in posts {
            set.insert(post.id, post.created_at.timestamp());
        }
        let keep: HashSet<Uuid> = ordered(set).into_iter().take(self.max_items).collect();
        set.retain(|member, _| keep.contains(member));
        Ok(())
    }

    async fn invalidate_user_feed(&self, user_id: Uuid) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.invalidation_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }

        let outcome = self.check().map(|_| {
            self.sets.lock().unwrap().remove(&user_id);
            self.invalidations.fetch_add(1, Ordering::SeqCst);
            self.invalidated_users.lock().unwrap().insert(user_id);
        });

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct TestHarness {
    pub app: FeedApp,
    pub posts: Arc<InMemoryPostStore>,
    pub follows: Arc<InMemoryFollowGraph>,
    pub likes: Arc<InMemoryLikes>,
    pub index: Arc<InMemoryFeedIndex>,
    pub cache: Arc<InMemoryFeedCache>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(FeedConfig::default())
    }

    pub fn with_config(config: FeedConfig) -> Self {
        let posts = Arc::new(InMemoryPostStore::default());
        let follows = Arc::new(InMemoryFollowGraph::default());
        let likes = Arc::new(InMemoryLikes::default());
        let index = Arc::new(InMemoryFeedIndex::default());
        let cache = Arc::new(InMemoryFeedCache::new(config.cache_max_items));

        let collaborators = Collaborators {
            posts: posts.clone(),
            counters: posts.clone(),
            follows: follows.clone(),
            likes: likes.clone(),
            index: index.clone(),
            cache: cache.clone(),
        };

        Self {
            app: FeedApp::new(collaborators, config),
            posts,
            follows,
            likes,
            index,
            cache,
        }
    }

    /// Wait for write-backs and invalidations to settle.
    pub async fn settle(&self) {
        self.app.tasks.wait_idle().await;
    }

    /// A viewer following `authors`, each with `per_author` posts spaced an
    /// hour apart and no engagement. Returns the viewer and posts newest first.
    pub fn viewer_with_posts(&self, authors: usize, per_author: usize) -> (Uuid, Vec<Post>) {
        let viewer = Uuid::new_v4();
        let mut posts = Vec::new();
        let mut age_hours = 1;
        for _ in 0..authors {
            let author = Uuid::new_v4();
            self.follows.follow(viewer, author);
            for _ in 0..per_author {
                posts.push(self.posts.insert(author, Duration::hours(age_hours), 0, 0));
                age_hours += 1;
            }
        }
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        (viewer, posts)
    }
}

pub fn ids(posts: &[Post]) -> Vec<Uuid> {
    posts.iter().map(|p| p.id).collect()
}

/// Post ids of a page, in edge order.
pub fn post_ids(conn: &PostConnection) -> Vec<Uuid> {
    conn.edges.iter().map(|edge| edge.node.post.id).collect()
}
