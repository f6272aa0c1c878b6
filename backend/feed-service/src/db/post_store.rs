use crate::error::Result;
use crate::models::Post;
use crate::services::ranking;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use sqlx::PgPool;
use uuid::Uuid;

/// Read/write access to posts.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create_post(
        &self,
        id: Uuid,
        author_id: Uuid,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Post>;

    /// Posts by any of `author_ids` created after `since`, ranked at `as_of`,
    /// highest first, at most `limit`.
    async fn get_posts_by_author_set(
        &self,
        author_ids: &[Uuid],
        since: DateTime<Utc>,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Post>>;

    /// Posts for the given ids. Missing and deleted ids are skipped; order
    /// is unspecified.
    async fn get_posts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Post>>;

    /// Hide a post from every read. Returns `false` when the post is unknown
    /// or already deleted.
    async fn delete_post(&self, post_id: Uuid) -> Result<bool>;
}

/// Like/comment counters on posts. Decrements never go below zero.
#[async_trait]
pub trait EngagementCounters: Send + Sync {
    async fn adjust_likes(&self, post_id: Uuid, delta: i32) -> Result<bool>;
    async fn adjust_comments(&self, post_id: Uuid, delta: i32) -> Result<bool>;
}

const POST_COLUMNS: &str =
    "id, user_id AS author_id, content, created_at, updated_at, likes_count, comments_count";

static RANKED_BY_AUTHORS_SQL: Lazy<String> = Lazy::new(|| {
    format!(
        "SELECT {columns} FROM feed_service_posts \
         WHERE user_id = ANY($1) AND created_at > $2 AND deleted_at IS NULL \
         ORDER BY {score} DESC, created_at DESC, id DESC \
         LIMIT $4",
        columns = POST_COLUMNS,
        score = ranking::score_sql("$3"),
    )
});

static POSTS_BY_IDS_SQL: Lazy<String> = Lazy::new(|| {
    format!(
        "SELECT {} FROM feed_service_posts WHERE id = ANY($1) AND deleted_at IS NULL",
        POST_COLUMNS
    )
});

static INSERT_POST_SQL: Lazy<String> = Lazy::new(|| {
    format!(
        "INSERT INTO feed_service_posts (id, user_id, content, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $4) \
         ON CONFLICT (id) DO UPDATE SET content = EXCLUDED.content \
         RETURNING {}",
        POST_COLUMNS
    )
});

#[derive(Clone)]
pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn create_post(
        &self,
        id: Uuid,
        author_id: Uuid,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Post> {
        let post = sqlx::query_as::<_, Post>(INSERT_POST_SQL.as_str())
            .bind(id)
            .bind(author_id)
            .bind(content)
            .bind(created_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(post)
    }

    async fn get_posts_by_author_set(
        &self,
        author_ids: &[Uuid],
        since: DateTime<Utc>,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        if author_ids.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let posts = sqlx::query_as::<_, Post>(RANKED_BY_AUTHORS_SQL.as_str())
            .bind(author_ids)
            .bind(since)
            .bind(as_of)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(posts)
    }

    async fn get_posts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Post>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let posts = sqlx::query_as::<_, Post>(POSTS_BY_IDS_SQL.as_str())
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(posts)
    }

    async fn delete_post(&self, post_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE feed_service_posts
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(post_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl EngagementCounters for PgPostStore {
    async fn adjust_likes(&self, post_id: Uuid, delta: i32) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE feed_service_posts
            SET likes_count = GREATEST(likes_count + $2, 0)
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .bind(delta)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn adjust_comments(&self, post_id: Uuid, delta: i32) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE feed_service_posts
            SET comments_count = GREATEST(comments_count + $2, 0)
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .bind(delta)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
