use crate::error::Result;
use crate::models::FeedIndexEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// The materialized feed index written by fan-out.
#[async_trait]
pub trait FeedIndexStore: Send + Sync {
    /// Insert entries in one statement. Entries whose (user_id, post_id)
    /// already exists are skipped. Returns the number actually inserted.
    async fn bulk_insert(&self, entries: &[FeedIndexEntry]) -> Result<u64>;

    /// Delete entries created at or before `cutoff`. Returns the number removed.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Delete every entry for `post_id`, returning the users whose feeds held it.
    async fn remove_post(&self, post_id: Uuid) -> Result<Vec<Uuid>>;

    /// Users whose index received entries after `since`, at most `limit`.
    async fn active_users(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<Uuid>>;
}

#[derive(Clone)]
pub struct PgFeedIndexStore {
    pool: PgPool,
}

impl PgFeedIndexStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedIndexStore for PgFeedIndexStore {
    async fn bulk_insert(&self, entries: &[FeedIndexEntry]) -> Result<u64> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut ids = Vec::with_capacity(entries.len());
        let mut user_ids = Vec::with_capacity(entries.len());
        let mut post_ids = Vec::with_capacity(entries.len());
        let mut created = Vec::with_capacity(entries.len());
        for entry in entries {
            ids.push(entry.id);
            user_ids.push(entry.user_id);
            post_ids.push(entry.post_id);
            created.push(entry.created_at);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO feed_service_cache (id, user_id, post_id, created_at)
            SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::uuid[], $4::timestamptz[])
            ON CONFLICT (user_id, post_id) DO NOTHING
            "#,
        )
        .bind(&ids)
        .bind(&user_ids)
        .bind(&post_ids)
        .bind(&created)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM feed_service_cache WHERE created_at <= $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn remove_post(&self, post_id: Uuid) -> Result<Vec<Uuid>> {
        let users = sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM feed_service_cache WHERE post_id = $1 RETURNING user_id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn active_users(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<Uuid>> {
        let users = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT user_id
            FROM feed_service_cache
            WHERE created_at > $1
            GROUP BY user_id
            ORDER BY MAX(created_at) DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }
}
