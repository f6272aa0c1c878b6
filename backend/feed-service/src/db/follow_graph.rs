use crate::error::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// Who follows whom. Soft-deleted follows are never returned.
#[async_trait]
pub trait FollowGraph: Send + Sync {
    /// Users following `user_id`
    async fn get_follower_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>>;

    /// Users `user_id` follows
    async fn get_following_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>>;
}

#[derive(Clone)]
pub struct PgFollowGraph {
    pool: PgPool,
}

impl PgFollowGraph {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FollowGraph for PgFollowGraph {
    async fn get_follower_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT follower_id
            FROM feed_service_follows
            WHERE followed_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn get_following_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT followed_id
            FROM feed_service_follows
            WHERE follower_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}
