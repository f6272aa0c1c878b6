use crate::error::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[async_trait]
pub trait LikeStatusReader: Send + Sync {
    /// Whether `user_id` has liked each of `post_ids`. Every requested id
    /// is present in the returned map.
    async fn get_like_status(
        &self,
        user_id: Uuid,
        post_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, bool>>;
}

#[derive(Clone)]
pub struct PgLikeStatusReader {
    pool: PgPool,
}

impl PgLikeStatusReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LikeStatusReader for PgLikeStatusReader {
    async fn get_like_status(
        &self,
        user_id: Uuid,
        post_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, bool>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let liked: HashSet<Uuid> = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT post_id
            FROM feed_service_likes
            WHERE user_id = $1 AND post_id = ANY($2) AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(post_ids)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .collect();

        Ok(post_ids
            .iter()
            .map(|id| (*id, liked.contains(id)))
            .collect())
    }
}
