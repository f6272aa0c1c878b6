//! Postgres-backed collaborators.
//!
//! Each store is a trait so services can be driven by in-memory fakes in
//! tests; the `Pg*` types are the production implementations.

pub mod feed_index;
pub mod follow_graph;
pub mod likes;
pub mod post_store;

pub use feed_index::{FeedIndexStore, PgFeedIndexStore};
pub use follow_graph::{FollowGraph, PgFollowGraph};
pub use likes::{LikeStatusReader, PgLikeStatusReader};
pub use post_store::{EngagementCounters, PgPostStore, PostStore};

use crate::config::DatabaseConfig;
use anyhow::{Context, Result};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Create the connection pool and verify it with a round trip.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .test_before_acquire(true)
        .connect(&config.url)
        .await
        .context("Failed to connect to database")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("Failed to verify database connection")?;

    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database pool created"
    );

    Ok(pool)
}
