//! Feed Service Library
//!
//! Builds each user's home feed from the accounts they follow:
//! - fan-out on write into a materialized feed index
//! - cache-aside reads over a per-user Redis sorted set
//! - one ranking score shared by cached and fallback reads
//! - offset cursors for stable pagination
//! - periodic retention cleanup and cache warming

pub mod app;
pub mod cache;
pub mod config;
pub mod consumers;
pub mod db;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod pagination;
pub mod services;

pub use app::{Collaborators, FeedApp};
pub use config::Config;
pub use error::{AppError, Result};
