//! Periodic background jobs

pub mod cache_warmer;
pub mod feed_cleaner;

pub use cache_warmer::{refresh_active_user_feeds, start_cache_warmer};
pub use feed_cleaner::{cleanup_old_feed_items, start_feed_cleaner};
