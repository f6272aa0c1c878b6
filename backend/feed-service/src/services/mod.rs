//! Service layer for feed-service
//!
//! - ranking: score and total order shared by every feed
//! - feed_builder: fallback build from the follow graph and post store
//! - feed_read: cache-aside paginated reads
//! - fanout: fan-out on write and post removal
//! - background: detached tasks with their own deadlines

pub mod background;
pub mod fanout;
pub mod feed_builder;
pub mod feed_read;
pub mod ranking;

pub use background::BackgroundTasks;
pub use fanout::{invalidate_feeds, FanOutWriter, InvalidationSummary};
pub use feed_builder::FeedBuilder;
pub use feed_read::FeedReader;
pub use ranking::{rank_posts, score_post};
