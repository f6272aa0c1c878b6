//! Event consumers
//!
//! `feed_events` maps post/like/comment events onto feed operations and is
//! always built. The Kafka transport needs the `kafka` feature.

pub mod feed_events;
#[cfg(feature = "kafka")]
pub mod kafka;

pub use feed_events::{Delivery, FeedEvent, FeedEventHandler, RetryPolicy};
