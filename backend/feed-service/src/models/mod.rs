use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A post as stored in the post store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub likes_count: i32,
    pub comments_count: i32,
}

/// One row of the materialized feed index: `post_id` was delivered to
/// `user_id`'s feed at `created_at`. Unique per (user_id, post_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedIndexEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub post_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl FeedIndexEntry {
    pub fn new(user_id: Uuid, post_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            post_id,
            created_at,
        }
    }
}

/// A post paired with the score it was ranked by. Never persisted.
#[derive(Debug, Clone)]
pub struct RankedPost {
    pub post: Post,
    pub score: f64,
}

/// A post as shown to a particular viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPost {
    #[serde(flatten)]
    pub post: Post,
    /// `None` when the like status could not be determined
    pub is_liked: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostEdge {
    pub cursor: String,
    pub node: FeedPost,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

/// One page of a user's feed in connection form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostConnection {
    pub edges: Vec<PostEdge>,
    pub page_info: PageInfo,
    /// Number of edges on this page
    pub total_count: i32,
}

/// Outcome of writing one post into its author's followers' feeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutSummary {
    pub followers: usize,
    /// Entries actually created; re-delivered posts are skipped
    pub inserted: u64,
}

/// Outcome of removing a post from every feed index that held it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalSummary {
    pub feeds_affected: usize,
}
