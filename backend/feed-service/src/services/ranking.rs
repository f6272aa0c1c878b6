//! Feed ranking
//!
//! Every feed is ordered by one score, computed in-process for cached feeds
//! and in SQL for fallback builds:
//!
//! ```text
//! score = 0.5 * exp(-age_secs / 86400)
//!       + 0.3 * ln(1 + likes)
//!       + 0.2 * ln(1 + comments)
//! ```
//!
//! Ties are broken by newer `created_at`, then by larger post id, so the
//! order is total and both paths agree on it.

use crate::models::{Post, RankedPost};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use tracing::debug;

pub const RECENCY_WEIGHT: f64 = 0.5;
pub const LIKES_WEIGHT: f64 = 0.3;
pub const COMMENTS_WEIGHT: f64 = 0.2;
/// Recency decays by a factor of e per day
pub const RECENCY_DECAY_SECS: f64 = 86_400.0;

/// Score a post relative to `now`. Future timestamps and negative counters
/// are clamped to zero.
pub fn score_post(post: &Post, now: DateTime<Utc>) -> f64 {
    let age_secs = (now - post.created_at).num_milliseconds().max(0) as f64 / 1000.0;
    let likes = post.likes_count.max(0) as f64;
    let comments = post.comments_count.max(0) as f64;

    RECENCY_WEIGHT * (-age_secs / RECENCY_DECAY_SECS).exp()
        + LIKES_WEIGHT * likes.ln_1p()
        + COMMENTS_WEIGHT * comments.ln_1p()
}

/// Total order used by every feed: score desc, created_at desc, id desc.
pub fn compare_ranked(a: &RankedPost, b: &RankedPost) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.post.created_at.cmp(&a.post.created_at))
        .then_with(|| b.post.id.cmp(&a.post.id))
}

/// Score and sort posts, highest first.
pub fn rank_posts(posts: Vec<Post>, now: DateTime<Utc>) -> Vec<RankedPost> {
    let mut ranked: Vec<RankedPost> = posts
        .into_iter()
        .map(|post| {
            let score = score_post(&post, now);
            RankedPost { post, score }
        })
        .collect();

    ranked.sort_by(compare_ranked);

    debug!("Ranked {} posts", ranked.len());
    ranked
}

/// The same score as a SQL expression over `feed_service_posts` columns.
/// `now_param` is the placeholder bound to the ranking instant.
pub fn score_sql(now_param: &str) -> String {
    format!(
        "({rw} * EXP(-GREATEST(EXTRACT(EPOCH FROM ({now}::timestamptz - created_at))::float8, 0) / {decay}) \
         + {lw} * LN(1 + GREATEST(likes_count, 0)::float8) \
         + {cw} * LN(1 + GREATEST(comments_count, 0)::float8))",
        rw = RECENCY_WEIGHT,
        lw = LIKES_WEIGHT,
        cw = COMMENTS_WEIGHT,
        decay = RECENCY_DECAY_SECS,
        now = now_param,
    )
}
