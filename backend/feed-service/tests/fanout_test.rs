//! Integration Tests: Fan-out and Feed Events
//!
//! Coverage:
//! - One feed index entry per follower, idempotent on re-delivery
//! - Follower caches invalidated in the background with bounded concurrency
//! - Invalidation failures never fail the fan-out
//! - Post removal clears the index and affected caches
//! - Event routing for post/like/comment events
//! - Event delivery: retried on dependency failures, skipped when malformed

mod common;

use chrono::Duration;
use common::{post_ids, TestHarness};
use feed_service::consumers::{Delivery, FeedEvent, RetryPolicy};
use feed_service::error::AppError;
use std::sync::atomic::Ordering;
use std::time::Duration as StdDuration;
use tokio::sync::watch;
use uuid::Uuid;

fn followers_of(h: &TestHarness, author: Uuid, count: usize) -> Vec<Uuid> {
    (0..count)
        .map(|_| {
            let follower = Uuid::new_v4();
            h.follows.follow(follower, author);
            follower
        })
        .collect()
}

#[tokio::test]
async fn test_fan_out_writes_one_entry_per_follower() {
    let h = TestHarness::new();
    let author = Uuid::new_v4();
    let followers = followers_of(&h, author, 3);
    let post = h.posts.insert(author, Duration::zero(), 0, 0);

    let summary = h.app.fanout.fan_out_post(post.id, author).await.unwrap();

    assert_eq!(summary.followers, 3);
    assert_eq!(summary.inserted, 3);
    assert_eq!(h.index.len(), 3);
    for follower in &followers {
        assert!(h.index.contains(*follower, post.id));
    }
    assert!(!h.index.contains(author, post.id));
    assert_eq!(h.index.insert_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fan_out_is_idempotent() {
    let h = TestHarness::new();
    let author = Uuid::new_v4();
    followers_of(&h, author, 4);
    let post = h.posts.insert(author, Duration::zero(), 0, 0);

    h.app.fanout.fan_out_post(post.id, author).await.unwrap();
    let again = h.app.fanout.fan_out_post(post.id, author).await.unwrap();

    assert_eq!(again.followers, 4);
    assert_eq!(again.inserted, 0);
    assert_eq!(h.index.len(), 4);
}

#[tokio::test]
async fn test_fan_out_invalidates_follower_caches() {
    let h = TestHarness::new();
    let author = Uuid::new_v4();
    let followers = followers_of(&h, author, 3);
    let bystander = Uuid::new_v4();

    for user in followers.iter().chain(std::iter::once(&bystander)) {
        h.cache.seed(*user, &[(Uuid::new_v4(), 1)]);
    }

    let post = h.posts.insert(author, Duration::zero(), 0, 0);
    h.app.fanout.fan_out_post(post.id, author).await.unwrap();
    h.settle().await;

    for follower in &followers {
        assert!(h.cache.was_invalidated(*follower));
        assert!(h.cache.cached_ids(*follower).is_empty());
    }
    assert!(!h.cache.was_invalidated(bystander));
    assert_eq!(h.cache.cached_ids(bystander).len(), 1);
}

#[tokio::test]
async fn test_fan_out_to_many_followers_bounds_invalidation_concurrency() {
    let h = TestHarness::new();
    let author = Uuid::new_v4();
    followers_of(&h, author, 1000);
    h.cache.invalidation_delay_ms.store(1, Ordering::SeqCst);

    let post = h.posts.insert(author, Duration::zero(), 0, 0);
    let summary = h.app.fanout.fan_out_post(post.id, author).await.unwrap();
    h.settle().await;

    assert_eq!(summary.inserted, 1000);
    assert_eq!(h.cache.invalidations.load(Ordering::SeqCst), 1000);
    let peak = h.cache.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 10, "peak concurrency {} exceeds 10", peak);
    assert!(peak > 1, "invalidations should run concurrently");
}

#[tokio::test]
async fn test_fan_out_succeeds_when_cache_is_down() {
    let h = TestHarness::new();
    let author = Uuid::new_v4();
    followers_of(&h, author, 5);
    h.cache.unavailable.store(true, Ordering::SeqCst);

    let post = h.posts.insert(author, Duration::zero(), 0, 0);
    let summary = h.app.fanout.fan_out_post(post.id, author).await.unwrap();
    h.settle().await;

    assert_eq!(summary.inserted, 5);
    assert_eq!(h.index.len(), 5);
    assert_eq!(h.cache.invalidations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_fan_out_without_followers_writes_nothing() {
    let h = TestHarness::new();
    let author = Uuid::new_v4();
    let post = h.posts.insert(author, Duration::zero(), 0, 0);

    let summary = h.app.fanout.fan_out_post(post.id, author).await.unwrap();

    assert_eq!(summary.followers, 0);
    assert_eq!(summary.inserted, 0);
    assert_eq!(h.index.insert_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_fan_out_fails_when_follow_graph_is_down() {
    let h = TestHarness::new();
    let author = Uuid::new_v4();
    followers_of(&h, author, 2);
    h.follows.fail.store(true, Ordering::SeqCst);

    let err = h
        .app
        .fanout
        .fan_out_post(Uuid::new_v4(), author)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Dependency(_)));
    assert_eq!(h.index.len(), 0);
}

#[tokio::test]
async fn test_fan_out_fails_when_index_write_fails() {
    let h = TestHarness::new();
    let author = Uuid::new_v4();
    let followers = followers_of(&h, author, 2);
    h.cache.seed(followers[0], &[(Uuid::new_v4(), 1)]);
    h.index.fail.store(true, Ordering::SeqCst);

    let result = h.app.fanout.fan_out_post(Uuid::new_v4(), author).await;
    h.settle().await;

    assert!(result.is_err());
    // Nothing was written, so nothing is invalidated
    assert_eq!(h.cache.cached_ids(followers[0]).len(), 1);
}

#[tokio::test]
async fn test_fanned_out_post_shows_up_in_follower_feed() {
    let h = TestHarness::new();
    let author = Uuid::new_v4();
    let viewer = Uuid::new_v4();
    h.follows.follow(viewer, author);

    let old = h.posts.insert(author, Duration::hours(2), 0, 0);
    h.app.reader.get_feed(viewer, Some(10), None).await.unwrap();
    h.settle().await;
    assert_eq!(h.cache.cached_ids(viewer), vec![old.id]);

    let fresh = h.posts.insert(author, Duration::zero(), 0, 0);
    h.app.fanout.fan_out_post(fresh.id, author).await.unwrap();
    h.settle().await;

    let conn = h.app.reader.get_feed(viewer, Some(10), None).await.unwrap();
    assert_eq!(post_ids(&conn), vec![fresh.id, old.id]);
}

#[tokio::test]
async fn test_remove_post_clears_index_and_invalidates_feeds() {
    let h = TestHarness::new();
    let author = Uuid::new_v4();
    let followers = followers_of(&h, author, 3);
    let keep = h.posts.insert(author, Duration::hours(1), 0, 0);
    let gone = h.posts.insert(author, Duration::zero(), 0, 0);

    h.app.fanout.fan_out_post(keep.id, author).await.unwrap();
    h.app.fanout.fan_out_post(gone.id, author).await.unwrap();
    h.settle().await;
    for follower in &followers {
        h.cache.seed(*follower, &[(gone.id, 2), (keep.id, 1)]);
    }

    let summary = h.app.fanout.remove_post_from_feeds(gone.id).await.unwrap();
    h.settle().await;

    assert_eq!(summary.feeds_affected, 3);
    assert_eq!(h.index.len(), 3);
    for follower in &followers {
        assert!(!h.index.contains(*follower, gone.id));
        assert!(h.index.contains(*follower, keep.id));
        assert!(h.cache.cached_ids(*follower).is_empty());
    }
}

#[tokio::test]
async fn test_remove_unknown_post_is_a_no_op() {
    let h = TestHarness::new();

    let summary = h
        .app
        .fanout
        .remove_post_from_feeds(Uuid::new_v4())
        .await
        .unwrap();
    h.settle().await;

    assert_eq!(summary.feeds_affected, 0);
    assert_eq!(h.cache.invalidations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_post_created_event_stores_and_fans_out() {
    let h = TestHarness::new();
    let author = Uuid::new_v4();
    let followers = followers_of(&h, author, 2);
    let post_id = Uuid::new_v4();

    let payload = serde_json::json!({
        "post_id": post_id,
        "user_id": author,
        "content": "hello followers",
        "created_at": chrono::Utc::now(),
    });
    h.app
        .events
        .handle_raw("post.created", payload.to_string().as_bytes())
        .await
        .unwrap();

    let stored = h.posts.get(post_id).expect("post stored");
    assert_eq!(stored.author_id, author);
    assert_eq!(stored.content, "hello followers");
    for follower in &followers {
        assert!(h.index.contains(*follower, post_id));
    }
}

#[tokio::test]
async fn test_post_deleted_event_removes_from_feeds() {
    let h = TestHarness::new();
    let author = Uuid::new_v4();
    followers_of(&h, author, 2);
    let post = h.posts.insert(author, Duration::zero(), 0, 0);
    h.app.fanout.fan_out_post(post.id, author).await.unwrap();

    let payload = serde_json::json!({ "post_id": post.id }).to_string();
    h.app
        .events
        .handle_raw("post.deleted", payload.as_bytes())
        .await
        .unwrap();

    assert_eq!(h.index.len(), 0);
}

#[tokio::test]
async fn test_deleted_post_disappears_from_follower_feed() {
    let h = TestHarness::new();
    let author = Uuid::new_v4();
    let viewer = Uuid::new_v4();
    h.follows.follow(viewer, author);
    let kept = h.posts.insert(author, Duration::hours(1), 0, 0);

    let post_id = Uuid::new_v4();
    let created = serde_json::json!({
        "post_id": post_id,
        "user_id": author,
        "content": "soon gone",
    });
    h.app
        .events
        .handle_raw("post.created", created.to_string().as_bytes())
        .await
        .unwrap();

    let before = h.app.reader.get_feed(viewer, Some(10), None).await.unwrap();
    h.settle().await;
    assert_eq!(post_ids(&before), vec![post_id, kept.id]);

    let deleted = serde_json::json!({ "post_id": post_id }).to_string();
    h.app
        .events
        .handle_raw("post.deleted", deleted.as_bytes())
        .await
        .unwrap();
    h.settle().await;

    assert!(h.posts.get(post_id).is_none());
    let after = h.app.reader.get_feed(viewer, Some(10), None).await.unwrap();
    assert_eq!(post_ids(&after), vec![kept.id]);

    // The rebuilt cache must not bring it back either
    h.settle().await;
    assert_eq!(h.cache.cached_ids(viewer), vec![kept.id]);
    let cached = h.app.reader.get_feed(viewer, Some(10), None).await.unwrap();
    assert_eq!(post_ids(&cached), vec![kept.id]);
}

#[tokio::test]
async fn test_post_deleted_event_fails_when_post_store_is_down() {
    let h = TestHarness::new();
    let author = Uuid::new_v4();
    let follower = Uuid::new_v4();
    h.follows.follow(follower, author);
    let post = h.posts.insert(author, Duration::zero(), 0, 0);
    h.app.fanout.fan_out_post(post.id, author).await.unwrap();
    h.posts.fail.store(true, Ordering::SeqCst);

    let payload = serde_json::json!({ "post_id": post.id }).to_string();
    let err = h
        .app
        .events
        .handle_raw("post.deleted", payload.as_bytes())
        .await
        .unwrap_err();

    assert!(!err.is_client_error());
    // Nothing was hidden, so the index still carries the post for a retry
    assert!(h.index.contains(follower, post.id));
}

#[tokio::test]
async fn test_engagement_events_adjust_counters_without_going_negative() {
    let h = TestHarness::new();
    let post = h.posts.insert(Uuid::new_v4(), Duration::zero(), 0, 0);
    let payload = serde_json::json!({ "post_id": post.id, "user_id": Uuid::new_v4() }).to_string();

    for event_type in ["like.created", "like.created", "comment.created", "like.deleted"] {
        h.app
            .events
            .handle_raw(event_type, payload.as_bytes())
            .await
            .unwrap();
    }
    let counted = h.posts.get(post.id).unwrap();
    assert_eq!(counted.likes_count, 1);
    assert_eq!(counted.comments_count, 1);

    for _ in 0..3 {
        let event = FeedEvent::parse("comment.deleted", payload.as_bytes())
            .unwrap()
            .unwrap();
        h.app.events.handle(event).await.unwrap();
    }
    assert_eq!(h.posts.get(post.id).unwrap().comments_count, 0);
}

#[tokio::test]
async fn test_unknown_and_malformed_events() {
    let h = TestHarness::new();

    h.app
        .events
        .handle_raw("user.renamed", b"{\"anything\": true}")
        .await
        .unwrap();

    let err = h
        .app
        .events
        .handle_raw("post.created", b"not json")
        .await
        .unwrap_err();
    assert!(err.is_client_error());
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        initial_backoff: StdDuration::from_millis(5),
        max_backoff: StdDuration::from_millis(20),
    }
}

#[tokio::test]
async fn test_delivery_acknowledges_applied_and_malformed_events() {
    let h = TestHarness::new();
    let (_tx, mut shutdown) = watch::channel(false);

    let malformed = h
        .app
        .events
        .deliver("post.created", b"not json", &quick_retry(), &mut shutdown)
        .await;
    assert_eq!(malformed, Delivery::Skipped);

    let unknown = h
        .app
        .events
        .deliver("user.renamed", b"{}", &quick_retry(), &mut shutdown)
        .await;
    assert_eq!(unknown, Delivery::Applied);
}

#[tokio::test]
async fn test_delivery_retries_fan_out_until_dependency_recovers() {
    let h = TestHarness::new();
    let author = Uuid::new_v4();
    let followers = followers_of(&h, author, 2);
    let post_id = Uuid::new_v4();
    let payload = serde_json::json!({ "post_id": post_id, "user_id": author }).to_string();

    h.follows.fail.store(true, Ordering::SeqCst);
    let follows = h.follows.clone();
    tokio::spawn(async move {
        tokio::time::sleep(StdDuration::from_millis(40)).await;
        follows.fail.store(false, Ordering::SeqCst);
    });

    let (_tx, mut shutdown) = watch::channel(false);
    let delivery = h
        .app
        .events
        .deliver("post.created", payload.as_bytes(), &quick_retry(), &mut shutdown)
        .await;

    assert_eq!(delivery, Delivery::Applied);
    for follower in &followers {
        assert!(h.index.contains(*follower, post_id));
    }
}

#[tokio::test]
async fn test_delivery_leaves_failing_event_unacknowledged_on_shutdown() {
    let h = TestHarness::new();
    let author = Uuid::new_v4();
    followers_of(&h, author, 2);
    h.index.fail.store(true, Ordering::SeqCst);
    let payload = serde_json::json!({ "post_id": Uuid::new_v4(), "user_id": author }).to_string();

    let (tx, mut shutdown) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        let _ = tx.send(true);
    });

    let delivery = h
        .app
        .events
        .deliver("post.created", payload.as_bytes(), &quick_retry(), &mut shutdown)
        .await;

    assert_eq!(delivery, Delivery::Interrupted);
    assert!(!delivery.should_acknowledge());
    assert_eq!(h.index.len(), 0);
}
