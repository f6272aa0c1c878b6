use actix_web::{delete, get, post, web, HttpResponse};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::services::{FanOutWriter, FeedBuilder, FeedReader};

#[derive(Debug, Deserialize)]
pub struct FeedQueryParams {
    /// Page size; clamped by the reader
    pub first: Option<i64>,
    /// Cursor of the last edge already seen
    pub after: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FanOutRequest {
    pub post_id: Uuid,
    pub author_id: Uuid,
}

pub struct FeedHandlerState {
    pub reader: Arc<FeedReader>,
    pub builder: Arc<FeedBuilder>,
    pub fanout: Arc<FanOutWriter>,
    /// Deadline for each request's foreground work
    pub request_timeout: Duration,
}

fn parse_uuid(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::BadRequest(format!("Invalid {}", what)))
}

async fn with_deadline<T>(
    deadline: Duration,
    operation: &str,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, work).await {
        Ok(result) => result,
        Err(elapsed) => {
            warn!(
                operation,
                timeout_ms = deadline.as_millis() as u64,
                "Request deadline exceeded"
            );
            Err(elapsed.into())
        }
    }
}

#[get("/feed/{user_id}")]
pub async fn get_feed(
    path: web::Path<String>,
    query: web::Query<FeedQueryParams>,
    state: web::Data<FeedHandlerState>,
) -> Result<HttpResponse> {
    let user_id = parse_uuid(&path, "user id")?;

    let connection = with_deadline(
        state.request_timeout,
        "get_feed",
        state
            .reader
            .get_feed(user_id, query.first, query.after.as_deref()),
    )
    .await?;

    Ok(HttpResponse::Ok().json(connection))
}

#[post("/feed/{user_id}/refresh")]
pub async fn refresh_feed(
    path: web::Path<String>,
    state: web::Data<FeedHandlerState>,
) -> Result<HttpResponse> {
    let user_id = parse_uuid(&path, "user id")?;

    let cached = with_deadline(
        state.request_timeout,
        "refresh_feed",
        state.builder.refresh_user_feed(user_id),
    )
    .await?;

    info!(user_id = %user_id, cached, "Feed refresh requested");
    Ok(HttpResponse::NoContent().finish())
}

#[post("/fanout")]
pub async fn fan_out(
    body: web::Json<FanOutRequest>,
    state: web::Data<FeedHandlerState>,
) -> Result<HttpResponse> {
    let summary = with_deadline(
        state.request_timeout,
        "fan_out",
        state.fanout.fan_out_post(body.post_id, body.author_id),
    )
    .await?;

    Ok(HttpResponse::Accepted().json(summary))
}

#[delete("/posts/{post_id}/feed")]
pub async fn remove_post(
    path: web::Path<String>,
    state: web::Data<FeedHandlerState>,
) -> Result<HttpResponse> {
    let post_id = parse_uuid(&path, "post id")?;

    with_deadline(
        state.request_timeout,
        "remove_post",
        state.fanout.remove_post_from_feeds(post_id),
    )
    .await?;

    Ok(HttpResponse::NoContent().finish())
}
