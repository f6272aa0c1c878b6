use actix_web::{get, web, HttpResponse};
use serde_json::json;
use std::sync::Arc;

use crate::cache::FeedCache;

pub struct HealthState {
    pub cache: Arc<dyn FeedCache>,
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Ready whenever the process is up; a failing cache only degrades feeds.
#[get("/health/ready")]
pub async fn readiness(state: web::Data<HealthState>) -> HttpResponse {
    let cache = match state.cache.ping().await {
        Ok(()) => "ok",
        Err(_) => "degraded",
    };

    HttpResponse::Ok().json(json!({
        "status": "ok",
        "cache": cache,
    }))
}
