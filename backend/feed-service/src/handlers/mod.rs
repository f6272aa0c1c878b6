pub mod feed;
pub mod health;

use actix_web::web;

pub use feed::{FanOutRequest, FeedHandlerState, FeedQueryParams};
pub use health::HealthState;

/// Register every feed-service route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health::health)
        .service(health::readiness)
        .route("/metrics", web::get().to(crate::metrics::serve_metrics))
        .service(
            web::scope("/api/v1")
                .service(feed::get_feed)
                .service(feed::refresh_feed)
                .service(feed::fan_out)
                .service(feed::remove_post),
        );
}
