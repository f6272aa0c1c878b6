use actix_web::{web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_service::cache::{CacheSettings, RedisFeedCache};
use feed_service::config::Config;
use feed_service::db::{self, PgFeedIndexStore, PgFollowGraph, PgLikeStatusReader, PgPostStore};
use feed_service::handlers;
use feed_service::jobs::{start_cache_warmer, start_feed_cleaner};
use feed_service::{Collaborators, FeedApp};

/// How long shutdown waits for in-flight background work
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true),
        )
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        env = %config.app.env,
        port = config.app.port,
        "Starting feed-service"
    );

    let pg_pool = db::create_pool(&config.database).await?;
    db::MIGRATOR
        .run(&pg_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");

    let cache = RedisFeedCache::new(&config.redis.url, CacheSettings::from(&config.feed))
        .await
        .context("Failed to connect to Redis")?;
    info!("Redis connection established");

    let post_store = Arc::new(PgPostStore::new(pg_pool.clone()));
    let collaborators = Collaborators {
        posts: post_store.clone(),
        counters: post_store,
        follows: Arc::new(PgFollowGraph::new(pg_pool.clone())),
        likes: Arc::new(PgLikeStatusReader::new(pg_pool.clone())),
        index: Arc::new(PgFeedIndexStore::new(pg_pool.clone())),
        cache: Arc::new(cache),
    };
    let app = FeedApp::new(collaborators, config.feed.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut jobs = tokio::task::JoinSet::new();

    jobs.spawn(start_feed_cleaner(
        Arc::clone(&app.collaborators.index),
        config.cleanup.clone(),
        shutdown_rx.clone(),
    ));
    jobs.spawn(start_cache_warmer(
        Arc::clone(&app.collaborators.index),
        Arc::clone(&app.builder),
        config.warmer.clone(),
        shutdown_rx.clone(),
    ));

    #[cfg(feature = "kafka")]
    {
        use feed_service::consumers::kafka::FeedEventsConsumer;

        match FeedEventsConsumer::from_config(&config.kafka, Arc::clone(&app.events)) {
            Some(consumer) => {
                jobs.spawn(consumer.run(shutdown_rx.clone()));
            }
            None => info!("KAFKA_BROKERS not set; feed events consumer disabled"),
        }
    }
    #[cfg(not(feature = "kafka"))]
    {
        if config.kafka.brokers.is_some() {
            warn!("KAFKA_BROKERS is set but feed-service was built without the kafka feature");
        }
    }

    let feed_state = web::Data::new(app.handler_state());
    let health_state = web::Data::new(app.health_state());
    let bind_addr = (config.app.host.clone(), config.app.port);

    info!("Starting HTTP server on {}:{}", bind_addr.0, bind_addr.1);
    // Actix handles SIGINT/SIGTERM and drains connections before returning
    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(feed_state.clone())
            .app_data(health_state.clone())
            .configure(handlers::configure)
    })
    .bind(bind_addr)
    .context("Failed to bind HTTP server")?
    .shutdown_timeout(SHUTDOWN_GRACE.as_secs())
    .run()
    .await
    .context("HTTP server error")?;

    info!("HTTP server stopped; shutting down background work");
    shutdown_tx.send_replace(true);

    if tokio::time::timeout(SHUTDOWN_GRACE, app.tasks.wait_idle())
        .await
        .is_err()
    {
        warn!(
            in_flight = app.tasks.in_flight(),
            "Background tasks still running at shutdown; cancelling"
        );
    }
    app.tasks.shutdown();

    while jobs.join_next().await.is_some() {}
    pg_pool.close().await;

    info!("feed-service stopped");
    Ok(())
}
