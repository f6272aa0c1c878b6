/// Configuration management for Feed Service
///
/// Loads configuration from environment variables. Only `DATABASE_URL` and
/// `REDIS_URL` are required; every other key has a default.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub warmer: WarmerConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// Feed generation tunables shared by the read, build and fan-out paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// TTL applied to a user's cached feed set on every write
    pub cache_ttl_secs: u64,
    /// Upper bound on entries kept per cached feed
    pub cache_max_items: usize,
    /// Only posts newer than this many days are eligible for a feed
    pub window_days: i64,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Parallel cache invalidations after a fan-out
    pub invalidation_concurrency: usize,
    pub request_timeout_ms: u64,
    pub background_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            cache_max_items: 500,
            window_days: 30,
            default_page_size: 10,
            max_page_size: 100,
            invalidation_concurrency: 10,
            request_timeout_ms: 5000,
            background_timeout_secs: 30,
        }
    }
}

impl FeedConfig {
    /// Normalise a requested page size: absent or non-positive means the
    /// default, anything above the maximum is capped.
    pub fn clamp_page_size(&self, first: Option<i64>) -> usize {
        match first {
            Some(n) if n > 0 => (n as u64).min(self.max_page_size as u64) as usize,
            _ => self.default_page_size,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn background_timeout(&self) -> Duration {
        Duration::from_secs(self.background_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Feed index entries at or beyond this age are deleted
    pub retention_days: i64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 86_400,
            retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// A user counts as active if their feed index received entries within this window
    pub activity_window_hours: i64,
    pub max_users_per_cycle: usize,
    pub concurrency: usize,
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 300,
            activity_window_hours: 24,
            max_users_per_cycle: 500,
            concurrency: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Absent brokers disable the event consumer
    pub brokers: Option<String>,
    #[serde(default = "default_kafka_group_id")]
    pub group_id: String,
    #[serde(default = "default_feed_events_topic")]
    pub topic: String,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout_secs() -> u64 {
    10
}

fn default_kafka_group_id() -> String {
    "feed-service-events".to_string()
}

fn default_feed_events_topic() -> String {
    "nova.feed.events".to_string()
}

/// Read an optional variable, falling back to `default` when unset.
/// A value that is present but unparseable is a configuration error.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("APP_PORT", 8089)?,
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL environment variable not set")?,
            max_connections: env_or("DB_MAX_CONNECTIONS", default_max_connections())?,
            min_connections: env_or("DB_MIN_CONNECTIONS", default_min_connections())?,
            acquire_timeout_secs: env_or(
                "DB_ACQUIRE_TIMEOUT_SECS",
                default_acquire_timeout_secs(),
            )?,
        };

        let redis = RedisConfig {
            url: std::env::var("REDIS_URL").context("REDIS_URL environment variable not set")?,
        };

        let feed_defaults = FeedConfig::default();
        let feed = FeedConfig {
            cache_ttl_secs: env_or("FEED_CACHE_TTL_SECS", feed_defaults.cache_ttl_secs)?,
            cache_max_items: env_or("FEED_CACHE_MAX_ITEMS", feed_defaults.cache_max_items)?,
            window_days: env_or("FEED_WINDOW_DAYS", feed_defaults.window_days)?,
            default_page_size: env_or("FEED_DEFAULT_PAGE_SIZE", feed_defaults.default_page_size)?,
            max_page_size: env_or("FEED_MAX_PAGE_SIZE", feed_defaults.max_page_size)?,
            invalidation_concurrency: env_or(
                "FEED_INVALIDATION_CONCURRENCY",
                feed_defaults.invalidation_concurrency,
            )?,
            request_timeout_ms: env_or("FEED_REQUEST_TIMEOUT_MS", feed_defaults.request_timeout_ms)?,
            background_timeout_secs: env_or(
                "FEED_BACKGROUND_TIMEOUT_SECS",
                feed_defaults.background_timeout_secs,
            )?,
        };
        feed.validate()?;

        let cleanup_defaults = CleanupConfig::default();
        let cleanup = CleanupConfig {
            enabled: env_or("FEED_CLEANUP_ENABLED", cleanup_defaults.enabled)?,
            interval_secs: env_or("FEED_CLEANUP_INTERVAL_SECS", cleanup_defaults.interval_secs)?,
            retention_days: env_or("FEED_RETENTION_DAYS", cleanup_defaults.retention_days)?,
        };

        let warmer_defaults = WarmerConfig::default();
        let warmer = WarmerConfig {
            enabled: env_or("FEED_WARMER_ENABLED", warmer_defaults.enabled)?,
            interval_secs: env_or("FEED_WARMER_INTERVAL_SECS", warmer_defaults.interval_secs)?,
            activity_window_hours: env_or(
                "FEED_WARMER_ACTIVITY_HOURS",
                warmer_defaults.activity_window_hours,
            )?,
            max_users_per_cycle: env_or(
                "FEED_WARMER_MAX_USERS",
                warmer_defaults.max_users_per_cycle,
            )?,
            concurrency: env_or("FEED_WARMER_CONCURRENCY", warmer_defaults.concurrency)?,
        };

        let kafka = KafkaConfig {
            brokers: std::env::var("KAFKA_BROKERS")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            group_id: std::env::var("KAFKA_GROUP_ID").unwrap_or_else(|_| default_kafka_group_id()),
            topic: std::env::var("KAFKA_FEED_EVENTS_TOPIC")
                .unwrap_or_else(|_| default_feed_events_topic()),
        };

        Ok(Config {
            app,
            database,
            redis,
            feed,
            cleanup,
            warmer,
            kafka,
        })
    }
}

impl FeedConfig {
    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.cache_max_items > 0, "FEED_CACHE_MAX_ITEMS must be positive");
        anyhow::ensure!(self.max_page_size > 0, "FEED_MAX_PAGE_SIZE must be positive");
        anyhow::ensure!(
            self.default_page_size > 0 && self.default_page_size <= self.max_page_size,
            "FEED_DEFAULT_PAGE_SIZE must be between 1 and FEED_MAX_PAGE_SIZE"
        );
        anyhow::ensure!(
            self.invalidation_concurrency > 0,
            "FEED_INVALIDATION_CONCURRENCY must be positive"
        );
        anyhow::ensure!(self.window_days > 0, "FEED_WINDOW_DAYS must be positive");
        Ok(())
    }
}
