//! Service wiring shared by the binary and the integration tests.

use std::sync::Arc;

use crate::cache::FeedCache;
use crate::config::FeedConfig;
use crate::consumers::FeedEventHandler;
use crate::db::{EngagementCounters, FeedIndexStore, FollowGraph, LikeStatusReader, PostStore};
use crate::handlers::{FeedHandlerState, HealthState};
use crate::services::{BackgroundTasks, FanOutWriter, FeedBuilder, FeedReader};

/// Everything the feed services depend on.
#[derive(Clone)]
pub struct Collaborators {
    pub posts: Arc<dyn PostStore>,
    pub counters: Arc<dyn EngagementCounters>,
    pub follows: Arc<dyn FollowGraph>,
    pub likes: Arc<dyn LikeStatusReader>,
    pub index: Arc<dyn FeedIndexStore>,
    pub cache: Arc<dyn FeedCache>,
}

pub struct FeedApp {
    pub reader: Arc<FeedReader>,
    pub builder: Arc<FeedBuilder>,
    pub fanout: Arc<FanOutWriter>,
    pub events: Arc<FeedEventHandler>,
    pub tasks: BackgroundTasks,
    pub collaborators: Collaborators,
    pub config: FeedConfig,
}

impl FeedApp {
    pub fn new(collaborators: Collaborators, config: FeedConfig) -> Self {
        let tasks = BackgroundTasks::new(config.background_timeout());

        let builder = Arc::new(FeedBuilder::new(
            Arc::clone(&collaborators.follows),
            Arc::clone(&collaborators.posts),
            Arc::clone(&collaborators.cache),
            config.clone(),
        ));

        let reader = Arc::new(FeedReader::new(
            Arc::clone(&collaborators.cache),
            Arc::clone(&collaborators.posts),
            Arc::clone(&collaborators.likes),
            Arc::clone(&builder),
            tasks.clone(),
            config.clone(),
        ));

        let fanout = Arc::new(FanOutWriter::new(
            Arc::clone(&collaborators.follows),
            Arc::clone(&collaborators.index),
            Arc::clone(&collaborators.cache),
            tasks.clone(),
            config.invalidation_concurrency,
        ));

        let events = Arc::new(FeedEventHandler::new(
            Arc::clone(&collaborators.posts),
            Arc::clone(&collaborators.counters),
            Arc::clone(&fanout),
        ));

        Self {
            reader,
            builder,
            fanout,
            events,
            tasks,
            collaborators,
            config,
        }
    }

    pub fn handler_state(&self) -> FeedHandlerState {
        FeedHandlerState {
            reader: Arc::clone(&self.reader),
            builder: Arc::clone(&self.builder),
            fanout: Arc::clone(&self.fanout),
            request_timeout: self.config.request_timeout(),
        }
    }

    pub fn health_state(&self) -> HealthState {
        HealthState {
            cache: Arc::clone(&self.collaborators.cache),
        }
    }
}
