//! Kafka transport for feed events
//!
//! Reads `event_type` from the message headers and hands the payload to
//! [`FeedEventHandler::deliver`]. An offset is committed only once its
//! message applied or proved malformed. A message that keeps failing on an
//! unavailable dependency blocks its partition and is retried; on shutdown
//! it stays uncommitted and is redelivered to the next consumer.

use crate::config::KafkaConfig;
use crate::consumers::{Delivery, FeedEventHandler, RetryPolicy};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Headers, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub struct FeedEventsConsumer {
    brokers: String,
    group_id: String,
    topic: String,
    handler: Arc<FeedEventHandler>,
    retry: RetryPolicy,
}

impl FeedEventsConsumer {
    /// `None` when no brokers are configured.
    pub fn from_config(config: &KafkaConfig, handler: Arc<FeedEventHandler>) -> Option<Self> {
        let brokers = config.brokers.clone()?;
        Some(Self {
            brokers,
            group_id: config.group_id.clone(),
            topic: config.topic.clone(),
            handler,
            retry: RetryPolicy::default(),
        })
    }

    /// Run the consumer loop until shutdown
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        if let Err(err) = self.run_inner(shutdown).await {
            error!("Feed events consumer terminated with error: {err}");
        }
    }

    async fn run_inner(self, mut shutdown: watch::Receiver<bool>) -> Result<(), KafkaError> {
        info!(
            "Starting feed events consumer (topic: {}, group: {})",
            self.topic, self.group_id
        );

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "latest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "45000")
            .set("max.poll.interval.ms", "300000")
            .create()?;

        consumer.subscribe(&[&self.topic])?;

        loop {
            let received = tokio::select! {
                received = consumer.recv() => received,
                _ = shutdown.changed() => {
                    info!("Feed events consumer stopping");
                    return Ok(());
                }
            };

            match received {
                Ok(record) => {
                    let Some(payload) = record.payload() else {
                        debug!("Received Kafka message with empty payload (topic: {})", record.topic());
                        continue;
                    };

                    let delivery = match header_value(&record, "event_type") {
                        Some(event_type) => {
                            self.handler
                                .deliver(event_type, payload, &self.retry, &mut shutdown)
                                .await
                        }
                        None => {
                            debug!("Kafka message without event_type header");
                            Delivery::Skipped
                        }
                    };

                    if !delivery.should_acknowledge() {
                        info!(
                            partition = record.partition(),
                            offset = record.offset(),
                            "Feed events consumer stopping; leaving message uncommitted"
                        );
                        return Ok(());
                    }

                    if let Err(commit_err) = consumer.commit_message(&record, CommitMode::Async) {
                        warn!("Failed to commit Kafka offset: {}", commit_err);
                    }
                }
                Err(err) => {
                    error!("Kafka error: {}", err);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

fn header_value<'a>(message: &'a BorrowedMessage<'a>, key: &str) -> Option<&'a str> {
    message
        .headers()
        .and_then(|headers| {
            headers
                .iter()
                .find(|header| header.key == key)
                .and_then(|header| header.value)
        })
        .and_then(|value| std::str::from_utf8(value).ok())
}
