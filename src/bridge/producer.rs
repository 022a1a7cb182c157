use std::time::Duration;

use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::debug;

use crate::config::Config;

/// Publishing seam for the outbound bridge. Failure is reported to the
/// caller synchronously; there is no retry queue.
#[async_trait]
pub trait EnvelopePublisher: Send + Sync {
    async fn publish(&self, room_id: &str, payload: &[u8]) -> anyhow::Result<()>;
}

pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaPublisher {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| anyhow::anyhow!("failed to create kafka producer: {e}"))?;

        Ok(Self {
            producer,
            topic: config.kafka_topic.clone(),
        })
    }
}

#[async_trait]
impl EnvelopePublisher for KafkaPublisher {
    async fn publish(&self, room_id: &str, payload: &[u8]) -> anyhow::Result<()> {
        let record = FutureRecord::to(&self.topic).key(room_id).payload(payload);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("failed to publish to {}: {e}", self.topic))?;

        debug!(topic = %self.topic, room = room_id, "published envelope");
        Ok(())
    }
}
