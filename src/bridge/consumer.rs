use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use rdkafka::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message as KafkaMessage;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::Envelope;
use crate::rooms::hub::Hub;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Liveness flag for the inbound bridge, reported through `/healthz`. Unset
/// while the consumer is in a read-error/backoff cycle.
#[derive(Clone)]
pub struct BridgeHealth(Arc<AtomicBool>);

impl BridgeHealth {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_healthy(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn set(&self, healthy: bool) {
        self.0.store(healthy, Ordering::Relaxed);
    }
}

/// The single long-lived broker reader for this instance. Every envelope on
/// the topic comes through here, the origin instance's own messages
/// included.
pub struct BridgeConsumer {
    consumer: StreamConsumer,
    hub: Arc<Hub>,
    health: BridgeHealth,
}

impl BridgeConsumer {
    pub fn new(config: &Config, hub: Arc<Hub>) -> anyhow::Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_brokers)
            .set("group.id", &config.kafka_group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .create()
            .map_err(|e| anyhow::anyhow!("failed to create kafka consumer: {e}"))?;

        consumer
            .subscribe(&[config.kafka_topic.as_str()])
            .map_err(|e| anyhow::anyhow!("failed to subscribe to {}: {e}", config.kafka_topic))?;

        info!(topic = %config.kafka_topic, group = %config.kafka_group_id, "subscribed to broker");

        Ok(Self {
            consumer,
            hub,
            health: BridgeHealth::new(),
        })
    }

    pub fn health(&self) -> BridgeHealth {
        self.health.clone()
    }

    /// Read loop: retries read errors with bounded exponential backoff, resets
    /// on the first successful read, and exits when the shutdown channel
    /// fires.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let received = tokio::select! {
                _ = shutdown.changed() => break,
                received = self.consumer.recv() => received,
            };

            match received {
                Ok(message) => {
                    self.health.set(true);
                    backoff = INITIAL_BACKOFF;

                    let Some(payload) = message.payload() else {
                        warn!("discarding broker record with no payload");
                        continue;
                    };
                    dispatch(&self.hub, payload);
                }
                Err(err) => {
                    self.health.set(false);
                    warn!(error = %err, backoff_ms = backoff.as_millis() as u64, "broker read failed, backing off");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }

        info!("bridge consumer stopped");
    }
}

/// Re-inject one broker envelope into the local room it targets. No local
/// room means no local subscribers: the envelope is discarded.
pub(crate) fn dispatch(hub: &Hub, payload: &[u8]) {
    let Ok(envelope) = serde_json::from_slice::<Envelope>(payload) else {
        warn!("discarding undecodable broker envelope");
        return;
    };

    let Some(room) = hub.lookup(envelope.room_id()) else {
        debug!(room = envelope.room_id(), "no local subscribers, discarding");
        return;
    };

    // valid JSON is valid UTF-8
    let Ok(text) = std::str::from_utf8(payload) else {
        return;
    };
    room.broadcast(Utf8Bytes::from(text));
}
