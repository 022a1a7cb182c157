use std::str::FromStr;

use uuid::Uuid;

use crate::AppResult;

/// Mailbox capacities for the delivery core. Overflow of either queue is a
/// drop/disconnect decision, so the thresholds are configuration, not
/// constants.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Per-connection outbound mailbox; a member whose mailbox is full is
    /// forcibly disconnected on the next broadcast.
    pub client_send_buffer: usize,
    /// Per-room command mailbox; broadcasts submitted while it is full are
    /// dropped and counted.
    pub room_broadcast_buffer: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            client_send_buffer: 256,
            room_broadcast_buffer: 512,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub database_url: String,
    pub kafka_brokers: String,
    pub kafka_topic: String,
    /// Consumer group id. Defaults to a per-process unique id so every
    /// instance receives every envelope; sharing a group id across instances
    /// would shard the stream between them.
    pub kafka_group_id: String,
    pub limits: Limits,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let database_url = dotenv::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is not set"))?;

        Ok(Self {
            http_port: var_or("HTTP_SERVER_PORT", 8080)?,
            database_url,
            kafka_brokers: dotenv::var("KAFKA_BROKERS")
                .unwrap_or_else(|_| "localhost:9092".to_owned()),
            kafka_topic: dotenv::var("KAFKA_TOPIC").unwrap_or_else(|_| "messages".to_owned()),
            kafka_group_id: dotenv::var("KAFKA_GROUP_ID")
                .unwrap_or_else(|_| format!("roomcast-{}", Uuid::now_v7())),
            limits: Limits {
                client_send_buffer: var_or("CLIENT_SEND_BUFFER", 256)?,
                room_broadcast_buffer: var_or("ROOM_BROADCAST_BUFFER", 512)?,
            },
        })
    }
}

fn var_or<T: FromStr>(name: &str, default: T) -> AppResult<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match dotenv::var(name) {
        Ok(raw) => Ok(raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {name}: {e}"))?),
        Err(_) => Ok(default),
    }
}
