use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{Message, MessageStatus, MessageType};

/// Persistence seam for message rows. The delivery core only ever calls this
/// before publishing to the bridge, so a saved record always precedes its
/// fan-out.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message with status `sent`; the store assigns `id` and
    /// `created_at`.
    async fn save(
        &self,
        room_id: &str,
        content: &str,
        kind: MessageType,
    ) -> anyhow::Result<Message>;

    async fn update_status(&self, message_id: &str, status: MessageStatus) -> anyhow::Result<()>;

    /// Message history for a room, newest first.
    async fn room_messages(
        &self,
        room_id: &str,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Message>>;
}

pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn save(
        &self,
        room_id: &str,
        content: &str,
        kind: MessageType,
    ) -> anyhow::Result<Message> {
        let created_at = OffsetDateTime::now_utc();
        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO messages (room_id, content, type, status, created_at)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(room_id)
        .bind(content)
        .bind(kind.as_str())
        .bind(MessageStatus::Sent.as_str())
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(Message {
            id: id.to_string(),
            room_id: room_id.to_owned(),
            content: content.to_owned(),
            kind,
            status: MessageStatus::Sent,
            created_at,
        })
    }

    async fn update_status(&self, message_id: &str, status: MessageStatus) -> anyhow::Result<()> {
        sqlx::query("UPDATE messages SET status=$1 WHERE id=$2")
            .bind(status.as_str())
            .bind(Uuid::parse_str(message_id)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn room_messages(
        &self,
        room_id: &str,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Message>> {
        let rows: Vec<(Uuid, String, String, String, OffsetDateTime)> = sqlx::query_as(
            "SELECT id, content, type, status, created_at
             FROM messages WHERE room_id = $1 ORDER BY created_at DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(room_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, content, kind, status, created_at)| {
                Ok(Message {
                    id: id.to_string(),
                    room_id: room_id.to_owned(),
                    content,
                    kind: parse_kind(&kind)?,
                    status: parse_status(&status)?,
                    created_at,
                })
            })
            .collect()
    }
}

fn parse_kind(raw: &str) -> anyhow::Result<MessageType> {
    match raw {
        "text" => Ok(MessageType::Text),
        "image" => Ok(MessageType::Image),
        "file" => Ok(MessageType::File),
        "event" => Ok(MessageType::Event),
        other => anyhow::bail!("unknown message type in store: {other}"),
    }
}

fn parse_status(raw: &str) -> anyhow::Result<MessageStatus> {
    match raw {
        "sent" => Ok(MessageStatus::Sent),
        "delivered" => Ok(MessageStatus::Delivered),
        "read" => Ok(MessageStatus::Read),
        other => anyhow::bail!("unknown message status in store: {other}"),
    }
}
