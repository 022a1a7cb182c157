use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    File,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
            MessageType::Event => "event",
        }
    }
}

/// The canonical message record. `id` and `created_at` are assigned by the
/// store, never by the delivery core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub status: MessageStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Client request payload for a `message_send` envelope. `sender_id` is
/// accepted for wire compatibility but not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSend {
    pub room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub id: String,
    pub room_id: String,
    pub status: MessageStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEvent {
    pub user_id: String,
    pub room_id: String,
}

/// The tagged wire envelope exchanged with clients and through the broker:
/// `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Envelope {
    MessageSend(MessageSend),
    MessageReceive(Message),
    MessageStatus(StatusUpdate),
    UserJoin(UserEvent),
    UserLeave(UserEvent),
}

impl Envelope {
    /// Routing key: every envelope kind carries the room it belongs to.
    pub fn room_id(&self) -> &str {
        match self {
            Envelope::MessageSend(m) => &m.room_id,
            Envelope::MessageReceive(m) => &m.room_id,
            Envelope::MessageStatus(s) => &s.room_id,
            Envelope::UserJoin(u) | Envelope::UserLeave(u) => &u.room_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn message_send_wire_format() {
        let raw = r#"{"event":"message_send","data":{"room_id":"R1","content":"hi","type":"text"}}"#;
        let env: Envelope = serde_json::from_str(raw).unwrap();
        let Envelope::MessageSend(req) = env else {
            panic!("wrong kind");
        };
        assert_eq!(req.room_id, "R1");
        assert_eq!(req.content, "hi");
        assert_eq!(req.kind, MessageType::Text);
        assert_eq!(req.sender_id, None);
    }

    #[test]
    fn message_receive_wire_format() {
        let env = Envelope::MessageReceive(Message {
            id: "m1".into(),
            room_id: "R1".into(),
            content: "hi".into(),
            kind: MessageType::Text,
            status: MessageStatus::Sent,
            created_at: datetime!(2025-01-02 03:04:05 UTC),
        });

        let json: serde_json::Value = serde_json::to_value(&env).unwrap();
        assert_eq!(json["event"], "message_receive");
        assert_eq!(json["data"]["id"], "m1");
        assert_eq!(json["data"]["room_id"], "R1");
        assert_eq!(json["data"]["type"], "text");
        assert_eq!(json["data"]["status"], "sent");
        assert_eq!(json["data"]["created_at"], "2025-01-02T03:04:05Z");
    }

    #[test]
    fn room_id_extracted_from_every_kind() {
        let raw = r#"{"event":"user_join","data":{"user_id":"u1","room_id":"R9"}}"#;
        let env: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(env.room_id(), "R9");

        let raw = r#"{"event":"message_status","data":{"id":"m1","room_id":"R2","status":"read"}}"#;
        let env: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(env.room_id(), "R2");
    }

    #[test]
    fn malformed_envelope_is_an_error() {
        assert!(serde_json::from_str::<Envelope>("not json").is_err());
        assert!(serde_json::from_str::<Envelope>(r#"{"event":"nope","data":{}}"#).is_err());
    }
}
