use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::bridge::producer::EnvelopePublisher;
use crate::config::Limits;
use crate::models::Envelope;
use crate::rooms::hub::ConnGuard;
use crate::rooms::room::RoomHandle;
use crate::store::MessageStore;

/// Drives one client connection until either pump dies, then tears it down
/// through the room's unregister path.
pub(crate) async fn run(
    socket: WebSocket,
    room: RoomHandle,
    guard: ConnGuard,
    store: Arc<dyn MessageStore>,
    publisher: Arc<dyn EnvelopePublisher>,
    limits: Limits,
) {
    let client_id = Uuid::now_v7();
    let (outbound_tx, outbound_rx) = mpsc::channel(limits.client_send_buffer);
    room.register(client_id, outbound_tx).await;

    let (sink, stream) = socket.split();
    let mut write_task = tokio::spawn(write_pump(outbound_rx, sink));
    let mut read_task = tokio::spawn(read_pump(
        stream,
        Arc::clone(&store),
        Arc::clone(&publisher),
    ));

    tokio::select! {
        _ = &mut write_task => {
            read_task.abort();
            room.unregister(client_id).await;
        }
        _ = &mut read_task => {
            room.unregister(client_id).await;
            // unregister closes the mailbox; let the write pump drain what the
            // room already queued before the transport goes away
            let _ = write_task.await;
        }
    }

    drop(guard);
}

/// Inbound half: decode frames and run the persist-then-publish path. Exits
/// on the first transport error, which is the endpoint's teardown trigger.
async fn read_pump(
    mut stream: SplitStream<WebSocket>,
    store: Arc<dyn MessageStore>,
    publisher: Arc<dyn EnvelopePublisher>,
) {
    while let Some(Ok(frame)) = stream.next().await {
        handle_frame(&frame.into_data(), &*store, &*publisher).await;
    }
}

/// Outbound half: mirrors the mailbox to the transport in arrival order.
/// Recv returning `None` means the room closed the mailbox (unregister or
/// forced disconnect) and everything queued has been written.
async fn write_pump(
    mut outbound: mpsc::Receiver<Utf8Bytes>,
    mut sink: SplitSink<WebSocket, WsMessage>,
) {
    while let Some(payload) = outbound.recv().await {
        if sink.send(WsMessage::Text(payload)).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}

/// One frame of the client protocol. Failures never surface to the peer:
/// undecodable frames are skipped, persistence or publish failures drop the
/// message. Locally authored messages reach subscribers (the sender
/// included) only through the broker round-trip, so every instance shares
/// one fan-out path.
async fn handle_frame(raw: &[u8], store: &dyn MessageStore, publisher: &dyn EnvelopePublisher) {
    let Ok(envelope) = serde_json::from_slice::<Envelope>(raw) else {
        return;
    };

    match envelope {
        Envelope::MessageSend(req) => {
            let saved = match store.save(&req.room_id, &req.content, req.kind).await {
                Ok(saved) => saved,
                Err(err) => {
                    warn!(room = %req.room_id, error = %err, "failed to persist message, dropping");
                    return;
                }
            };
            publish(publisher, Envelope::MessageReceive(saved)).await;
        }
        Envelope::MessageStatus(update) => {
            if let Err(err) = store.update_status(&update.id, update.status).await {
                warn!(message = %update.id, error = %err, "failed to update message status");
                return;
            }
            publish(publisher, Envelope::MessageStatus(update)).await;
        }
        // receive/join/leave frames are never client-originated
        _ => {}
    }
}

async fn publish(publisher: &dyn EnvelopePublisher, envelope: Envelope) {
    let room_id = envelope.room_id().to_owned();
    let payload = match serde_json::to_vec(&envelope) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(room = %room_id, error = %err, "failed to encode envelope");
            return;
        }
    };
    if let Err(err) = publisher.publish(&room_id, &payload).await {
        warn!(room = %room_id, error = %err, "failed to publish envelope");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use crate::models::{Message, MessageStatus, MessageType};

    struct FakeStore {
        fail: bool,
        saved: Mutex<Vec<String>>,
        status_updates: Mutex<Vec<(String, MessageStatus)>>,
    }

    impl FakeStore {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                saved: Mutex::new(Vec::new()),
                status_updates: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MessageStore for FakeStore {
        async fn save(
            &self,
            room_id: &str,
            content: &str,
            kind: MessageType,
        ) -> anyhow::Result<Message> {
            if self.fail {
                anyhow::bail!("store down");
            }
            self.saved.lock().unwrap().push(content.to_owned());
            Ok(Message {
                id: "m1".into(),
                room_id: room_id.to_owned(),
                content: content.to_owned(),
                kind,
                status: MessageStatus::Sent,
                created_at: OffsetDateTime::UNIX_EPOCH,
            })
        }

        async fn update_status(
            &self,
            message_id: &str,
            status: MessageStatus,
        ) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("store down");
            }
            self.status_updates
                .lock()
                .unwrap()
                .push((message_id.to_owned(), status));
            Ok(())
        }

        async fn room_messages(
            &self,
            _room_id: &str,
            _limit: i64,
            _offset: i64,
        ) -> anyhow::Result<Vec<Message>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct FakePublisher {
        published: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl FakePublisher {
        fn take(&self) -> Vec<(String, Vec<u8>)> {
            std::mem::take(&mut self.published.lock().unwrap())
        }
    }

    #[async_trait]
    impl EnvelopePublisher for FakePublisher {
        async fn publish(&self, room_id: &str, payload: &[u8]) -> anyhow::Result<()> {
            self.published
                .lock()
                .unwrap()
                .push((room_id.to_owned(), payload.to_vec()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn send_is_persisted_then_published_as_receive() {
        let store = FakeStore::new(false);
        let publisher = FakePublisher::default();

        let raw = br#"{"event":"message_send","data":{"room_id":"R1","content":"hi","type":"text"}}"#;
        handle_frame(raw, &store, &publisher).await;

        assert_eq!(store.saved.lock().unwrap().as_slice(), ["hi"]);
        let published = publisher.take();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "R1");

        let Envelope::MessageReceive(msg) = serde_json::from_slice(&published[0].1).unwrap()
        else {
            panic!("expected message_receive");
        };
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.room_id, "R1");
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn malformed_frame_is_silently_skipped() {
        let store = FakeStore::new(false);
        let publisher = FakePublisher::default();

        handle_frame(b"not json", &store, &publisher).await;
        handle_frame(br#"{"event":"message_send","data":{}}"#, &store, &publisher).await;

        assert!(store.saved.lock().unwrap().is_empty());
        assert!(publisher.take().is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_suppresses_publication() {
        let store = FakeStore::new(true);
        let publisher = FakePublisher::default();

        let raw = br#"{"event":"message_send","data":{"room_id":"R1","content":"hi","type":"text"}}"#;
        handle_frame(raw, &store, &publisher).await;

        assert!(publisher.take().is_empty());
    }

    #[tokio::test]
    async fn status_update_is_stored_and_republished() {
        let store = FakeStore::new(false);
        let publisher = FakePublisher::default();

        let raw = br#"{"event":"message_status","data":{"id":"m1","room_id":"R1","status":"read"}}"#;
        handle_frame(raw, &store, &publisher).await;

        assert_eq!(
            store.status_updates.lock().unwrap().as_slice(),
            [("m1".to_owned(), MessageStatus::Read)]
        );
        let published = publisher.take();
        assert_eq!(published.len(), 1);
        assert!(matches!(
            serde_json::from_slice(&published[0].1).unwrap(),
            Envelope::MessageStatus(_)
        ));
    }

    #[tokio::test]
    async fn receive_and_presence_frames_from_clients_are_ignored() {
        let store = FakeStore::new(false);
        let publisher = FakePublisher::default();

        let raw = br#"{"event":"user_join","data":{"user_id":"u1","room_id":"R1"}}"#;
        handle_frame(raw, &store, &publisher).await;

        assert!(publisher.take().is_empty());
    }
}
