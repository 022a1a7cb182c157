use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

/// Commands consumed by a room's event loop. Membership is touched nowhere
/// else, so the loop needs no locking.
pub(crate) enum RoomCommand {
    Register {
        client_id: Uuid,
        sender: mpsc::Sender<Utf8Bytes>,
    },
    Unregister {
        client_id: Uuid,
    },
    Broadcast(Utf8Bytes),
    Occupancy(oneshot::Sender<usize>),
}

/// Cheap handle onto one room's command mailbox. The room task exits once
/// every handle is dropped.
#[derive(Clone)]
pub struct RoomHandle {
    id: Arc<str>,
    tx: mpsc::Sender<RoomCommand>,
    conns: Arc<AtomicUsize>,
}

impl RoomHandle {
    pub(crate) fn spawn(id: &str, command_buffer: usize) -> RoomHandle {
        let (tx, rx) = mpsc::channel(command_buffer);
        let handle = RoomHandle {
            id: Arc::from(id),
            tx,
            conns: Arc::new(AtomicUsize::new(0)),
        };
        tokio::spawn(run(handle.id.clone(), rx));
        handle
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Two handles refer to the same room iff they share a command mailbox.
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }

    pub async fn register(&self, client_id: Uuid, sender: mpsc::Sender<Utf8Bytes>) {
        let _ = self.tx.send(RoomCommand::Register { client_id, sender }).await;
    }

    pub async fn unregister(&self, client_id: Uuid) {
        let _ = self.tx.send(RoomCommand::Unregister { client_id }).await;
    }

    /// Non-blocking submission; a full room mailbox drops the message rather
    /// than stalling the caller.
    pub fn broadcast(&self, payload: Utf8Bytes) {
        match self.tx.try_send(RoomCommand::Broadcast(payload)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(room = %self.id, "broadcast queue full, dropping message");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(room = %self.id, "broadcast to stopped room");
            }
        }
    }

    /// Current membership size, as seen by the event loop. Also serves as an
    /// ordering barrier: the reply comes after every previously submitted
    /// command has been processed.
    pub async fn occupancy(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(RoomCommand::Occupancy(reply)).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub(crate) fn acquire(&self) {
        self.conns.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns the number of attached connections remaining.
    pub(crate) fn release(&self) -> usize {
        self.conns.fetch_sub(1, Ordering::SeqCst) - 1
    }

    pub(crate) fn idle(&self) -> bool {
        self.conns.load(Ordering::SeqCst) == 0
    }
}

async fn run(id: Arc<str>, mut rx: mpsc::Receiver<RoomCommand>) {
    let mut members: HashMap<Uuid, mpsc::Sender<Utf8Bytes>> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RoomCommand::Register { client_id, sender } => {
                members.insert(client_id, sender);
                debug!(room = %id, client = %client_id, "client connected");
            }
            RoomCommand::Unregister { client_id } => {
                if members.remove(&client_id).is_some() {
                    debug!(room = %id, client = %client_id, "client disconnected");
                }
            }
            RoomCommand::Broadcast(payload) => {
                members.retain(|client_id, sender| match sender.try_send(payload.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        // slow consumer: close its mailbox instead of stalling
                        // delivery to everyone else
                        warn!(room = %id, client = %client_id, "outbound mailbox full, dropping client");
                        false
                    }
                    Err(TrySendError::Closed(_)) => false,
                });
            }
            RoomCommand::Occupancy(reply) => {
                let _ = reply.send(members.len());
            }
        }
    }

    debug!(room = %id, "room loop stopped");
}
