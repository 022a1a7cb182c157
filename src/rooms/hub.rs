use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::Limits;
use crate::rooms::room::RoomHandle;

/// Process-wide registry of live rooms. The map lock is the only shared-state
/// synchronization in the delivery core; everything past it is message
/// passing.
pub struct Hub {
    rooms: Mutex<HashMap<String, RoomHandle>>,
    limits: Limits,
}

impl Hub {
    pub fn new(limits: Limits) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            limits,
        }
    }

    /// Idempotent per identifier: concurrent first-time lookups resolve to a
    /// single room because creation happens under the map lock.
    pub fn get_or_create(&self, id: &str) -> RoomHandle {
        let mut rooms = self.rooms.lock().expect("room registry lock poisoned");
        rooms
            .entry(id.to_owned())
            .or_insert_with(|| RoomHandle::spawn(id, self.limits.room_broadcast_buffer))
            .clone()
    }

    /// Lookup without creating; the inbound bridge uses this so envelopes for
    /// rooms with no local presence are discarded instead of spawning rooms.
    pub fn lookup(&self, id: &str) -> Option<RoomHandle> {
        self.rooms
            .lock()
            .expect("room registry lock poisoned")
            .get(id)
            .cloned()
    }

    /// Resolve a room for a new connection. The returned guard keeps the room
    /// registered; when the last guard for a room drops, the room is evicted.
    pub fn attach(self: &Arc<Self>, id: &str) -> (RoomHandle, ConnGuard) {
        let room = {
            let mut rooms = self.rooms.lock().expect("room registry lock poisoned");
            let room = rooms
                .entry(id.to_owned())
                .or_insert_with(|| RoomHandle::spawn(id, self.limits.room_broadcast_buffer))
                .clone();
            room.acquire();
            room
        };
        let guard = ConnGuard {
            hub: Arc::clone(self),
            room: room.clone(),
        };
        (room, guard)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().expect("room registry lock poisoned").len()
    }

    fn evict_if_idle(&self, id: &str) {
        let mut rooms = self.rooms.lock().expect("room registry lock poisoned");
        if rooms.get(id).is_some_and(RoomHandle::idle) {
            rooms.remove(id);
            debug!(room = id, "evicted idle room");
        }
    }
}

/// RAII attachment of one connection to a room. Dropping the guard (any
/// endpoint exit path) triggers the remove-when-empty eviction check.
pub struct ConnGuard {
    hub: Arc<Hub>,
    room: RoomHandle,
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        if self.room.release() == 0 {
            self.hub.evict_if_idle(self.room.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> Arc<Hub> {
        Arc::new(Hub::new(Limits::default()))
    }

    #[tokio::test]
    async fn concurrent_get_or_create_builds_one_room() {
        let hub = hub();
        let mut tasks = Vec::new();
        for _ in 0..100 {
            let hub = Arc::clone(&hub);
            tasks.push(tokio::spawn(async move { hub.get_or_create("R") }));
        }

        let first = hub.get_or_create("R");
        for task in tasks {
            assert!(task.await.unwrap().same_room(&first));
        }
        assert_eq!(hub.room_count(), 1);
    }

    #[tokio::test]
    async fn distinct_ids_get_distinct_rooms() {
        let hub = hub();
        let a = hub.get_or_create("a");
        let b = hub.get_or_create("b");
        assert!(!a.same_room(&b));
        assert_eq!(hub.room_count(), 2);
    }

    #[tokio::test]
    async fn lookup_never_creates() {
        let hub = hub();
        assert!(hub.lookup("ghost").is_none());
        assert_eq!(hub.room_count(), 0);
    }

    #[tokio::test]
    async fn room_evicted_when_last_connection_detaches() {
        let hub = hub();
        let (room, first) = hub.attach("R");
        let (_, second) = hub.attach("R");

        drop(first);
        assert!(hub.lookup("R").is_some());

        drop(second);
        assert!(hub.lookup("R").is_none());

        // a later attach gets a fresh room
        let (fresh, _guard) = hub.attach("R");
        assert!(!fresh.same_room(&room));
    }
}
