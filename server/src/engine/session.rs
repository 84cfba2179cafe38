use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::events::{ServerEvent, SessionId};

/// Maximum queued outbound events per session (prevents memory exhaustion
/// from slow clients).
pub const MAX_OUTBOUND_QUEUE: usize = 1024;

/// One live client transport connection, bound to a user identity at
/// handshake time. The session id is broker-assigned; transport-internal
/// identifiers never act as business keys.
#[derive(Debug)]
pub struct UserSession {
    pub id: SessionId,
    pub user_id: String,
    pub display_name: String,
    /// Room ids this session has joined. The disconnect purge walks this
    /// set, so it must mirror the rooms' presence maps at all times.
    rooms: Mutex<HashSet<String>>,
    /// Outbound queue drained by this session's write loop (bounded to
    /// prevent memory exhaustion).
    outbound: mpsc::Sender<ServerEvent>,
    pub connected_at: DateTime<Utc>,
}

impl UserSession {
    pub fn new(
        id: SessionId,
        user_id: String,
        display_name: String,
        outbound: mpsc::Sender<ServerEvent>,
    ) -> Self {
        Self {
            id,
            user_id,
            display_name,
            rooms: Mutex::new(HashSet::new()),
            outbound,
            connected_at: Utc::now(),
        }
    }

    /// Queue an event for this session. Returns false if the connection is
    /// closed or the queue is full (slow client — the event is dropped
    /// rather than blocking the broker).
    pub fn send(&self, event: ServerEvent) -> bool {
        self.outbound.try_send(event).is_ok()
    }

    pub fn track_room(&self, room_id: &str) {
        self.rooms.lock().unwrap().insert(room_id.to_string());
    }

    pub fn untrack_room(&self, room_id: &str) {
        self.rooms.lock().unwrap().remove(room_id);
    }

    /// Snapshot of the joined-room set, taken once by the disconnect purge.
    pub fn joined_rooms(&self) -> Vec<String> {
        self.rooms.lock().unwrap().iter().cloned().collect()
    }
}
