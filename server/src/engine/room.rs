use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::events::{PresenceEntry, SessionId};
use super::ledger::Ledger;

/// In-memory state for a single room: who is present and what was said.
/// Created implicitly on first join; eviction of empty rooms is a broker
/// policy, not a property of the room itself.
#[derive(Debug)]
pub struct RoomState {
    pub id: String,
    /// Presence keyed by session id. One user connected twice holds two
    /// entries; the model deduplicates by session, never by identity.
    pub members: HashMap<SessionId, PresenceEntry>,
    pub ledger: Ledger,
    pub created_at: DateTime<Utc>,
}

impl RoomState {
    pub fn new(id: String) -> Self {
        Self {
            id,
            members: HashMap::new(),
            ledger: Ledger::new(),
            created_at: Utc::now(),
        }
    }

    /// Presence snapshot for an `updateUsers` broadcast.
    pub fn presence_list(&self) -> Vec<PresenceEntry> {
        self.members.values().cloned().collect()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}
