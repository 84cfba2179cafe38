use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a message. Unique within its room for the life of
/// the room; global uniqueness is not required (Uuid gives it anyway).
pub type MessageId = Uuid;

/// One (user, emoji) pair on a message. The pair is unique within a
/// message's reaction set; applying it again removes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: String,
    pub emoji: String,
}

/// A chat message in a room's ledger. Content is immutable once created;
/// only the pinned flag and the reaction set mutate. Field names are the
/// wire contract the original web client reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub user_id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub is_pinned: bool,
    pub reactions: Vec<Reaction>,
    /// "text", "image", "file", or whatever type the upload collaborator
    /// declared — the broker does not interpret it.
    #[serde(rename = "type")]
    pub kind: String,
}

impl Message {
    pub fn new(user_id: String, display_name: String, content: String, kind: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            user_id,
            display_name,
            created_at: Utc::now(),
            is_pinned: false,
            reactions: Vec::new(),
            kind,
        }
    }
}

/// The ordered, mutable message collection of one room. Append-at-end only;
/// deletion removes in place without renumbering. Purely in-memory, lifetime
/// tied to the room.
#[derive(Debug, Default)]
pub struct Ledger {
    messages: Vec<Message>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message at the end (FIFO arrival order) and return it for
    /// broadcast.
    pub fn append(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        self.messages.last().unwrap()
    }

    /// Toggle the (user, emoji) reaction pair on a message. Returns the
    /// updated reaction set, or None if the message id is unknown.
    pub fn toggle_reaction(
        &mut self,
        message_id: MessageId,
        user_id: &str,
        emoji: &str,
    ) -> Option<Vec<Reaction>> {
        let message = self.messages.iter_mut().find(|m| m.id == message_id)?;

        let existing = message
            .reactions
            .iter()
            .position(|r| r.user_id == user_id && r.emoji == emoji);
        match existing {
            Some(idx) => {
                message.reactions.remove(idx);
            }
            None => message.reactions.push(Reaction {
                user_id: user_id.to_string(),
                emoji: emoji.to_string(),
            }),
        }

        Some(message.reactions.clone())
    }

    /// Toggle the pinned flag. Returns the new state, or None if unknown.
    pub fn toggle_pin(&mut self, message_id: MessageId) -> Option<bool> {
        let message = self.messages.iter_mut().find(|m| m.id == message_id)?;
        message.is_pinned = !message.is_pinned;
        Some(message.is_pinned)
    }

    /// Hard-remove a message. Returns false if the id is unknown.
    pub fn remove(&mut self, message_id: MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != message_id);
        self.messages.len() != before
    }

    /// Ordered copy of the ledger, used for the one-time load on join.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
