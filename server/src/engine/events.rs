use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ErrorCode;
use super::ledger::{Message, MessageId, Reaction};

/// Unique identifier for a connected session (one per connection, not per
/// user — one user may hold several).
pub type SessionId = Uuid;

/// A session's membership in a room, as broadcast in `updateUsers`.
/// Field names match the original web client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub username: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub status: PresenceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
}

/// One whiteboard stroke segment, relayed verbatim. The broker keeps no
/// canvas state; a session joining mid-drawing sees a blank board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrokeSegment {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub color: String,
    #[serde(rename = "lineWidth")]
    pub line_width: f64,
}

/// Body of a `sendMessage` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDraft {
    pub content: String,
    #[serde(rename = "type", default = "default_message_kind")]
    pub kind: String,
}

fn default_message_kind() -> String {
    "text".to_string()
}

/// Closed set of client→broker events, validated at the channel boundary.
/// A frame that does not deserialize into one of these never reaches the
/// broker. Tag and field names are the wire contract; the call media kind
/// travels as `callType` because `type` is the envelope tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String },

    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: String },

    #[serde(rename_all = "camelCase")]
    SendMessage { room_id: String, message: MessageDraft },

    #[serde(rename_all = "camelCase")]
    FileUploaded {
        room_id: String,
        file_url: String,
        file_type: String,
    },

    #[serde(rename_all = "camelCase")]
    Typing { room_id: String, is_typing: bool },

    #[serde(rename_all = "camelCase")]
    AddReaction {
        room_id: String,
        message_id: MessageId,
        emoji: String,
    },

    #[serde(rename_all = "camelCase")]
    PinMessage {
        room_id: String,
        message_id: MessageId,
    },

    #[serde(rename_all = "camelCase")]
    DeleteMessage {
        room_id: String,
        message_id: MessageId,
    },

    #[serde(rename = "whiteboard-draw", rename_all = "camelCase")]
    WhiteboardDraw {
        room_id: String,
        #[serde(flatten)]
        segment: StrokeSegment,
    },

    #[serde(rename = "whiteboard-clear", rename_all = "camelCase")]
    WhiteboardClear { room_id: String },

    #[serde(rename_all = "camelCase")]
    CallUser {
        target_id: String,
        call_type: String,
        room_id: String,
    },

    #[serde(rename_all = "camelCase")]
    AcceptCall { to_id: String, room_id: String },

    #[serde(rename_all = "camelCase")]
    RejectCall { to_id: String, room_id: String },

    #[serde(rename_all = "camelCase")]
    Offer {
        to_id: String,
        offer: serde_json::Value,
        room_id: String,
    },

    #[serde(rename_all = "camelCase")]
    Answer {
        to_id: String,
        answer: serde_json::Value,
        room_id: String,
    },

    #[serde(rename_all = "camelCase")]
    IceCandidate {
        to_id: String,
        candidate: serde_json::Value,
        room_id: String,
    },

    #[serde(rename_all = "camelCase")]
    EndCall { room_id: String },

    #[serde(rename_all = "camelCase")]
    ScreenShareStarted { room_id: String },

    #[serde(rename_all = "camelCase")]
    ScreenShareStopped { room_id: String },
}

impl ClientEvent {
    /// Wire name of the event, used as the `context` of failure events.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "joinRoom",
            ClientEvent::LeaveRoom { .. } => "leaveRoom",
            ClientEvent::SendMessage { .. } => "sendMessage",
            ClientEvent::FileUploaded { .. } => "fileUploaded",
            ClientEvent::Typing { .. } => "typing",
            ClientEvent::AddReaction { .. } => "addReaction",
            ClientEvent::PinMessage { .. } => "pinMessage",
            ClientEvent::DeleteMessage { .. } => "deleteMessage",
            ClientEvent::WhiteboardDraw { .. } => "whiteboard-draw",
            ClientEvent::WhiteboardClear { .. } => "whiteboard-clear",
            ClientEvent::CallUser { .. } => "callUser",
            ClientEvent::AcceptCall { .. } => "acceptCall",
            ClientEvent::RejectCall { .. } => "rejectCall",
            ClientEvent::Offer { .. } => "offer",
            ClientEvent::Answer { .. } => "answer",
            ClientEvent::IceCandidate { .. } => "iceCandidate",
            ClientEvent::EndCall { .. } => "endCall",
            ClientEvent::ScreenShareStarted { .. } => "screenShareStarted",
            ClientEvent::ScreenShareStopped { .. } => "screenShareStopped",
        }
    }
}

/// Broker→client events. Everything a session can observe flows through
/// this enum; the write loop serializes each variant as one JSON frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    /// One-time ledger snapshot, sent to the joining session only.
    LoadMessages { messages: Vec<Message> },

    /// Full presence list of a room after membership changed.
    #[serde(rename_all = "camelCase")]
    UpdateUsers {
        room_id: String,
        users: Vec<PresenceEntry>,
    },

    #[serde(rename_all = "camelCase")]
    UserJoined { username: String, user_id: String },

    #[serde(rename_all = "camelCase")]
    UserLeft { username: String, user_id: String },

    /// A message was appended to the room's ledger. The message travels
    /// nested: its `type` field (text/image/file) would otherwise collide
    /// with the envelope tag.
    NewMessage { message: Message },

    #[serde(rename_all = "camelCase")]
    UserTyping {
        username: String,
        user_id: String,
        is_typing: bool,
    },

    #[serde(rename_all = "camelCase")]
    ReactionUpdated {
        message_id: MessageId,
        reactions: Vec<Reaction>,
    },

    #[serde(rename_all = "camelCase")]
    MessagePinned {
        message_id: MessageId,
        is_pinned: bool,
    },

    #[serde(rename_all = "camelCase")]
    MessageDeleted { message_id: MessageId },

    #[serde(rename = "whiteboard-draw", rename_all = "camelCase")]
    WhiteboardDraw {
        room_id: String,
        #[serde(flatten)]
        segment: StrokeSegment,
    },

    #[serde(rename = "whiteboard-clear", rename_all = "camelCase")]
    WhiteboardClear { room_id: String },

    #[serde(rename_all = "camelCase")]
    IncomingCall {
        from_id: String,
        from_name: String,
        call_type: String,
        room_id: String,
    },

    #[serde(rename_all = "camelCase")]
    CallAccepted {
        from_id: String,
        from_name: String,
        room_id: String,
    },

    #[serde(rename_all = "camelCase")]
    CallRejected {
        from_id: String,
        from_name: String,
        room_id: String,
    },

    #[serde(rename_all = "camelCase")]
    Offer {
        from_id: String,
        offer: serde_json::Value,
        room_id: String,
    },

    #[serde(rename_all = "camelCase")]
    Answer {
        from_id: String,
        answer: serde_json::Value,
        room_id: String,
    },

    #[serde(rename_all = "camelCase")]
    IceCandidate {
        from_id: String,
        candidate: serde_json::Value,
        room_id: String,
    },

    #[serde(rename_all = "camelCase")]
    UserEndedCall { from_id: String, from_name: String },

    #[serde(rename_all = "camelCase")]
    ScreenShareStarted { from_id: String, from_name: String },

    #[serde(rename_all = "camelCase")]
    ScreenShareStopped { from_id: String, from_name: String },

    /// Typed failure for an operation this session initiated. Replaces the
    /// silent no-ops of the original behavior.
    Error {
        context: String,
        code: ErrorCode,
        message: String,
    },
}
