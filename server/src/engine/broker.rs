use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::BrokerError;
use super::events::{PresenceEntry, PresenceStatus, ServerEvent, SessionId, StrokeSegment};
use super::ledger::{Message, MessageId, Reaction};
use super::rate_limiter::RateLimiter;
use super::room::RoomState;
use super::session::{MAX_OUTBOUND_QUEUE, UserSession};
use super::validation;

/// Tunables handed to the broker at construction. `config::RoomcastConfig`
/// produces one from the TOML file; tests use the defaults.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub max_message_length: usize,
    /// Drop a room (and its ledger) once its last member leaves. Off by
    /// default: the original clients expect history to survive a rejoin.
    pub evict_empty_rooms: bool,
    /// Message rate limit: burst capacity per identity.
    pub message_burst: u32,
    /// Message rate limit: seconds to refill one token.
    pub message_refill_seconds: f64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            max_message_length: validation::DEFAULT_MAX_MESSAGE_LENGTH,
            evict_empty_rooms: false,
            message_burst: 10,
            message_refill_seconds: 1.0,
        }
    }
}

/// The stateful hub of the whole system: session registry, room membership,
/// per-room message ledgers, and the fan-out router, plus the stateless
/// whiteboard and call-signaling relays layered on the same fan-out. All
/// state is in-memory; nothing survives the process.
///
/// Transport adapters call into this and never touch the maps directly.
/// Every read-then-write of a room runs under that room's exclusive map
/// entry, which serializes competing mutations (a reaction toggle can never
/// race a delete into resurrecting a message).
pub struct RoomBroker {
    /// All currently connected sessions, keyed by session id.
    sessions: DashMap<SessionId, Arc<UserSession>>,
    /// All rooms ever joined, keyed by the opaque client-supplied room id.
    rooms: DashMap<String, RoomState>,
    /// Identity index for targeted relay: user id -> session ids in
    /// admission order (newest last). A user connected from two transports
    /// has two entries; nothing is evicted on reconnect.
    sessions_by_user: DashMap<String, Vec<SessionId>>,
    /// Per-identity message rate limiter.
    message_limiter: RateLimiter,
    settings: BrokerSettings,
}

impl RoomBroker {
    pub fn new(settings: BrokerSettings) -> Self {
        Self {
            sessions: DashMap::new(),
            rooms: DashMap::new(),
            sessions_by_user: DashMap::new(),
            message_limiter: RateLimiter::new(
                settings.message_burst,
                settings.message_refill_seconds,
            ),
            settings,
        }
    }

    // ── Connection registry ─────────────────────────────────────────

    /// Admit a new session. Returns the session id and the receiver its
    /// write loop drains. Rejects empty or oversized identity/display name.
    pub fn connect(
        &self,
        user_id: String,
        display_name: String,
    ) -> Result<(SessionId, mpsc::Receiver<ServerEvent>), BrokerError> {
        validation::validate_identity(&user_id).map_err(BrokerError::Rejected)?;
        validation::validate_display_name(&display_name).map_err(BrokerError::Rejected)?;

        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(MAX_OUTBOUND_QUEUE);

        let session = Arc::new(UserSession::new(
            session_id,
            user_id.clone(),
            display_name,
            tx,
        ));

        self.sessions.insert(session_id, session);
        self.sessions_by_user
            .entry(user_id)
            .or_default()
            .push(session_id);

        info!(%session_id, "session connected");
        Ok((session_id, rx))
    }

    /// Release a session and purge its presence from every joined room.
    /// Idempotent; safe to call for an already-released id.
    ///
    /// The session is removed from the registry before any room is touched,
    /// so a session mid-disconnect can never join a new room, and the purge
    /// visits each room from the join-set snapshot exactly once.
    pub fn disconnect(&self, session_id: SessionId) {
        let Some((_, session)) = self.sessions.remove(&session_id) else {
            return;
        };

        let mut identity_gone = false;
        if let Some(mut ids) = self.sessions_by_user.get_mut(&session.user_id) {
            ids.retain(|id| *id != session_id);
            identity_gone = ids.is_empty();
        }
        if identity_gone {
            self.sessions_by_user
                .remove_if(&session.user_id, |_, ids| ids.is_empty());
            self.message_limiter.forget(&session.user_id);
        }

        for room_id in session.joined_rooms() {
            let users = match self.rooms.get_mut(&room_id) {
                Some(mut room) => {
                    if room.members.remove(&session_id).is_none() {
                        continue;
                    }
                    room.presence_list()
                }
                None => continue,
            };

            self.broadcast_to_room(
                &room_id,
                &ServerEvent::UpdateUsers {
                    room_id: room_id.clone(),
                    users,
                },
                None,
            );
            self.broadcast_to_room(
                &room_id,
                &ServerEvent::UserLeft {
                    username: session.display_name.clone(),
                    user_id: session.user_id.clone(),
                },
                None,
            );
            self.maybe_evict(&room_id);
        }

        info!(%session_id, user_id = %session.user_id, "session disconnected");
    }

    /// Resolve a user identity to a deliverable session for targeted relay.
    /// Tie-break when the identity holds several concurrent sessions: the
    /// most recently admitted one wins (the index keeps admission order).
    pub fn resolve(&self, user_id: &str) -> Option<SessionId> {
        self.sessions_by_user
            .get(user_id)
            .and_then(|ids| ids.last().copied())
    }

    pub fn get_session(&self, session_id: SessionId) -> Option<Arc<UserSession>> {
        self.sessions.get(&session_id).map(|s| s.clone())
    }

    // ── Room membership ─────────────────────────────────────────────

    /// Join a room, creating it if absent. Rejoining with the same session
    /// overwrites the presence entry. The joiner alone receives the ledger
    /// snapshot; the whole room (joiner included) gets the presence fanout.
    pub fn join_room(&self, session_id: SessionId, room_id: &str) -> Result<(), BrokerError> {
        validation::validate_room_id(room_id).map_err(BrokerError::Rejected)?;
        let session = self.session(session_id)?;

        session.track_room(room_id);
        let (history, users) = {
            let mut room = self
                .rooms
                .entry(room_id.to_string())
                .or_insert_with(|| RoomState::new(room_id.to_string()));
            room.members.insert(
                session_id,
                PresenceEntry {
                    username: session.display_name.clone(),
                    user_id: session.user_id.clone(),
                    status: PresenceStatus::Online,
                },
            );
            (room.ledger.snapshot(), room.presence_list())
        };

        session.send(ServerEvent::LoadMessages { messages: history });
        self.broadcast_to_room(
            room_id,
            &ServerEvent::UpdateUsers {
                room_id: room_id.to_string(),
                users,
            },
            None,
        );
        self.broadcast_to_room(
            room_id,
            &ServerEvent::UserJoined {
                username: session.display_name.clone(),
                user_id: session.user_id.clone(),
            },
            None,
        );

        info!(user_id = %session.user_id, %room_id, "joined room");
        Ok(())
    }

    /// Remove the session's presence from a room. Leaving a room the
    /// session never joined is a no-op, not an error.
    pub fn leave_room(&self, session_id: SessionId, room_id: &str) -> Result<(), BrokerError> {
        let session = self.session(session_id)?;
        session.untrack_room(room_id);

        let users = match self.rooms.get_mut(room_id) {
            Some(mut room) => {
                if room.members.remove(&session_id).is_none() {
                    return Ok(());
                }
                room.presence_list()
            }
            None => return Ok(()),
        };

        self.broadcast_to_room(
            room_id,
            &ServerEvent::UpdateUsers {
                room_id: room_id.to_string(),
                users,
            },
            None,
        );
        self.broadcast_to_room(
            room_id,
            &ServerEvent::UserLeft {
                username: session.display_name.clone(),
                user_id: session.user_id.clone(),
            },
            None,
        );
        self.maybe_evict(room_id);

        info!(user_id = %session.user_id, %room_id, "left room");
        Ok(())
    }

    /// Presence snapshot. An unknown room reads as empty — implicit
    /// creation makes the two indistinguishable.
    pub fn presence(&self, room_id: &str) -> Vec<PresenceEntry> {
        self.rooms
            .get(room_id)
            .map(|room| room.presence_list())
            .unwrap_or_default()
    }

    // ── Message ledger ──────────────────────────────────────────────

    /// Append a message and broadcast `newMessage` to the room. Empty
    /// content is rejected (surfaced to the sender, not silently dropped).
    pub fn send_message(
        &self,
        session_id: SessionId,
        room_id: &str,
        content: &str,
        kind: &str,
    ) -> Result<Message, BrokerError> {
        validation::validate_room_id(room_id).map_err(BrokerError::Rejected)?;
        let session = self.session(session_id)?;
        validation::validate_message(content, self.settings.max_message_length)
            .map_err(BrokerError::Rejected)?;
        if !self.message_limiter.allow(&session.user_id) {
            return Err(BrokerError::Rejected("rate limit exceeded, slow down".into()));
        }

        self.append_and_broadcast(
            room_id,
            Message::new(
                session.user_id.clone(),
                session.display_name.clone(),
                content.to_string(),
                kind.to_string(),
            ),
        )
    }

    /// Append a message whose content is the URL returned by the upload
    /// collaborator. The declared type is stored uninterpreted; an empty
    /// declaration falls back to "file".
    pub fn file_message(
        &self,
        session_id: SessionId,
        room_id: &str,
        file_url: &str,
        file_type: &str,
    ) -> Result<Message, BrokerError> {
        validation::validate_room_id(room_id).map_err(BrokerError::Rejected)?;
        let session = self.session(session_id)?;
        if file_url.trim().is_empty() {
            return Err(BrokerError::Rejected("file url cannot be empty".into()));
        }
        if !self.message_limiter.allow(&session.user_id) {
            return Err(BrokerError::Rejected("rate limit exceeded, slow down".into()));
        }

        let kind = if file_type.trim().is_empty() {
            "file"
        } else {
            file_type
        };
        self.append_and_broadcast(
            room_id,
            Message::new(
                session.user_id.clone(),
                session.display_name.clone(),
                file_url.to_string(),
                kind.to_string(),
            ),
        )
    }

    fn append_and_broadcast(
        &self,
        room_id: &str,
        message: Message,
    ) -> Result<Message, BrokerError> {
        let message = {
            let mut room = self
                .rooms
                .entry(room_id.to_string())
                .or_insert_with(|| RoomState::new(room_id.to_string()));
            room.ledger.append(message).clone()
        };

        self.broadcast_to_room(
            room_id,
            &ServerEvent::NewMessage {
                message: message.clone(),
            },
            None,
        );
        debug!(%room_id, message_id = %message.id, "message appended");
        Ok(message)
    }

    /// Toggle a (user, emoji) reaction pair and broadcast the updated set.
    pub fn toggle_reaction(
        &self,
        session_id: SessionId,
        room_id: &str,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<Vec<Reaction>, BrokerError> {
        let session = self.session(session_id)?;
        validation::validate_emoji(emoji).map_err(BrokerError::Rejected)?;

        let reactions = {
            let mut room = self
                .rooms
                .get_mut(room_id)
                .ok_or(BrokerError::NotFound("room"))?;
            room.ledger
                .toggle_reaction(message_id, &session.user_id, emoji)
                .ok_or(BrokerError::NotFound("message"))?
        };

        self.broadcast_to_room(
            room_id,
            &ServerEvent::ReactionUpdated {
                message_id,
                reactions: reactions.clone(),
            },
            None,
        );
        Ok(reactions)
    }

    /// Toggle a message's pinned flag and broadcast the new state.
    pub fn toggle_pin(&self, room_id: &str, message_id: MessageId) -> Result<bool, BrokerError> {
        let is_pinned = {
            let mut room = self
                .rooms
                .get_mut(room_id)
                .ok_or(BrokerError::NotFound("room"))?;
            room.ledger
                .toggle_pin(message_id)
                .ok_or(BrokerError::NotFound("message"))?
        };

        self.broadcast_to_room(
            room_id,
            &ServerEvent::MessagePinned {
                message_id,
                is_pinned,
            },
            None,
        );
        Ok(is_pinned)
    }

    /// Hard-remove a message from the ledger and broadcast the deletion.
    pub fn delete_message(
        &self,
        room_id: &str,
        message_id: MessageId,
    ) -> Result<(), BrokerError> {
        {
            let mut room = self
                .rooms
                .get_mut(room_id)
                .ok_or(BrokerError::NotFound("room"))?;
            if !room.ledger.remove(message_id) {
                return Err(BrokerError::NotFound("message"));
            }
        }

        self.broadcast_to_room(room_id, &ServerEvent::MessageDeleted { message_id }, None);
        Ok(())
    }

    /// Ledger snapshot, used for the one-time load on join and the HTTP
    /// read surface.
    pub fn snapshot(&self, room_id: &str) -> Vec<Message> {
        self.rooms
            .get(room_id)
            .map(|room| room.ledger.snapshot())
            .unwrap_or_default()
    }

    // ── Typing indicator ────────────────────────────────────────────

    /// Typing indicators go to everyone in the room except the typist.
    pub fn typing(
        &self,
        session_id: SessionId,
        room_id: &str,
        is_typing: bool,
    ) -> Result<(), BrokerError> {
        let session = self.session(session_id)?;
        self.broadcast_to_room(
            room_id,
            &ServerEvent::UserTyping {
                username: session.display_name.clone(),
                user_id: session.user_id.clone(),
                is_typing,
            },
            Some(session_id),
        );
        Ok(())
    }

    // ── Whiteboard relay ────────────────────────────────────────────

    /// Relay one stroke segment to the room, excluding the drawer. No
    /// stroke history is kept server-side.
    pub fn whiteboard_draw(
        &self,
        session_id: SessionId,
        room_id: &str,
        segment: StrokeSegment,
    ) -> Result<(), BrokerError> {
        self.session(session_id)?;
        self.broadcast_to_room(
            room_id,
            &ServerEvent::WhiteboardDraw {
                room_id: room_id.to_string(),
                segment,
            },
            Some(session_id),
        );
        Ok(())
    }

    /// Relay a canvas clear to the room, excluding the sender.
    pub fn whiteboard_clear(
        &self,
        session_id: SessionId,
        room_id: &str,
    ) -> Result<(), BrokerError> {
        self.session(session_id)?;
        self.broadcast_to_room(
            room_id,
            &ServerEvent::WhiteboardClear {
                room_id: room_id.to_string(),
            },
            Some(session_id),
        );
        Ok(())
    }

    // ── Call signaling relay ────────────────────────────────────────

    /// Ring a user. The callee is resolved by identity, not by room; an
    /// identity with no live session is a typed failure back to the caller.
    pub fn call_user(
        &self,
        session_id: SessionId,
        target_id: &str,
        call_type: String,
        room_id: String,
    ) -> Result<(), BrokerError> {
        let session = self.session(session_id)?;
        self.relay_to_user(
            target_id,
            ServerEvent::IncomingCall {
                from_id: session.user_id.clone(),
                from_name: session.display_name.clone(),
                call_type,
                room_id,
            },
        )
    }

    pub fn accept_call(
        &self,
        session_id: SessionId,
        to_id: &str,
        room_id: String,
    ) -> Result<(), BrokerError> {
        let session = self.session(session_id)?;
        self.relay_to_user(
            to_id,
            ServerEvent::CallAccepted {
                from_id: session.user_id.clone(),
                from_name: session.display_name.clone(),
                room_id,
            },
        )
    }

    pub fn reject_call(
        &self,
        session_id: SessionId,
        to_id: &str,
        room_id: String,
    ) -> Result<(), BrokerError> {
        let session = self.session(session_id)?;
        self.relay_to_user(
            to_id,
            ServerEvent::CallRejected {
                from_id: session.user_id.clone(),
                from_name: session.display_name.clone(),
                room_id,
            },
        )
    }

    /// SDP offers/answers and ICE candidates are relayed uninterpreted,
    /// annotated with the sender's identity.
    pub fn relay_offer(
        &self,
        session_id: SessionId,
        to_id: &str,
        offer: serde_json::Value,
        room_id: String,
    ) -> Result<(), BrokerError> {
        let session = self.session(session_id)?;
        self.relay_to_user(
            to_id,
            ServerEvent::Offer {
                from_id: session.user_id.clone(),
                offer,
                room_id,
            },
        )
    }

    pub fn relay_answer(
        &self,
        session_id: SessionId,
        to_id: &str,
        answer: serde_json::Value,
        room_id: String,
    ) -> Result<(), BrokerError> {
        let session = self.session(session_id)?;
        self.relay_to_user(
            to_id,
            ServerEvent::Answer {
                from_id: session.user_id.clone(),
                answer,
                room_id,
            },
        )
    }

    pub fn relay_ice_candidate(
        &self,
        session_id: SessionId,
        to_id: &str,
        candidate: serde_json::Value,
        room_id: String,
    ) -> Result<(), BrokerError> {
        let session = self.session(session_id)?;
        self.relay_to_user(
            to_id,
            ServerEvent::IceCandidate {
                from_id: session.user_id.clone(),
                candidate,
                room_id,
            },
        )
    }

    /// Hang-up informs the whole room (minus the sender), not just one
    /// peer — group calls share the room.
    pub fn end_call(&self, session_id: SessionId, room_id: &str) -> Result<(), BrokerError> {
        let session = self.session(session_id)?;
        self.broadcast_to_room(
            room_id,
            &ServerEvent::UserEndedCall {
                from_id: session.user_id.clone(),
                from_name: session.display_name.clone(),
            },
            Some(session_id),
        );
        Ok(())
    }

    pub fn screen_share_started(
        &self,
        session_id: SessionId,
        room_id: &str,
    ) -> Result<(), BrokerError> {
        let session = self.session(session_id)?;
        self.broadcast_to_room(
            room_id,
            &ServerEvent::ScreenShareStarted {
                from_id: session.user_id.clone(),
                from_name: session.display_name.clone(),
            },
            Some(session_id),
        );
        Ok(())
    }

    pub fn screen_share_stopped(
        &self,
        session_id: SessionId,
        room_id: &str,
    ) -> Result<(), BrokerError> {
        let session = self.session(session_id)?;
        self.broadcast_to_room(
            room_id,
            &ServerEvent::ScreenShareStopped {
                from_id: session.user_id.clone(),
                from_name: session.display_name.clone(),
            },
            Some(session_id),
        );
        Ok(())
    }

    // ── Fan-out ─────────────────────────────────────────────────────

    /// Deliver an event to every session currently in the room (the live
    /// membership view, not a cached list), optionally excluding one.
    fn broadcast_to_room(&self, room_id: &str, event: &ServerEvent, exclude: Option<SessionId>) {
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };

        for member_id in room.members.keys() {
            if Some(*member_id) == exclude {
                continue;
            }
            if let Some(session) = self.sessions.get(member_id)
                && !session.send(event.clone())
            {
                warn!(%member_id, "failed to queue event for session (closed or full)");
            }
        }
    }

    /// Deliver an event to exactly one session. Silently drops if the
    /// session is no longer connected.
    pub fn send_to_session(&self, session_id: SessionId, event: ServerEvent) -> bool {
        match self.sessions.get(&session_id) {
            Some(session) => session.send(event),
            None => false,
        }
    }

    fn relay_to_user(&self, to_id: &str, event: ServerEvent) -> Result<(), BrokerError> {
        let target = self
            .resolve(to_id)
            .ok_or(BrokerError::NotFound("target user"))?;
        self.send_to_session(target, event);
        Ok(())
    }

    fn session(&self, session_id: SessionId) -> Result<Arc<UserSession>, BrokerError> {
        self.sessions
            .get(&session_id)
            .map(|s| s.clone())
            .ok_or(BrokerError::NotFound("session"))
    }

    fn maybe_evict(&self, room_id: &str) {
        if self.settings.evict_empty_rooms {
            self.rooms.remove_if(room_id, |_, room| room.members.is_empty());
        }
    }
}
