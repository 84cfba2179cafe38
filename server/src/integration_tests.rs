//! Integration tests for Roomcast — end-to-end flows driven through the
//! wire-protocol dispatch layer, the way a connected client would exercise
//! the broker.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::engine::broker::{BrokerSettings, RoomBroker};
    use crate::engine::events::{ServerEvent, SessionId};
    use crate::web::app_state::AppState;
    use crate::web::rest_api;
    use crate::web::ws_handler::dispatch;

    // ── Helpers ──────────────────────────────────────────────

    fn setup_broker() -> Arc<RoomBroker> {
        Arc::new(RoomBroker::new(BrokerSettings::default()))
    }

    /// Connect a user and return (session_id, receiver).
    fn connect_user(
        broker: &RoomBroker,
        user_id: &str,
        username: &str,
    ) -> (SessionId, mpsc::Receiver<ServerEvent>) {
        broker.connect(user_id.to_string(), username.to_string()).unwrap()
    }

    /// Feed one client frame through the boundary dispatch, as the read
    /// loop would.
    fn send_frame(broker: &RoomBroker, session_id: SessionId, frame: serde_json::Value) {
        dispatch(broker, session_id, &frame.to_string());
    }

    /// Drain all pending events from a receiver.
    fn drain_events(rx: &mut mpsc::Receiver<ServerEvent>) {
        while rx.try_recv().is_ok() {}
    }

    /// Pop the next pending event, panicking if the queue is empty.
    fn next_event(rx: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
        rx.try_recv().expect("expected a pending event")
    }

    // ═══════════════════════════════════════════════════════════════
    //  The full two-session room scenario
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_full_room_scenario() {
        let broker = setup_broker();
        let (sid_a, mut rx_a) = connect_user(&broker, "u1", "Alice");
        let (sid_b, mut rx_b) = connect_user(&broker, "u2", "Bob");

        send_frame(&broker, sid_a, json!({"type": "joinRoom", "roomId": "study-1"}));
        send_frame(&broker, sid_b, json!({"type": "joinRoom", "roomId": "study-1"}));
        drain_events(&mut rx_a);
        drain_events(&mut rx_b);

        // A sends a text message; B observes it with A's identity.
        send_frame(
            &broker,
            sid_a,
            json!({"type": "sendMessage", "roomId": "study-1",
                   "message": {"content": "hi", "type": "text"}}),
        );
        let message_id = match next_event(&mut rx_b) {
            ServerEvent::NewMessage { message } => {
                assert_eq!(message.content, "hi");
                assert_eq!(message.user_id, "u1");
                assert_eq!(message.display_name, "Alice");
                message.id
            }
            other => panic!("expected newMessage, got {other:?}"),
        };
        drain_events(&mut rx_a);

        // B reacts with 👍; A sees the updated set.
        send_frame(
            &broker,
            sid_b,
            json!({"type": "addReaction", "roomId": "study-1",
                   "messageId": message_id, "emoji": "👍"}),
        );
        match next_event(&mut rx_a) {
            ServerEvent::ReactionUpdated {
                message_id: id,
                reactions,
            } => {
                assert_eq!(id, message_id);
                assert_eq!(reactions.len(), 1);
                assert_eq!(reactions[0].user_id, "u2");
                assert_eq!(reactions[0].emoji, "👍");
            }
            other => panic!("expected reactionUpdated, got {other:?}"),
        }
        drain_events(&mut rx_b);

        // A pins; both observe isPinned = true.
        send_frame(
            &broker,
            sid_a,
            json!({"type": "pinMessage", "roomId": "study-1", "messageId": message_id}),
        );
        for rx in [&mut rx_a, &mut rx_b] {
            match next_event(rx) {
                ServerEvent::MessagePinned {
                    message_id: id,
                    is_pinned,
                } => {
                    assert_eq!(id, message_id);
                    assert!(is_pinned);
                }
                other => panic!("expected messagePinned, got {other:?}"),
            }
        }

        // A deletes; both observe the id, and the snapshot is empty.
        send_frame(
            &broker,
            sid_a,
            json!({"type": "deleteMessage", "roomId": "study-1", "messageId": message_id}),
        );
        for rx in [&mut rx_a, &mut rx_b] {
            match next_event(rx) {
                ServerEvent::MessageDeleted { message_id: id } => assert_eq!(id, message_id),
                other => panic!("expected messageDeleted, got {other:?}"),
            }
        }
        assert!(broker.snapshot("study-1").is_empty());
    }

    // ═══════════════════════════════════════════════════════════════
    //  Ordering and timestamps
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_messages_from_one_source_arrive_in_order() {
        let broker = setup_broker();
        let (sid_a, mut rx_a) = connect_user(&broker, "u1", "Alice");
        let (sid_b, mut rx_b) = connect_user(&broker, "u2", "Bob");
        send_frame(&broker, sid_a, json!({"type": "joinRoom", "roomId": "r1"}));
        send_frame(&broker, sid_b, json!({"type": "joinRoom", "roomId": "r1"}));
        drain_events(&mut rx_a);
        drain_events(&mut rx_b);

        for content in ["one", "two", "three"] {
            send_frame(
                &broker,
                sid_a,
                json!({"type": "sendMessage", "roomId": "r1",
                       "message": {"content": content}}),
            );
        }

        let mut observed = Vec::new();
        let mut last_timestamp = None;
        while let Ok(event) = rx_b.try_recv() {
            if let ServerEvent::NewMessage { message } = event {
                if let Some(prev) = last_timestamp {
                    assert!(message.created_at >= prev, "timestamps regressed");
                }
                last_timestamp = Some(message.created_at);
                observed.push(message.content);
            }
        }
        assert_eq!(observed, vec!["one", "two", "three"]);

        // The ledger snapshot shows the same arrival order.
        let snapshot = broker.snapshot("r1");
        let contents: Vec<&str> = snapshot.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    // ═══════════════════════════════════════════════════════════════
    //  Presence lifecycle
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_presence_excludes_departed_sessions() {
        let broker = setup_broker();
        let (sid_a, mut rx_a) = connect_user(&broker, "u1", "Alice");
        let (sid_b, mut rx_b) = connect_user(&broker, "u2", "Bob");
        let (sid_c, mut rx_c) = connect_user(&broker, "u3", "Cara");
        for sid in [sid_a, sid_b, sid_c] {
            send_frame(&broker, sid, json!({"type": "joinRoom", "roomId": "r1"}));
        }
        drain_events(&mut rx_a);
        drain_events(&mut rx_b);
        drain_events(&mut rx_c);

        // Explicit leave.
        send_frame(&broker, sid_b, json!({"type": "leaveRoom", "roomId": "r1"}));
        match next_event(&mut rx_a) {
            ServerEvent::UpdateUsers { users, .. } => {
                assert_eq!(users.len(), 2);
                assert!(users.iter().all(|u| u.user_id != "u2"));
            }
            other => panic!("expected updateUsers, got {other:?}"),
        }
        drain_events(&mut rx_a);
        drain_events(&mut rx_c);

        // Abrupt disconnect.
        broker.disconnect(sid_c);
        match next_event(&mut rx_a) {
            ServerEvent::UpdateUsers { users, .. } => {
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].user_id, "u1");
            }
            other => panic!("expected updateUsers, got {other:?}"),
        }
        match next_event(&mut rx_a) {
            ServerEvent::UserLeft { user_id, .. } => assert_eq!(user_id, "u3"),
            other => panic!("expected userLeft, got {other:?}"),
        }

        let presence = broker.presence("r1");
        assert_eq!(presence.len(), 1);
        assert_eq!(presence[0].user_id, "u1");
    }

    // ═══════════════════════════════════════════════════════════════
    //  Typed failure surfacing at the boundary
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_call_to_absent_identity_fails_explicitly() {
        let broker = setup_broker();
        let (sid_a, mut rx_a) = connect_user(&broker, "u1", "Alice");

        send_frame(
            &broker,
            sid_a,
            json!({"type": "callUser", "targetId": "u2",
                   "callType": "video", "roomId": "study-1"}),
        );

        match next_event(&mut rx_a) {
            ServerEvent::Error { context, message, .. } => {
                assert_eq!(context, "callUser");
                assert_eq!(message, "target user not found");
            }
            other => panic!("expected error event, got {other:?}"),
        }
        assert!(rx_a.try_recv().is_err(), "no further delivery expected");
    }

    #[tokio::test]
    async fn test_reaction_on_unknown_message_fails_explicitly() {
        let broker = setup_broker();
        let (sid_a, mut rx_a) = connect_user(&broker, "u1", "Alice");
        send_frame(&broker, sid_a, json!({"type": "joinRoom", "roomId": "r1"}));
        drain_events(&mut rx_a);

        send_frame(
            &broker,
            sid_a,
            json!({"type": "addReaction", "roomId": "r1",
                   "messageId": uuid::Uuid::new_v4(), "emoji": "👍"}),
        );

        match next_event(&mut rx_a) {
            ServerEvent::Error { context, .. } => assert_eq!(context, "addReaction"),
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_rejected_at_boundary() {
        let broker = setup_broker();
        let (sid_a, mut rx_a) = connect_user(&broker, "u1", "Alice");

        dispatch(&broker, sid_a, "not json at all");
        match next_event(&mut rx_a) {
            ServerEvent::Error { context, .. } => assert_eq!(context, "parse"),
            other => panic!("expected error event, got {other:?}"),
        }

        dispatch(&broker, sid_a, r#"{"type": "launchMissiles"}"#);
        match next_event(&mut rx_a) {
            ServerEvent::Error { context, .. } => assert_eq!(context, "parse"),
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_message_rejected_not_dropped_silently() {
        let broker = setup_broker();
        let (sid_a, mut rx_a) = connect_user(&broker, "u1", "Alice");
        send_frame(&broker, sid_a, json!({"type": "joinRoom", "roomId": "r1"}));
        drain_events(&mut rx_a);

        send_frame(
            &broker,
            sid_a,
            json!({"type": "sendMessage", "roomId": "r1", "message": {"content": ""}}),
        );

        match next_event(&mut rx_a) {
            ServerEvent::Error { context, .. } => assert_eq!(context, "sendMessage"),
            other => panic!("expected error event, got {other:?}"),
        }
        assert!(broker.snapshot("r1").is_empty());
    }

    // ═══════════════════════════════════════════════════════════════
    //  Relays
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_signaling_handshake_relays_between_peers() {
        let broker = setup_broker();
        let (sid_a, mut rx_a) = connect_user(&broker, "u1", "Alice");
        let (sid_b, mut rx_b) = connect_user(&broker, "u2", "Bob");

        send_frame(
            &broker,
            sid_a,
            json!({"type": "callUser", "targetId": "u2",
                   "callType": "video", "roomId": "study-1"}),
        );
        match next_event(&mut rx_b) {
            ServerEvent::IncomingCall {
                from_id,
                from_name,
                call_type,
                ..
            } => {
                assert_eq!(from_id, "u1");
                assert_eq!(from_name, "Alice");
                assert_eq!(call_type, "video");
            }
            other => panic!("expected incomingCall, got {other:?}"),
        }

        send_frame(
            &broker,
            sid_b,
            json!({"type": "acceptCall", "toId": "u1", "roomId": "study-1"}),
        );
        match next_event(&mut rx_a) {
            ServerEvent::CallAccepted { from_id, .. } => assert_eq!(from_id, "u2"),
            other => panic!("expected callAccepted, got {other:?}"),
        }

        // SDP and ICE payloads pass through untouched.
        send_frame(
            &broker,
            sid_a,
            json!({"type": "offer", "toId": "u2", "roomId": "study-1",
                   "offer": {"sdp": "v=0...", "sdpType": "offer"}}),
        );
        match next_event(&mut rx_b) {
            ServerEvent::Offer { from_id, offer, .. } => {
                assert_eq!(from_id, "u1");
                assert_eq!(offer["sdp"], "v=0...");
            }
            other => panic!("expected offer, got {other:?}"),
        }

        send_frame(
            &broker,
            sid_b,
            json!({"type": "iceCandidate", "toId": "u1", "roomId": "study-1",
                   "candidate": {"candidate": "candidate:0 1 UDP ...", "sdpMLineIndex": 0}}),
        );
        match next_event(&mut rx_a) {
            ServerEvent::IceCandidate { candidate, .. } => {
                assert_eq!(candidate["sdpMLineIndex"], 0);
            }
            other => panic!("expected iceCandidate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_whiteboard_relay_excludes_artist() {
        let broker = setup_broker();
        let (sid_a, mut rx_a) = connect_user(&broker, "u1", "Alice");
        let (sid_b, mut rx_b) = connect_user(&broker, "u2", "Bob");
        send_frame(&broker, sid_a, json!({"type": "joinRoom", "roomId": "r1"}));
        send_frame(&broker, sid_b, json!({"type": "joinRoom", "roomId": "r1"}));
        drain_events(&mut rx_a);
        drain_events(&mut rx_b);

        send_frame(
            &broker,
            sid_a,
            json!({"type": "whiteboard-draw", "roomId": "r1",
                   "x0": 0.0, "y0": 0.0, "x1": 5.0, "y1": 5.0,
                   "color": "#0000ff", "lineWidth": 3.0}),
        );
        assert!(rx_a.try_recv().is_err());
        match next_event(&mut rx_b) {
            ServerEvent::WhiteboardDraw { segment, .. } => {
                assert_eq!(segment.color, "#0000ff");
                assert_eq!(segment.line_width, 3.0);
            }
            other => panic!("expected whiteboard-draw, got {other:?}"),
        }

        send_frame(&broker, sid_b, json!({"type": "whiteboard-clear", "roomId": "r1"}));
        assert!(rx_b.try_recv().is_err());
        match next_event(&mut rx_a) {
            ServerEvent::WhiteboardClear { room_id } => assert_eq!(room_id, "r1"),
            other => panic!("expected whiteboard-clear, got {other:?}"),
        }
    }

    // ═══════════════════════════════════════════════════════════════
    //  HTTP read surface
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_http_snapshots_reflect_broker_state() {
        let broker = setup_broker();
        let state = Arc::new(AppState {
            broker: broker.clone(),
        });

        let (sid_a, _rx_a) = connect_user(&broker, "u1", "Alice");
        send_frame(&broker, sid_a, json!({"type": "joinRoom", "roomId": "r1"}));
        send_frame(
            &broker,
            sid_a,
            json!({"type": "sendMessage", "roomId": "r1", "message": {"content": "hello"}}),
        );

        let presence =
            rest_api::get_room_presence(State(state.clone()), Path("r1".to_string())).await;
        assert_eq!(presence.0.len(), 1);
        assert_eq!(presence.0[0].user_id, "u1");

        let messages =
            rest_api::get_room_messages(State(state.clone()), Path("r1".to_string())).await;
        assert_eq!(messages.0.len(), 1);
        assert_eq!(messages.0[0].content, "hello");

        // Unknown rooms read as empty, not as errors.
        let empty = rest_api::get_room_presence(State(state), Path("ghost".to_string())).await;
        assert!(empty.0.is_empty());
    }
}
