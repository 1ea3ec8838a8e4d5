//! End-to-end tests. Real WebSocket clients drive the full stack:
//! hello, matchmaking, chat, presence, and teardown.

use std::time::Duration;

use duet_protocol::{
    ClientEvent, Envelope, Gender, PartnerFilter, PartnerGender, RoomId,
    RoomState, SeekerProfile, ServerEvent, Theme, UserId, PROTOCOL_VERSION,
};
use duet_server::DuetServer;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn profile() -> SeekerProfile {
    SeekerProfile {
        gender: Gender::Male,
        age: 25,
    }
}

fn filter() -> PartnerFilter {
    PartnerFilter {
        gender: PartnerGender::Female,
        min_age: 18,
        max_age: 30,
    }
}

/// Starts a server on a random port and returns its address.
async fn start_server() -> String {
    let server = DuetServer::builder()
        .bind("127.0.0.1:0")
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

fn encode_event(seq: u64, event: ClientEvent) -> Message {
    let envelope = Envelope {
        seq,
        timestamp: 0,
        event,
    };
    let bytes = serde_json::to_vec(&envelope).expect("encode");
    Message::Binary(bytes.into())
}

async fn send(ws: &mut ClientWs, seq: u64, event: ClientEvent) {
    ws.send(encode_event(seq, event)).await.expect("send");
}

/// Receives and unwraps the next server event (2 s deadline).
async fn recv_event(ws: &mut ClientWs) -> ServerEvent {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for event")
        .expect("stream ended")
        .expect("recv error");
    let envelope: Envelope<ServerEvent> =
        serde_json::from_slice(&msg.into_data()).expect("decode");
    envelope.event
}

/// Skips unrelated events (global broadcasts interleave freely) until one
/// matches the predicate.
async fn recv_until(
    ws: &mut ClientWs,
    pred: impl Fn(&ServerEvent) -> bool,
) -> ServerEvent {
    for _ in 0..20 {
        let event = recv_event(ws).await;
        if pred(&event) {
            return event;
        }
    }
    panic!("no matching event within 20 frames");
}

/// Sends a `Hello` and asserts the `Welcome`.
async fn hello(ws: &mut ClientWs, user_id: u64) {
    send(
        ws,
        0,
        ClientEvent::Hello {
            version: PROTOCOL_VERSION,
            user_id: UserId(user_id),
        },
    )
    .await;
    match recv_event(ws).await {
        ServerEvent::Welcome { user_id: uid, .. } => {
            assert_eq!(uid, UserId(user_id));
        }
        other => panic!("expected Welcome, got {other:?}"),
    }
}

/// Creates a room and returns its id from the direct reply.
async fn create_room(ws: &mut ClientWs, theme: Theme) -> RoomId {
    send(
        ws,
        1,
        ClientEvent::CreateRoom {
            profile: profile(),
            wanted: filter(),
            theme,
        },
    )
    .await;
    match recv_until(ws, |e| matches!(e, ServerEvent::RoomCreated { .. })).await {
        ServerEvent::RoomCreated { room } => {
            assert_eq!(room.state, RoomState::Waiting);
            room.id
        }
        _ => unreachable!(),
    }
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_hello_welcome() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    hello(&mut ws, 42).await;
}

#[tokio::test]
async fn test_hello_version_mismatch() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        0,
        ClientEvent::Hello {
            version: 999,
            user_id: UserId(1),
        },
    )
    .await;

    match recv_event(&mut ws).await {
        ServerEvent::Error { code, .. } => assert_eq!(code, 400),
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_first_event_must_be_hello() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, 0, ClientEvent::ListRooms).await;

    match recv_event(&mut ws).await {
        ServerEvent::Error { code, .. } => assert_eq!(code, 400),
        other => panic!("expected Error, got {other:?}"),
    }
}

// =========================================================================
// Full matchmaking flow
// =========================================================================

#[tokio::test]
async fn test_create_join_message_leave_flow() {
    let addr = start_server().await;

    // A posts a profile and opens a room.
    let mut a = connect(&addr).await;
    hello(&mut a, 1).await;
    let room_id = create_room(&mut a, Theme::Chat).await;

    // B discovers it.
    let mut b = connect(&addr).await;
    hello(&mut b, 2).await;
    send(&mut b, 1, ClientEvent::ListRooms).await;
    match recv_until(&mut b, |e| matches!(e, ServerEvent::RoomList { .. })).await {
        ServerEvent::RoomList { rooms } => {
            assert_eq!(rooms.len(), 1);
            assert_eq!(rooms[0].id, room_id);
            assert_eq!(rooms[0].state, RoomState::Waiting);
        }
        _ => unreachable!(),
    }

    // B takes the room: both sessions hear the activation.
    send(&mut b, 2, ClientEvent::JoinRoom { room_id }).await;
    recv_until(&mut b, |e| {
        matches!(e, ServerEvent::RoomActivated { room_id: r } if *r == room_id)
    })
    .await;
    recv_until(&mut a, |e| {
        matches!(e, ServerEvent::RoomActivated { room_id: r } if *r == room_id)
    })
    .await;

    // The room is no longer discoverable.
    send(&mut b, 3, ClientEvent::ListRooms).await;
    match recv_until(&mut b, |e| matches!(e, ServerEvent::RoomList { .. })).await {
        ServerEvent::RoomList { rooms } => assert!(rooms.is_empty()),
        _ => unreachable!(),
    }

    // A says hi; both subscribers receive it.
    send(
        &mut a,
        2,
        ClientEvent::SendMessage {
            room_id,
            body: "hi".into(),
        },
    )
    .await;
    for ws in [&mut a, &mut b] {
        match recv_until(ws, |e| matches!(e, ServerEvent::Message { .. })).await {
            ServerEvent::Message { message } => {
                assert_eq!(message.body, "hi");
                assert_eq!(message.sender, UserId(1));
                assert_eq!(message.room_id, room_id);
            }
            _ => unreachable!(),
        }
    }

    // B polls the history.
    send(&mut b, 4, ClientEvent::ListMessages { room_id }).await;
    match recv_until(&mut b, |e| matches!(e, ServerEvent::MessageList { .. })).await {
        ServerEvent::MessageList { messages, .. } => {
            assert_eq!(messages.len(), 1);
            assert_eq!(messages.last().unwrap().body, "hi");
        }
        _ => unreachable!(),
    }

    // B types, A sees the indicator.
    send(&mut b, 5, ClientEvent::TypingStart { room_id }).await;
    match recv_until(&mut a, |e| matches!(e, ServerEvent::Typing { .. })).await {
        ServerEvent::Typing {
            user_id, started, ..
        } => {
            assert_eq!(user_id, UserId(2));
            assert!(started);
        }
        _ => unreachable!(),
    }

    // B leaves: the room survives abandoned, A sees the presence drop.
    send(&mut b, 6, ClientEvent::LeaveRoom { room_id }).await;
    match recv_until(&mut a, |e| matches!(e, ServerEvent::Presence { .. })).await {
        ServerEvent::Presence { count, user_ids, .. } => {
            assert_eq!(count, 1);
            assert_eq!(user_ids, vec![UserId(1)]);
        }
        _ => unreachable!(),
    }

    // A leaves too: the room drains to zero and closes for everyone.
    send(&mut a, 3, ClientEvent::LeaveRoom { room_id }).await;
    for ws in [&mut a, &mut b] {
        recv_until(ws, |e| {
            matches!(e, ServerEvent::RoomClosed { room_id: r } if *r == room_id)
        })
        .await;
    }

    // Nothing can be sent into the closed room.
    send(
        &mut a,
        4,
        ClientEvent::SendMessage {
            room_id,
            body: "anyone?".into(),
        },
    )
    .await;
    match recv_until(&mut a, |e| matches!(e, ServerEvent::Error { .. })).await {
        ServerEvent::Error { code, .. } => assert_eq!(code, 404),
        _ => unreachable!(),
    }
}

// =========================================================================
// Join failure modes
// =========================================================================

#[tokio::test]
async fn test_self_join_rejected_over_wire() {
    let addr = start_server().await;
    let mut a = connect(&addr).await;
    hello(&mut a, 1).await;
    let room_id = create_room(&mut a, Theme::Flirt).await;

    send(&mut a, 2, ClientEvent::JoinRoom { room_id }).await;

    match recv_until(&mut a, |e| matches!(e, ServerEvent::Error { .. })).await {
        ServerEvent::Error { code, .. } => assert_eq!(code, 422),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_second_join_conflicts_over_wire() {
    let addr = start_server().await;
    let mut a = connect(&addr).await;
    hello(&mut a, 1).await;
    let room_id = create_room(&mut a, Theme::Games).await;

    let mut b = connect(&addr).await;
    hello(&mut b, 2).await;
    send(&mut b, 1, ClientEvent::JoinRoom { room_id }).await;
    recv_until(&mut b, |e| matches!(e, ServerEvent::RoomActivated { .. })).await;

    let mut c = connect(&addr).await;
    hello(&mut c, 3).await;
    send(&mut c, 1, ClientEvent::JoinRoom { room_id }).await;

    match recv_until(&mut c, |e| matches!(e, ServerEvent::Error { .. })).await {
        ServerEvent::Error { code, .. } => assert_eq!(code, 409),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_list_messages_of_unknown_room_is_empty() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    hello(&mut ws, 1).await;

    send(
        &mut ws,
        1,
        ClientEvent::ListMessages {
            room_id: RoomId(9999),
        },
    )
    .await;

    match recv_until(&mut ws, |e| matches!(e, ServerEvent::MessageList { .. })).await {
        ServerEvent::MessageList { messages, .. } => assert!(messages.is_empty()),
        _ => unreachable!(),
    }
}

// =========================================================================
// Disconnect semantics
// =========================================================================

#[tokio::test]
async fn test_disconnect_triggers_implicit_leave() {
    let addr = start_server().await;

    let mut a = connect(&addr).await;
    hello(&mut a, 1).await;
    let room_id = create_room(&mut a, Theme::Music).await;

    let mut b = connect(&addr).await;
    hello(&mut b, 2).await;

    // A vanishes without a goodbye: the waiting room must close as if
    // the creator had left it.
    a.close(None).await.expect("close");
    drop(a);

    recv_until(&mut b, |e| {
        matches!(e, ServerEvent::RoomClosed { room_id: r } if *r == room_id)
    })
    .await;

    send(&mut b, 1, ClientEvent::ListRooms).await;
    match recv_until(&mut b, |e| matches!(e, ServerEvent::RoomList { .. })).await {
        ServerEvent::RoomList { rooms } => assert!(rooms.is_empty()),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_new_rooms_are_broadcast_to_other_sessions() {
    let addr = start_server().await;

    let mut watcher = connect(&addr).await;
    hello(&mut watcher, 7).await;

    let mut creator = connect(&addr).await;
    hello(&mut creator, 8).await;
    let room_id = create_room(&mut creator, Theme::Travel).await;

    match recv_until(&mut watcher, |e| matches!(e, ServerEvent::RoomCreated { .. }))
        .await
    {
        ServerEvent::RoomCreated { room } => {
            assert_eq!(room.id, room_id);
            assert_eq!(room.theme, Theme::Travel);
        }
        _ => unreachable!(),
    }
}
