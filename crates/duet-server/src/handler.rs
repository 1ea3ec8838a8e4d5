//! Per-connection handler: hello handshake and event routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive `Hello` → validate protocol version, bind the identity
//!   2. Register the session with the event hub, send `Welcome`
//!   3. Loop: `select!` over inbound frames and the session's event sink
//!
//! A drop guard turns a vanished connection into the normal cleanup
//! path: implicit leave of every declared room plus hub unregistration.

use std::sync::Arc;
use std::time::{Duration, Instant};

use duet_broadcast::SubscriberId;
use duet_protocol::{
    ClientEvent, Codec, Envelope, JsonCodec, PROTOCOL_VERSION, ProtocolError,
    ServerEvent, UserId,
};
use duet_room::RoomError;
use duet_transport::{Connection, WebSocketConnection};

use crate::ServerError;
use crate::server::ServerState;

/// Drop guard that cleans up a session when the handler exits.
///
/// `Drop` is synchronous, so the async cleanup runs in a spawned task.
/// This fires on clean goodbyes, decode-loop errors, and panics alike:
/// a disconnect is an implicit leave, never a special error path.
struct ConnectionGuard {
    user_id: UserId,
    subscriber: SubscriberId,
    state: Arc<ServerState>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let user_id = self.user_id;
        let subscriber = self.subscriber;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.registry.lock().await.leave_all(user_id).await;
            state.hub.unregister(subscriber).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
) -> Result<(), ServerError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let start = Instant::now();
    let mut seq: u64 = 1;

    // --- Step 1: Hello ---
    let user_id = perform_hello(&conn, &state, &mut seq, &start).await?;
    tracing::info!(%conn_id, %user_id, "session established");

    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let subscriber = state.hub.register(events_tx).await;
    let _guard = ConnectionGuard {
        user_id,
        subscriber,
        state: Arc::clone(&state),
    };

    send_event(
        &conn,
        &state.codec,
        ServerEvent::Welcome {
            user_id,
            server_time: unix_millis(),
        },
        &mut seq,
        &start,
    )
    .await?;

    // --- Step 2: event loop ---
    loop {
        tokio::select! {
            inbound = conn.recv() => {
                match inbound {
                    Ok(Some(data)) => {
                        let envelope: Envelope<ClientEvent> =
                            match state.codec.decode(&data) {
                                Ok(env) => env,
                                Err(e) => {
                                    tracing::debug!(
                                        %user_id, error = %e,
                                        "failed to decode frame"
                                    );
                                    continue;
                                }
                            };
                        let close = handle_client_event(
                            &conn, &state, user_id, subscriber,
                            envelope.event, &mut seq, &start,
                        )
                        .await?;
                        if close {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::info!(%user_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%user_id, error = %e, "recv error");
                        break;
                    }
                }
            }
            Some(event) = events_rx.recv() => {
                send_event(&conn, &state.codec, event, &mut seq, &start).await?;
            }
        }
    }

    // _guard drops here → implicit leave + unregister.
    Ok(())
}

/// Performs the handshake: receive `Hello`, gate the version, reply is
/// sent by the caller once the session is registered.
async fn perform_hello(
    conn: &WebSocketConnection,
    state: &Arc<ServerState>,
    seq: &mut u64,
    start: &Instant,
) -> Result<UserId, ServerError> {
    let data = match tokio::time::timeout(Duration::from_secs(5), conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before hello".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(ServerError::Transport(e)),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("hello timed out".into()).into());
        }
    };

    let envelope: Envelope<ClientEvent> = state.codec.decode(&data)?;

    let (version, user_id) = match envelope.event {
        ClientEvent::Hello { version, user_id } => (version, user_id),
        _ => {
            send_error(conn, &state.codec, 400, "expected Hello", seq, start).await?;
            return Err(ProtocolError::InvalidMessage(
                "first event must be Hello".into(),
            )
            .into());
        }
    };

    if version != PROTOCOL_VERSION {
        send_error(
            conn,
            &state.codec,
            400,
            &format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
            seq,
            start,
        )
        .await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    Ok(user_id)
}

/// Dispatches one client event. Returns `true` if the connection should
/// close.
async fn handle_client_event(
    conn: &WebSocketConnection,
    state: &Arc<ServerState>,
    user_id: UserId,
    subscriber: SubscriberId,
    event: ClientEvent,
    seq: &mut u64,
    start: &Instant,
) -> Result<bool, ServerError> {
    match event {
        ClientEvent::Hello { .. } => {
            tracing::debug!(%user_id, "ignoring duplicate Hello");
        }

        ClientEvent::CreateRoom {
            profile,
            wanted,
            theme,
        } => {
            let created = state
                .registry
                .lock()
                .await
                .create(user_id, profile, wanted, theme);

            match created {
                Ok(room) => {
                    state.hub.subscribe(room.id, subscriber).await;
                    send_event(
                        conn,
                        &state.codec,
                        ServerEvent::RoomCreated { room: room.clone() },
                        seq,
                        start,
                    )
                    .await?;
                    // Everyone else hears about it through the hub; the
                    // creator already has the direct reply above.
                    state.hub.publish_room_created(&room, Some(subscriber)).await;
                }
                Err(e) => send_room_error(conn, state, user_id, &e, seq, start).await?,
            }
        }

        ClientEvent::ListRooms => {
            let rooms = state.registry.lock().await.list_waiting(None).await;
            send_event(
                conn,
                &state.codec,
                ServerEvent::RoomList { rooms },
                seq,
                start,
            )
            .await?;
        }

        ClientEvent::JoinRoom { room_id } => {
            // Subscribe before joining so the activation event reaches
            // this session too; roll back only what was newly added.
            let newly_subscribed = state.hub.subscribe(room_id, subscriber).await;

            let joined = state.registry.lock().await.join(room_id, user_id).await;

            if let Err(e) = joined {
                if newly_subscribed {
                    state.hub.unsubscribe(room_id, subscriber).await;
                }
                send_room_error(conn, state, user_id, &e, seq, start).await?;
            }
        }

        ClientEvent::LeaveRoom { room_id } => {
            state.registry.lock().await.leave(room_id, user_id).await;
            state.hub.unsubscribe(room_id, subscriber).await;
        }

        ClientEvent::SendMessage { room_id, body } => {
            let sent = state
                .registry
                .lock()
                .await
                .append(room_id, user_id, body)
                .await;

            // Success needs no direct reply: the sender subscribes to
            // rooms it belongs to and receives the message event with
            // everyone else.
            if let Err(e) = sent {
                send_room_error(conn, state, user_id, &e, seq, start).await?;
            }
        }

        ClientEvent::ListMessages { room_id } => {
            let messages = state.registry.lock().await.history(room_id).await;
            send_event(
                conn,
                &state.codec,
                ServerEvent::MessageList { room_id, messages },
                seq,
                start,
            )
            .await?;
        }

        ClientEvent::TypingStart { room_id } => {
            state.hub.publish_typing(room_id, user_id, true).await;
        }

        ClientEvent::TypingStop { room_id } => {
            state.hub.publish_typing(room_id, user_id, false).await;
        }

        ClientEvent::Goodbye => {
            tracing::info!(%user_id, "client said goodbye");
            return Ok(true);
        }
    }

    Ok(false)
}

/// Reports a room-layer failure back to the caller as an error event.
async fn send_room_error(
    conn: &WebSocketConnection,
    state: &Arc<ServerState>,
    user_id: UserId,
    error: &RoomError,
    seq: &mut u64,
    start: &Instant,
) -> Result<(), ServerError> {
    tracing::debug!(%user_id, error = %error, "room operation failed");
    send_error(conn, &state.codec, error.code(), &error.to_string(), seq, start).await
}

/// Sends a `ServerEvent::Error` envelope to the client.
async fn send_error(
    conn: &WebSocketConnection,
    codec: &JsonCodec,
    code: u16,
    message: &str,
    seq: &mut u64,
    start: &Instant,
) -> Result<(), ServerError> {
    send_event(
        conn,
        codec,
        ServerEvent::Error {
            code,
            message: message.to_string(),
        },
        seq,
        start,
    )
    .await
}

/// Wraps an event in an envelope and writes it to the connection.
async fn send_event(
    conn: &WebSocketConnection,
    codec: &JsonCodec,
    event: ServerEvent,
    seq: &mut u64,
    start: &Instant,
) -> Result<(), ServerError> {
    let envelope = Envelope {
        seq: next_seq(seq),
        timestamp: start.elapsed().as_millis() as u64,
        event,
    };
    let bytes = codec.encode(&envelope)?;
    conn.send(&bytes).await.map_err(ServerError::Transport)?;
    Ok(())
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}

/// Current Unix time in milliseconds.
fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
