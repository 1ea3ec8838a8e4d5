//! The event hub: session registry and per-room subscription fan-out.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use duet_protocol::{Message, RoomId, RoomSummary, ServerEvent, UserId};
use tokio::sync::{Mutex, mpsc};

/// Counter for generating unique subscriber IDs.
static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a registered session sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Channel sender through which a session receives pushed events.
pub type EventSink = mpsc::UnboundedSender<ServerEvent>;

#[derive(Default)]
struct HubInner {
    /// Every connected session. Global events (created/closed) go here.
    sessions: HashMap<SubscriberId, EventSink>,
    /// Per-room viewer sets. Room events (activated/message/presence/
    /// typing) go here.
    rooms: HashMap<RoomId, HashMap<SubscriberId, EventSink>>,
}

impl HubInner {
    /// Sends `event` to every sink in `sinks`, pruning the dead ones.
    fn fan_out(sinks: &mut HashMap<SubscriberId, EventSink>, event: &ServerEvent) {
        sinks.retain(|id, sink| {
            let alive = sink.send(event.clone()).is_ok();
            if !alive {
                tracing::debug!(subscriber = %id, "pruning dead sink");
            }
            alive
        });
    }
}

/// Routes room and lobby events to connected sessions.
///
/// Cheap to share: the server holds one `Arc<EventHub>` and hands clones
/// to every room actor and connection handler.
#[derive(Default)]
pub struct EventHub {
    inner: Mutex<HubInner>,
}

impl EventHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    // -- Session lifecycle --

    /// Registers a connected session and returns its subscriber id.
    ///
    /// The session immediately starts receiving global events.
    pub async fn register(&self, sink: EventSink) -> SubscriberId {
        let id = SubscriberId(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed));
        self.inner.lock().await.sessions.insert(id, sink);
        tracing::debug!(subscriber = %id, "session registered");
        id
    }

    /// Removes a session entirely: global events and every room
    /// subscription. Idempotent.
    pub async fn unregister(&self, id: SubscriberId) {
        let mut inner = self.inner.lock().await;
        inner.sessions.remove(&id);
        inner.rooms.retain(|_, sinks| {
            sinks.remove(&id);
            !sinks.is_empty()
        });
        tracing::debug!(subscriber = %id, "session unregistered");
    }

    // -- Room subscriptions --

    /// Subscribes a registered session to a room's events.
    ///
    /// Returns `true` only for a new subscription, `false` if the
    /// session was already watching the room or is unknown (already
    /// disconnected). Callers use this to roll back exactly what they
    /// added and nothing more.
    pub async fn subscribe(&self, room_id: RoomId, id: SubscriberId) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(sink) = inner.sessions.get(&id).cloned() else {
            return false;
        };
        inner
            .rooms
            .entry(room_id)
            .or_default()
            .insert(id, sink)
            .is_none()
    }

    /// Drops a session's subscription to a room. Idempotent.
    pub async fn unsubscribe(&self, room_id: RoomId, id: SubscriberId) {
        let mut inner = self.inner.lock().await;
        if let Some(sinks) = inner.rooms.get_mut(&room_id) {
            sinks.remove(&id);
            if sinks.is_empty() {
                inner.rooms.remove(&room_id);
            }
        }
    }

    // -- Publishing --

    /// Announces a new waiting room to every connected session.
    ///
    /// `except` skips one subscriber: the creator, who gets the summary
    /// as a direct reply instead of hearing it twice.
    pub async fn publish_room_created(
        &self,
        room: &RoomSummary,
        except: Option<SubscriberId>,
    ) {
        let event = ServerEvent::RoomCreated { room: room.clone() };
        let mut inner = self.inner.lock().await;
        inner.sessions.retain(|id, sink| {
            if Some(*id) == except {
                return true;
            }
            sink.send(event.clone()).is_ok()
        });
    }

    /// Announces a closed room to every connected session and drops the
    /// room's subscription set; there is nothing left to watch.
    pub async fn publish_room_closed(&self, room_id: RoomId) {
        let event = ServerEvent::RoomClosed { room_id };
        let mut inner = self.inner.lock().await;
        inner.rooms.remove(&room_id);
        HubInner::fan_out(&mut inner.sessions, &event);
    }

    /// Tells a room's subscribers that it paired up.
    pub async fn publish_room_activated(&self, room_id: RoomId) {
        self.to_room(room_id, ServerEvent::RoomActivated { room_id })
            .await;
    }

    /// Delivers a freshly appended message to its room's subscribers.
    pub async fn publish_message(&self, message: &Message) {
        self.to_room(
            message.room_id,
            ServerEvent::Message {
                message: message.clone(),
            },
        )
        .await;
    }

    /// Pushes a participant snapshot to a room's subscribers.
    pub async fn publish_presence(&self, room_id: RoomId, user_ids: &[UserId]) {
        self.to_room(
            room_id,
            ServerEvent::Presence {
                room_id,
                count: user_ids.len(),
                user_ids: user_ids.to_vec(),
            },
        )
        .await;
    }

    /// Pushes a typing indicator to a room's subscribers.
    pub async fn publish_typing(&self, room_id: RoomId, user_id: UserId, started: bool) {
        self.to_room(
            room_id,
            ServerEvent::Typing {
                room_id,
                user_id,
                started,
            },
        )
        .await;
    }

    async fn to_room(&self, room_id: RoomId, event: ServerEvent) {
        let mut inner = self.inner.lock().await;
        if let Some(sinks) = inner.rooms.get_mut(&room_id) {
            HubInner::fan_out(sinks, &event);
        }
    }

    // -- Introspection (tests, logging) --

    /// Number of connected sessions.
    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    /// Number of sessions subscribed to a room.
    pub async fn room_subscriber_count(&self, room_id: RoomId) -> usize {
        self.inner
            .lock()
            .await
            .rooms
            .get(&room_id)
            .map_or(0, HashMap::len)
    }
}
