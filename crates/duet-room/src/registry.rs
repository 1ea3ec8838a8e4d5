//! Room registry: creates, indexes, and routes operations to room actors.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use duet_broadcast::EventHub;
use duet_protocol::{
    Message, PartnerFilter, RoomId, RoomSummary, SeekerProfile, Theme, UserId,
};

use crate::room::spawn_room;
use crate::{LeaveOutcome, RoomConfig, RoomError, RoomHandle};

/// Counter for generating unique room IDs.
static NEXT_ROOM_ID: AtomicU64 = AtomicU64::new(1);

/// Default command channel size for room actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Owns every live room and the indexes over them.
///
/// This is the entry point for room operations from the server layer.
/// The registry itself lives behind one `tokio::sync::Mutex`; per-room
/// serialization is the actor's job.
pub struct RoomRegistry {
    /// Live rooms, keyed by room ID.
    rooms: HashMap<RoomId, RoomHandle>,

    /// Creation order of live rooms. Keeps `list_waiting` stable enough
    /// for pagination.
    order: Vec<RoomId>,

    /// Rooms each user is a declared participant of. Drives the implicit
    /// leave on disconnect.
    members: HashMap<UserId, HashSet<RoomId>>,

    config: RoomConfig,
    events: Arc<EventHub>,
}

impl RoomRegistry {
    /// Creates an empty registry publishing through `events`.
    pub fn new(config: RoomConfig, events: Arc<EventHub>) -> Self {
        Self {
            rooms: HashMap::new(),
            order: Vec::new(),
            members: HashMap::new(),
            config,
            events,
        }
    }

    /// Opens a new waiting room for `creator_id`.
    ///
    /// Malformed profiles are rejected with `InvalidArgument`; otherwise
    /// creation always succeeds. Announcing the room is left to the
    /// caller, which knows which session to exclude from the broadcast.
    pub fn create(
        &mut self,
        creator_id: UserId,
        creator: SeekerProfile,
        wanted: PartnerFilter,
        theme: Theme,
    ) -> Result<RoomSummary, RoomError> {
        creator.validate().map_err(RoomError::InvalidArgument)?;
        wanted.validate().map_err(RoomError::InvalidArgument)?;

        let room_id = RoomId(NEXT_ROOM_ID.fetch_add(1, Ordering::Relaxed));
        let (handle, summary) = spawn_room(
            room_id,
            creator_id,
            creator,
            wanted,
            theme,
            self.config.clone(),
            Arc::clone(&self.events),
            DEFAULT_CHANNEL_SIZE,
        );

        self.rooms.insert(room_id, handle);
        self.order.push(room_id);
        self.members.entry(creator_id).or_default().insert(room_id);

        tracing::info!(%room_id, creator = %creator_id, %theme, "room created");
        Ok(summary)
    }

    /// Pairs `user_id` with the creator of `room_id`.
    pub async fn join(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<RoomSummary, RoomError> {
        let handle = self
            .rooms
            .get(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;

        let summary = handle.join(user_id).await?;
        self.members.entry(user_id).or_default().insert(room_id);
        Ok(summary)
    }

    /// Removes `user_id` from `room_id`. Never an error: unknown rooms
    /// and non-participants yield the no-op outcome.
    pub async fn leave(&mut self, room_id: RoomId, user_id: UserId) -> LeaveOutcome {
        let Some(handle) = self.rooms.get(&room_id) else {
            return LeaveOutcome {
                closed: false,
                remaining: Vec::new(),
            };
        };

        let outcome = handle.leave(user_id).await;

        if let Some(rooms) = self.members.get_mut(&user_id) {
            rooms.remove(&room_id);
            if rooms.is_empty() {
                self.members.remove(&user_id);
            }
        }
        if outcome.closed {
            self.drop_room(room_id);
        }

        outcome
    }

    /// Implicit leave for every room the user is a declared participant
    /// of: the disconnect path, treated exactly like a normal leave.
    pub async fn leave_all(&mut self, user_id: UserId) -> Vec<(RoomId, LeaveOutcome)> {
        let room_ids: Vec<RoomId> = self
            .members
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        let mut outcomes = Vec::with_capacity(room_ids.len());
        for room_id in room_ids {
            let outcome = self.leave(room_id, user_id).await;
            outcomes.push((room_id, outcome));
        }
        outcomes
    }

    /// Appends a message to a room.
    pub async fn append(
        &self,
        room_id: RoomId,
        sender: UserId,
        body: String,
    ) -> Result<Message, RoomError> {
        let handle = self
            .rooms
            .get(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;
        handle.append(sender, body).await
    }

    /// Full message history in creation order. Unknown rooms yield an
    /// empty history rather than an error, which keeps client polling
    /// trivial.
    pub async fn history(&self, room_id: RoomId) -> Vec<Message> {
        match self.rooms.get(&room_id) {
            Some(handle) => handle.history().await,
            None => Vec::new(),
        }
    }

    /// Returns the current summary of a specific room.
    pub async fn get(&self, room_id: RoomId) -> Result<RoomSummary, RoomError> {
        let handle = self
            .rooms
            .get(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;
        handle.snapshot().await.ok_or(RoomError::NotFound(room_id))
    }

    /// Lists all waiting rooms in creation order, optionally filtered by
    /// theme. Rooms that fail to respond (mid-teardown) are skipped.
    pub async fn list_waiting(&self, theme: Option<Theme>) -> Vec<RoomSummary> {
        let mut summaries = Vec::new();
        for room_id in &self.order {
            let Some(handle) = self.rooms.get(room_id) else {
                continue;
            };
            if let Some(summary) = handle.snapshot().await {
                if summary.state.is_discoverable()
                    && theme.is_none_or(|t| t == summary.theme)
                {
                    summaries.push(summary);
                }
            }
        }
        summaries
    }

    /// Deletes a room and its message log without publishing anything.
    /// Idempotent.
    pub async fn remove(&mut self, room_id: RoomId) {
        if let Some(handle) = self.rooms.get(&room_id) {
            handle.shutdown().await;
            self.drop_room(room_id);
            tracing::info!(%room_id, "room removed");
        }
    }

    /// One reaper pass: every waiting room older than `ttl` closes and
    /// announces itself; rooms whose actor has already terminated are
    /// pruned silently. Returns the number of rooms dropped.
    pub async fn sweep(&mut self, ttl: Duration) -> usize {
        let mut dropped = 0;
        for room_id in self.order.clone() {
            let Some(handle) = self.rooms.get(&room_id) else {
                continue;
            };
            match handle.expire(ttl).await {
                Some(false) => {}
                Some(true) => {
                    self.drop_room(room_id);
                    dropped += 1;
                }
                None => {
                    tracing::debug!(%room_id, "pruning dead room actor");
                    self.drop_room(room_id);
                    dropped += 1;
                }
            }
        }
        dropped
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Cloned handles to all live rooms.
    ///
    /// Useful when callers need to run room operations without holding
    /// the registry lock.
    pub fn room_handles(&self) -> Vec<RoomHandle> {
        self.rooms.values().cloned().collect()
    }

    /// Drops every index entry for a room.
    fn drop_room(&mut self, room_id: RoomId) {
        self.rooms.remove(&room_id);
        self.order.retain(|id| *id != room_id);
        self.members.retain(|_, rooms| {
            rooms.remove(&room_id);
            !rooms.is_empty()
        });
    }
}
