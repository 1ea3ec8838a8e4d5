//! Room actor: an isolated Tokio task that owns one room.
//!
//! Each room runs in its own task and is mutated only through its mpsc
//! command channel. Serial command processing is the pairing guarantee:
//! two joins racing on a waiting room are handled one after the other,
//! so exactly one sees `Waiting` and wins.
//!
//! Events are published through the hub strictly after a transition has
//! committed, so subscribers always see the post-transition room image.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use duet_broadcast::EventHub;
use duet_protocol::{
    Message, MessageId, PartnerFilter, RoomId, RoomState, RoomSummary,
    SeekerProfile, Theme, UserId,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::{RoomConfig, RoomError};

/// Counter for generating unique message IDs.
static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Current Unix time in milliseconds (wire timestamps).
pub(crate) fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Outcome of a leave: whether the room closed, and who is still inside.
///
/// Leaving is never an error: leaving an unknown room or a room one is
/// not in is a no-op outcome with `closed == false`.
#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    pub closed: bool,
    pub remaining: Vec<UserId>,
}

/// Commands sent to a room actor through its channel.
///
/// The `oneshot::Sender` in most variants is the reply channel the caller
/// waits on.
pub(crate) enum RoomCommand {
    /// Pair a joiner with the creator.
    Join {
        user_id: UserId,
        reply: oneshot::Sender<Result<RoomSummary, RoomError>>,
    },

    /// Remove a participant.
    Leave {
        user_id: UserId,
        reply: oneshot::Sender<LeaveOutcome>,
    },

    /// Append a chat message.
    Append {
        sender: UserId,
        body: String,
        reply: oneshot::Sender<Result<Message, RoomError>>,
    },

    /// Request the full message history.
    History {
        reply: oneshot::Sender<Vec<Message>>,
    },

    /// Request the current room summary.
    Snapshot {
        reply: oneshot::Sender<RoomSummary>,
    },

    /// Reaper probe: close the room if it is still waiting and older
    /// than `ttl`. Replies whether the room closed.
    Expire {
        ttl: Duration,
        reply: oneshot::Sender<bool>,
    },

    /// Silent teardown (registry `remove`): no events published.
    Shutdown,
}

/// Handle to a running room actor. Cheap to clone.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Returns the room's unique ID.
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Sends a join request to the room.
    ///
    /// A terminated actor means the room is logically gone, so channel
    /// failures surface as `NotFound`.
    pub async fn join(&self, user_id: UserId) -> Result<RoomSummary, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Join {
                user_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::NotFound(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| RoomError::NotFound(self.room_id))?
    }

    /// Sends a leave request. A dead actor yields the no-op outcome.
    pub async fn leave(&self, user_id: UserId) -> LeaveOutcome {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self
            .sender
            .send(RoomCommand::Leave {
                user_id,
                reply: reply_tx,
            })
            .await;
        match sent {
            Ok(()) => reply_rx.await.unwrap_or(LeaveOutcome {
                closed: false,
                remaining: Vec::new(),
            }),
            Err(_) => LeaveOutcome {
                closed: false,
                remaining: Vec::new(),
            },
        }
    }

    /// Appends a message to the room.
    pub async fn append(
        &self,
        sender: UserId,
        body: String,
    ) -> Result<Message, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Append {
                sender,
                body,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::NotFound(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| RoomError::NotFound(self.room_id))?
    }

    /// Requests the full message history. A dead actor yields an empty
    /// history, matching the lenient listing contract.
    pub async fn history(&self) -> Vec<Message> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self
            .sender
            .send(RoomCommand::History { reply: reply_tx })
            .await;
        match sent {
            Ok(()) => reply_rx.await.unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Requests the current room summary. `None` if the actor is gone.
    pub async fn snapshot(&self) -> Option<RoomSummary> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Snapshot { reply: reply_tx })
            .await
            .ok()?;
        reply_rx.await.ok()
    }

    /// Asks the room to expire itself against `ttl`.
    ///
    /// `Some(true)` means the room closed, `Some(false)` that it is
    /// still live, and `None` that the actor is already gone and should
    /// be pruned.
    pub async fn expire(&self, ttl: Duration) -> Option<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Expire {
                ttl,
                reply: reply_tx,
            })
            .await
            .ok()?;
        reply_rx.await.ok()
    }

    /// Tears the room down without publishing anything.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(RoomCommand::Shutdown).await;
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    room_id: RoomId,
    creator_id: UserId,
    creator: SeekerProfile,
    wanted: PartnerFilter,
    theme: Theme,
    state: RoomState,
    /// At most two entries: the creator, then the joiner.
    participants: Vec<UserId>,
    messages: Vec<Message>,
    /// Unix milliseconds at creation (wire field).
    created_at: u64,
    /// Monotonic creation instant; drives TTL arithmetic.
    opened: Instant,
    config: RoomConfig,
    events: Arc<EventHub>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Runs the actor loop until the room closes or every handle is gone.
    async fn run(mut self) {
        tracing::info!(
            room_id = %self.room_id,
            creator = %self.creator_id,
            theme = %self.theme,
            "room opened"
        );

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join { user_id, reply } => {
                    let result = self.handle_join(user_id).await;
                    let _ = reply.send(result);
                }
                RoomCommand::Leave { user_id, reply } => {
                    let outcome = self.handle_leave(user_id).await;
                    let _ = reply.send(outcome);
                }
                RoomCommand::Append {
                    sender,
                    body,
                    reply,
                } => {
                    let result = self.handle_append(sender, body).await;
                    let _ = reply.send(result);
                }
                RoomCommand::History { reply } => {
                    let _ = reply.send(self.messages.clone());
                }
                RoomCommand::Snapshot { reply } => {
                    let _ = reply.send(self.summary());
                }
                RoomCommand::Expire { ttl, reply } => {
                    let closed = self.handle_expire(ttl).await;
                    let _ = reply.send(closed);
                }
                RoomCommand::Shutdown => {
                    self.state = RoomState::Closed;
                    self.messages.clear();
                }
            }

            // Closed is terminal: stop draining commands so late callers
            // observe a dead channel and report NotFound.
            if self.state.is_closed() {
                break;
            }
        }

        tracing::info!(room_id = %self.room_id, "room actor stopped");
    }

    async fn handle_join(&mut self, user_id: UserId) -> Result<RoomSummary, RoomError> {
        // Self-join is rejected before the state check: it fails the same
        // way whether the room is waiting or already paired.
        if user_id == self.creator_id {
            return Err(RoomError::SelfJoin(self.room_id));
        }
        if !self.state.is_waiting() {
            return Err(RoomError::Conflict(self.room_id));
        }

        self.participants.push(user_id);
        self.state = RoomState::Active;
        tracing::info!(
            room_id = %self.room_id,
            joiner = %user_id,
            "room paired"
        );

        self.events.publish_room_activated(self.room_id).await;
        self.events
            .publish_presence(self.room_id, &self.participants)
            .await;

        Ok(self.summary())
    }

    async fn handle_leave(&mut self, user_id: UserId) -> LeaveOutcome {
        let Some(pos) = self.participants.iter().position(|&u| u == user_id) else {
            return LeaveOutcome {
                closed: false,
                remaining: self.participants.clone(),
            };
        };
        self.participants.remove(pos);

        tracing::info!(
            room_id = %self.room_id,
            user = %user_id,
            remaining = self.participants.len(),
            "participant left"
        );

        let withdrawn = self.state.is_waiting() && user_id == self.creator_id;
        if withdrawn || self.participants.is_empty() {
            self.close_and_announce().await;
        } else {
            // Abandoned but still Active: one side remains and no further
            // joins are permitted. Only leave-to-zero or the reaper can
            // finish it off.
            self.events
                .publish_presence(self.room_id, &self.participants)
                .await;
        }

        LeaveOutcome {
            closed: self.state.is_closed(),
            remaining: self.participants.clone(),
        }
    }

    async fn handle_append(
        &mut self,
        sender: UserId,
        body: String,
    ) -> Result<Message, RoomError> {
        if body.is_empty() {
            return Err(RoomError::InvalidArgument("empty message body".into()));
        }
        if body.len() > self.config.max_message_len {
            return Err(RoomError::InvalidArgument(format!(
                "message body exceeds {} bytes",
                self.config.max_message_len
            )));
        }
        // While waiting only the creator is inside, so the participant
        // check also restricts early messages to the creator's backlog,
        // which is retained and delivered to the eventual joiner via
        // the history listing.
        if !self.participants.contains(&sender) {
            return Err(RoomError::Forbidden(self.room_id));
        }

        let message = Message {
            id: MessageId(NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed)),
            room_id: self.room_id,
            sender,
            body,
            created_at: unix_millis(),
        };
        self.messages.push(message.clone());
        tracing::debug!(
            room_id = %self.room_id,
            sender = %sender,
            message_id = %message.id,
            "message appended"
        );

        self.events.publish_message(&message).await;

        Ok(message)
    }

    async fn handle_expire(&mut self, ttl: Duration) -> bool {
        if self.state.is_waiting() && self.opened.elapsed() >= ttl {
            tracing::info!(room_id = %self.room_id, "waiting room expired");
            self.close_and_announce().await;
            return true;
        }
        false
    }

    async fn close_and_announce(&mut self) {
        self.state = RoomState::Closed;
        self.messages.clear();
        tracing::info!(room_id = %self.room_id, "room closed");
        self.events.publish_room_closed(self.room_id).await;
    }

    fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.room_id,
            creator_id: self.creator_id,
            state: self.state,
            creator: self.creator,
            wanted: self.wanted,
            theme: self.theme,
            participants: self.participants.clone(),
            created_at: self.created_at,
        }
    }
}

/// Spawns a new room actor task in `Waiting` state with the creator as
/// its sole participant. Returns the handle and the initial summary.
pub(crate) fn spawn_room(
    room_id: RoomId,
    creator_id: UserId,
    creator: SeekerProfile,
    wanted: PartnerFilter,
    theme: Theme,
    config: RoomConfig,
    events: Arc<EventHub>,
    channel_size: usize,
) -> (RoomHandle, RoomSummary) {
    let (tx, rx) = mpsc::channel(channel_size);

    let actor = RoomActor {
        room_id,
        creator_id,
        creator,
        wanted,
        theme,
        state: RoomState::Waiting,
        participants: vec![creator_id],
        messages: Vec::new(),
        created_at: unix_millis(),
        opened: Instant::now(),
        config,
        events,
        receiver: rx,
    };
    let summary = actor.summary();

    tokio::spawn(actor.run());

    (
        RoomHandle {
            room_id,
            sender: tx,
        },
        summary,
    )
}
