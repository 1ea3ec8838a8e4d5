//! Error types for the room layer.

use duet_protocol::RoomId;

/// Errors that can occur during room operations.
///
/// All of these are local and recoverable: they are surfaced to the
/// originating caller as a structured error event and never tear down
/// the service.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// Malformed input: out-of-range ages, inverted filter bounds,
    /// empty or oversized message bodies.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The room does not exist (or no longer exists).
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room is no longer waiting: already paired or closed.
    #[error("room {0} is no longer waiting")]
    Conflict(RoomId),

    /// The creator tried to take their own room.
    #[error("cannot join own room {0}")]
    SelfJoin(RoomId),

    /// The sender may not post into this room.
    #[error("sending to room {0} is not permitted")]
    Forbidden(RoomId),
}

impl RoomError {
    /// HTTP-style code carried in wire error events.
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidArgument(_) => 400,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::SelfJoin(_) => 422,
        }
    }
}
