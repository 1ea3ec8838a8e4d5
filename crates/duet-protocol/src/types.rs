//! Core wire types for the duet protocol.
//!
//! Everything a client and server exchange is defined here: identifier
//! newtypes, the profile/room/message data model, the event enums for both
//! directions, and the [`Envelope`] wrapper that carries them.

use serde::{Deserialize, Serialize};

use std::fmt;

/// The current protocol version. Clients must send this in their `Hello`
/// or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Lower bound for ages accepted in profiles and filters.
pub const MIN_AGE: u8 = 18;
/// Upper bound for ages accepted in profiles and filters.
pub const MAX_AGE: u8 = 99;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a user session.
///
/// Identity is declared by the client at connect time and never verified;
/// the service is anonymous by design. `#[serde(transparent)]` keeps the
/// wire form a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// A unique identifier for a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// A unique identifier for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// Gender of the user posting a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Gender {
    Male,
    Female,
}

/// Gender a creator is looking for. `Any` accepts either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum PartnerGender {
    Male,
    Female,
    #[default]
    Any,
}

/// Discovery category a room is posted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Theme {
    Chat,
    Flirt,
    Games,
    Music,
    Movies,
    Travel,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Chat => "Chat",
            Self::Flirt => "Flirt",
            Self::Games => "Games",
            Self::Music => "Music",
            Self::Movies => "Movies",
            Self::Travel => "Travel",
        };
        write!(f, "{name}")
    }
}

/// Who the creator is: shown to other users while the room is discoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekerProfile {
    pub gender: Gender,
    pub age: u8,
}

impl SeekerProfile {
    /// Checks the profile against the accepted age range.
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_AGE..=MAX_AGE).contains(&self.age) {
            return Err(format!(
                "age {} outside accepted range {MIN_AGE}-{MAX_AGE}",
                self.age
            ));
        }
        Ok(())
    }
}

/// Who the creator wants to talk to. Display/discovery data only: pairing
/// does not enforce it, the first taker wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerFilter {
    pub gender: PartnerGender,
    pub min_age: u8,
    pub max_age: u8,
}

impl PartnerFilter {
    /// Checks the filter bounds: both ages in range, `min_age <= max_age`.
    pub fn validate(&self) -> Result<(), String> {
        for age in [self.min_age, self.max_age] {
            if !(MIN_AGE..=MAX_AGE).contains(&age) {
                return Err(format!(
                    "age {age} outside accepted range {MIN_AGE}-{MAX_AGE}"
                ));
            }
        }
        if self.min_age > self.max_age {
            return Err(format!(
                "min age {} greater than max age {}",
                self.min_age, self.max_age
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Room lifecycle state
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// ```text
/// Waiting ──join──▶ Active ──leave(any)──▶ Closed
///    └───────leave(creator)───────────────▶ Closed
/// ```
///
/// `Closed` is terminal and implies deletion from the registry: a closed
/// room is unreachable through every lookup path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    /// Posted and discoverable; only the creator is inside.
    Waiting,
    /// Paired; exactly the creator and one joiner ever belong to it.
    Active,
    /// Terminal. The room and its messages are gone.
    Closed,
}

impl RoomState {
    /// Returns `true` if the room is listed to other users.
    pub fn is_discoverable(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting, Self::Active)
                | (Self::Waiting, Self::Closed)
                | (Self::Active, Self::Closed)
        )
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::Active => write!(f, "Active"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Room summary and messages
// ---------------------------------------------------------------------------

/// A snapshot of a room as seen on the wire: returned from creation,
/// discovery listings, and successful joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: RoomId,
    pub creator_id: UserId,
    pub state: RoomState,
    pub creator: SeekerProfile,
    pub wanted: PartnerFilter,
    pub theme: Theme,
    /// Current participants. `{creator}` while waiting, both while active.
    pub participants: Vec<UserId>,
    /// Unix milliseconds at creation.
    pub created_at: u64,
}

/// A single chat message. Immutable; destroyed with its room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender: UserId,
    pub body: String,
    /// Unix milliseconds at append.
    pub created_at: u64,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Everything a client can send.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON:
/// `{ "type": "JoinRoom", "room_id": 3 }`.
///
/// Identity is bound once by `Hello`; later events never carry a user id.
/// The server attributes them to the session that sent them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// First frame on every connection.
    Hello { version: u32, user_id: UserId },

    /// Post a "looking for" profile, opening a waiting room.
    CreateRoom {
        profile: SeekerProfile,
        wanted: PartnerFilter,
        theme: Theme,
    },

    /// Ask for the current discovery listing (waiting rooms only).
    ListRooms,

    /// Take a waiting room, pairing with its creator.
    JoinRoom { room_id: RoomId },

    /// Leave a room the session participates in.
    LeaveRoom { room_id: RoomId },

    /// Append a chat message to a room.
    SendMessage { room_id: RoomId, body: String },

    /// Ask for a room's full message history.
    ListMessages { room_id: RoomId },

    TypingStart { room_id: RoomId },
    TypingStop { room_id: RoomId },

    /// Orderly goodbye; equivalent to dropping the connection.
    Goodbye,
}

/// Everything the server can push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Reply to a valid `Hello`. `server_time` is Unix milliseconds.
    Welcome { user_id: UserId, server_time: u64 },

    /// A new room is discoverable. Sent to every connected session;
    /// doubles as the direct reply to the creator.
    RoomCreated { room: RoomSummary },

    /// The room is gone. Sent to every connected session.
    RoomClosed { room_id: RoomId },

    /// The room paired up. Sent to the room's subscribers.
    RoomActivated { room_id: RoomId },

    /// Reply to `ListRooms`.
    RoomList { rooms: Vec<RoomSummary> },

    /// A message was appended. Sent to the room's subscribers.
    Message { message: Message },

    /// Reply to `ListMessages`. Empty for unknown rooms.
    MessageList {
        room_id: RoomId,
        messages: Vec<Message>,
    },

    /// Participant set changed. Sent to the room's subscribers.
    Presence {
        room_id: RoomId,
        count: usize,
        user_ids: Vec<UserId>,
    },

    /// A participant started or stopped typing.
    Typing {
        room_id: RoomId,
        user_id: UserId,
        started: bool,
    },

    /// Something went wrong with the sender's last request.
    /// `code` follows HTTP conventions (400, 403, 404, 409, 422).
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level wire wrapper. Every frame is an `Envelope` around one
/// event; `seq` counts per direction per connection, `timestamp` is
/// milliseconds since the connection opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<E> {
    pub seq: u64,
    pub timestamp: u64,
    pub event: E,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The wire format is consumed by non-Rust clients, so these tests pin
    //! the exact JSON shapes the serde attributes produce.

    use super::*;

    // =====================================================================
    // Identity types
    // =====================================================================

    #[test]
    fn test_ids_serialize_as_plain_numbers() {
        assert_eq!(serde_json::to_string(&UserId(42)).unwrap(), "42");
        assert_eq!(serde_json::to_string(&RoomId(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&MessageId(9)).unwrap(), "9");
    }

    #[test]
    fn test_id_display_prefixes() {
        assert_eq!(UserId(7).to_string(), "U-7");
        assert_eq!(RoomId(3).to_string(), "R-3");
        assert_eq!(MessageId(12).to_string(), "M-12");
    }

    // =====================================================================
    // Room state machine
    // =====================================================================

    #[test]
    fn test_room_state_valid_transitions() {
        assert!(RoomState::Waiting.can_transition_to(RoomState::Active));
        assert!(RoomState::Waiting.can_transition_to(RoomState::Closed));
        assert!(RoomState::Active.can_transition_to(RoomState::Closed));
    }

    #[test]
    fn test_room_state_closed_is_terminal() {
        assert!(!RoomState::Closed.can_transition_to(RoomState::Waiting));
        assert!(!RoomState::Closed.can_transition_to(RoomState::Active));
        assert!(!RoomState::Closed.can_transition_to(RoomState::Closed));
    }

    #[test]
    fn test_room_state_no_backwards_transitions() {
        assert!(!RoomState::Active.can_transition_to(RoomState::Waiting));
        assert!(!RoomState::Waiting.can_transition_to(RoomState::Waiting));
    }

    #[test]
    fn test_only_waiting_is_discoverable() {
        assert!(RoomState::Waiting.is_discoverable());
        assert!(!RoomState::Active.is_discoverable());
        assert!(!RoomState::Closed.is_discoverable());
    }

    // =====================================================================
    // Profile validation
    // =====================================================================

    #[test]
    fn test_seeker_profile_validates_age_range() {
        let ok = SeekerProfile { gender: Gender::Male, age: 25 };
        assert!(ok.validate().is_ok());

        let too_young = SeekerProfile { gender: Gender::Male, age: 17 };
        assert!(too_young.validate().is_err());

        let too_old = SeekerProfile { gender: Gender::Female, age: 100 };
        assert!(too_old.validate().is_err());
    }

    #[test]
    fn test_partner_filter_validates_bounds() {
        let ok = PartnerFilter {
            gender: PartnerGender::Any,
            min_age: 18,
            max_age: 30,
        };
        assert!(ok.validate().is_ok());

        let inverted = PartnerFilter {
            gender: PartnerGender::Any,
            min_age: 30,
            max_age: 18,
        };
        assert!(inverted.validate().is_err());

        let out_of_range = PartnerFilter {
            gender: PartnerGender::Female,
            min_age: 10,
            max_age: 20,
        };
        assert!(out_of_range.validate().is_err());
    }

    // =====================================================================
    // Event JSON shapes
    // =====================================================================

    #[test]
    fn test_client_event_hello_json_format() {
        let evt = ClientEvent::Hello {
            version: PROTOCOL_VERSION,
            user_id: UserId(5),
        };
        let json: serde_json::Value = serde_json::to_value(&evt).unwrap();

        assert_eq!(json["type"], "Hello");
        assert_eq!(json["version"], 1);
        assert_eq!(json["user_id"], 5);
    }

    #[test]
    fn test_client_event_create_room_json_format() {
        let evt = ClientEvent::CreateRoom {
            profile: SeekerProfile { gender: Gender::Male, age: 25 },
            wanted: PartnerFilter {
                gender: PartnerGender::Female,
                min_age: 18,
                max_age: 30,
            },
            theme: Theme::Chat,
        };
        let json: serde_json::Value = serde_json::to_value(&evt).unwrap();

        assert_eq!(json["type"], "CreateRoom");
        assert_eq!(json["profile"]["gender"], "Male");
        assert_eq!(json["profile"]["age"], 25);
        assert_eq!(json["wanted"]["gender"], "Female");
        assert_eq!(json["theme"], "Chat");
    }

    #[test]
    fn test_client_event_unit_variants() {
        let json: serde_json::Value =
            serde_json::to_value(&ClientEvent::ListRooms).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "ListRooms" }));
    }

    #[test]
    fn test_server_event_error_json_format() {
        let evt = ServerEvent::Error {
            code: 409,
            message: "room R-1 is no longer waiting".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&evt).unwrap();

        assert_eq!(json["type"], "Error");
        assert_eq!(json["code"], 409);
    }

    #[test]
    fn test_server_event_presence_round_trip() {
        let evt = ServerEvent::Presence {
            room_id: RoomId(4),
            count: 2,
            user_ids: vec![UserId(1), UserId(2)],
        };
        let bytes = serde_json::to_vec(&evt).unwrap();
        let decoded: ServerEvent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(evt, decoded);
    }

    // =====================================================================
    // Envelope
    // =====================================================================

    #[test]
    fn test_envelope_round_trip() {
        let envelope = Envelope {
            seq: 42,
            timestamp: 15000,
            event: ClientEvent::JoinRoom { room_id: RoomId(3) },
        };
        let bytes = serde_json::to_vec(&envelope).unwrap();
        let decoded: Envelope<ClientEvent> =
            serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope, decoded);
    }

    #[test]
    fn test_decode_garbage_returns_error() {
        let garbage = b"not json at all";
        let result: Result<Envelope<ClientEvent>, _> =
            serde_json::from_slice(garbage);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_unknown_event_type_returns_error() {
        let unknown = r#"{"seq":1,"timestamp":0,"event":{"type":"FlyToMoon"}}"#;
        let result: Result<Envelope<ClientEvent>, _> =
            serde_json::from_str(unknown);
        assert!(result.is_err());
    }
}
