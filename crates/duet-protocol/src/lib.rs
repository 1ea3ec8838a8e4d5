//! Wire protocol and data model for duet.
//!
//! This crate defines the language clients and the server speak:
//!
//! - **Types** ([`Envelope`], [`ClientEvent`], [`ServerEvent`], the id
//!   newtypes, profiles, [`RoomSummary`], [`Message`], [`RoomState`]) —
//!   the structures that travel on the wire.
//! - **Codec** ([`Codec`], [`JsonCodec`]) — how they become bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong in between.
//!
//! The protocol layer sits between transport (raw bytes) and the room
//! layer (domain state). It knows nothing about connections or rooms,
//! only how to describe and serialize them.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientEvent, Envelope, Gender, MAX_AGE, MIN_AGE, Message, MessageId,
    PROTOCOL_VERSION, PartnerFilter, PartnerGender, RoomId, RoomState,
    RoomSummary, SeekerProfile, ServerEvent, Theme, UserId,
};
