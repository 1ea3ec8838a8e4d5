//! Room lifecycle for duet.
//!
//! Each room runs as an isolated Tokio task (actor model) owning its
//! lifecycle state, its two-party participant set, and its message log.
//! All mutations flow through the actor's command channel, which is what
//! makes pairing atomic: of N concurrent joins on one waiting room,
//! exactly one observes `Waiting`.
//!
//! # Key types
//!
//! - [`RoomRegistry`] — creates rooms, indexes them, routes operations
//! - [`RoomHandle`] — send commands to a running room actor
//! - [`Reaper`] — background sweep evicting stale waiting rooms
//! - [`RoomConfig`] / [`ReaperConfig`] — tunables (TTL, sweep interval)
//! - [`RoomError`] — the operation error taxonomy

mod config;
mod error;
mod reaper;
mod registry;
mod room;

pub use config::RoomConfig;
pub use error::RoomError;
pub use reaper::{Reaper, ReaperConfig, ReaperHandle};
pub use registry::RoomRegistry;
pub use room::{LeaveOutcome, RoomHandle};
