//! # duet
//!
//! Anonymous pairwise chat matchmaking server.
//!
//! Users post a "looking for" profile, which opens a discoverable
//! waiting room; the first taker pairs with the creator into a private
//! two-party room. Rooms, messages, and sessions are purely in-memory,
//! so a restart forgets everything, by design.
//!
//! This crate ties the layers together: `duet-transport` accepts
//! WebSocket connections, `duet-protocol` speaks the wire format,
//! `duet-room` owns the room lifecycle, and `duet-broadcast` fans events
//! out to connected sessions.

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::{DuetServer, DuetServerBuilder};
