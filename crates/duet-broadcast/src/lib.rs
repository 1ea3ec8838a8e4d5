//! Presence and event fan-out for duet.
//!
//! The [`EventHub`] is the single place that knows who is connected and
//! who is watching which room. Room actors and connection handlers push
//! typed [`ServerEvent`](duet_protocol::ServerEvent)s into it; the hub
//! fans them out to the right sinks.
//!
//! Delivery is best-effort and fire-and-forget: a sink whose receiver is
//! gone is pruned on the next send, never retried, never an error.

mod hub;

pub use hub::{EventHub, EventSink, SubscriberId};
