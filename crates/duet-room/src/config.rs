//! Room configuration.

use serde::{Deserialize, Serialize};

/// Configuration shared by every room a registry creates.
///
/// The waiting-room TTL deliberately lives in
/// [`ReaperConfig`](crate::ReaperConfig) alone: one knob, no drift
/// between the sweeper and the rooms it sweeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Maximum accepted message body size in bytes.
    pub max_message_len: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_message_len: 4096,
        }
    }
}
