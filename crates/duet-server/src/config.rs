//! Server configuration.
//!
//! Defaults can be overridden with environment variables:
//! `DUET_ADDR`, `DUET_WAITING_TTL_SECS`, `DUET_SWEEP_INTERVAL_SECS`.

use std::time::Duration;

/// Runtime settings for the duet binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the WebSocket listener to.
    pub addr: String,

    /// Age past which an unpaired waiting room is evicted.
    pub waiting_ttl: Duration,

    /// Time between reaper sweeps.
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            waiting_ttl: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Builds a config from the environment, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            addr: std::env::var("DUET_ADDR").unwrap_or(defaults.addr),
            waiting_ttl: secs_or(
                std::env::var("DUET_WAITING_TTL_SECS").ok(),
                defaults.waiting_ttl,
            ),
            sweep_interval: secs_or(
                std::env::var("DUET_SWEEP_INTERVAL_SECS").ok(),
                defaults.sweep_interval,
            ),
        }
    }
}

fn secs_or(value: Option<String>, default: Duration) -> Duration {
    value
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
