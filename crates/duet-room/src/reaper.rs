//! Background sweep that evicts stale rooms.
//!
//! The reaper runs on its own fixed interval and asks every room actor
//! to self-expire, so the eviction decision is serialized with any join
//! racing it: a join that wins leaves the room alone.
//!
//! Interval and TTL are plain `Duration`s and the timer is tokio's, so
//! tests drive sweeps under `tokio::time::pause()` without wall-clock
//! sleeps.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Mutex, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::RoomRegistry;

/// Configuration for the reaper sweep loop.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Time between sweeps.
    pub interval: Duration,

    /// Age past which an unpaired waiting room is evicted.
    pub waiting_ttl: Duration,

    /// Random delay (0–max) added before the first sweep so services
    /// started together do not sweep in lockstep.
    pub initial_jitter: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            waiting_ttl: Duration::from_secs(60 * 60),
            initial_jitter: Duration::from_secs(2),
        }
    }
}

impl ReaperConfig {
    /// Fixes any unusable values so the config is safe to run with.
    /// A zero interval or TTL falls back to its default.
    pub fn validated(mut self) -> Self {
        if self.interval.is_zero() {
            warn!("reaper interval is zero, falling back to default");
            self.interval = Duration::from_secs(60);
        }
        if self.waiting_ttl.is_zero() {
            warn!("waiting TTL is zero, falling back to default");
            self.waiting_ttl = Duration::from_secs(60 * 60);
        }
        self
    }
}

/// Handle to a running reaper task.
///
/// Dropping the handle cancels the task; [`shutdown`](Self::shutdown)
/// cancels it and waits for it to finish.
pub struct ReaperHandle {
    stop: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl ReaperHandle {
    /// Stops the sweep loop and waits for the task to exit.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

/// The background sweep task.
pub struct Reaper;

impl Reaper {
    /// Spawns the sweep loop over `registry` and returns its handle.
    pub fn spawn(registry: Arc<Mutex<RoomRegistry>>, config: ReaperConfig) -> ReaperHandle {
        let config = config.validated();
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let jitter_us = config.initial_jitter.as_micros() as u64;
            let jitter = if jitter_us > 0 {
                Duration::from_micros(rand::rng().random_range(0..jitter_us))
            } else {
                Duration::ZERO
            };

            let first = time::Instant::now() + config.interval + jitter;
            let mut ticker = time::interval_at(first, config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            debug!(
                interval_s = config.interval.as_secs(),
                ttl_s = config.waiting_ttl.as_secs(),
                "reaper started"
            );

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        let dropped =
                            registry.lock().await.sweep(config.waiting_ttl).await;
                        if dropped > 0 {
                            info!(dropped, "reaper evicted stale rooms");
                        }
                    }
                }
            }

            debug!("reaper stopped");
        });

        ReaperHandle {
            stop: stop_tx,
            task,
        }
    }
}
