// ============================
// crates/backend-lib/src/reaper.rs
// ============================

//! Background removal of abandoned rooms.
//!
//! Two mechanisms work together. [`CleanupScheduler`] arms a delayed
//! membership re-check the moment a room empties; if anyone has come
//! back by the time it fires, the room (and its project tree) survives.
//! [`IdleReaper`] is the long-period sweep that catches whatever the
//! delayed checks missed: rooms that sat empty and untouched for many
//! hours go away wholesale.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Settings;
use crate::room::RoomRegistry;

/// Arms one delayed existence check per emptied room.
#[derive(Clone)]
pub struct CleanupScheduler {
    registry: RoomRegistry,
    grace: Duration,
    pending: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl CleanupScheduler {
    pub fn new(registry: RoomRegistry, grace: Duration) -> Self {
        Self {
            registry,
            grace,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedules a membership re-check for `room_id`, `grace` from now.
    /// Scheduling again for the same room replaces the pending check, so
    /// at most one check per room is armed at a time. The check itself
    /// only asks "is the room still empty?" and removes it if so; a
    /// rejoin in the meantime makes it a no-op.
    pub fn schedule(&self, room_id: &str) {
        let registry = self.registry.clone();
        let pending = Arc::clone(&self.pending);
        let grace = self.grace;
        let key = room_id.to_string();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            pending.lock().remove(&task_key);
            registry.remove_if_empty(&task_key);
        });
        if let Some(superseded) = self.pending.lock().insert(key, handle) {
            superseded.abort();
        }
        debug!(
            room = room_id,
            grace_secs = self.grace.as_secs(),
            "scheduled empty-room check"
        );
    }

    /// How many checks are currently armed.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Fixed-period sweep over all rooms.
pub struct IdleReaper;

impl IdleReaper {
    /// Spawns the sweep loop. The first sweep happens one full period
    /// after startup. Dropping the returned handle detaches the loop.
    pub fn spawn(registry: RoomRegistry, settings: &Settings) -> JoinHandle<()> {
        let period = settings.reaper_interval();
        let idle_after = settings.room_idle();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the interval's first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = registry.reap_idle(idle_after);
                if removed > 0 {
                    info!(removed, "reaped idle rooms");
                }
            }
        })
    }
}
