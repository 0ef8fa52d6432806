//! Delayed deletion timers for empty rooms
//!
//! At most one timer exists per room. Each timer carries a generation number;
//! a timer only fires if its generation is still the registered one when the
//! delay elapses, so a cancel or reschedule racing the wake-up wins.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, error};

use crate::core::types::RoomId;

struct PendingExpiry {
    generation: u64,
    task: AbortHandle,
}

/// Per-room cancellable timers
#[derive(Default)]
pub struct ExpiryScheduler {
    pending: Arc<Mutex<HashMap<RoomId, PendingExpiry>>>,
    next_generation: AtomicU64,
}

impl ExpiryScheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer for `room_id`, replacing any existing one
    ///
    /// `on_fire` runs at most once, after `delay`, unless the timer is
    /// cancelled or replaced first. Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, room_id: RoomId, delay: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                error!("No async runtime available; room {} will not expire", room_id);
                return;
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);
        let timer_room = room_id.clone();

        // Held across the spawn so the task cannot look itself up before it is registered
        let mut map = self.pending.lock();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            let still_current = {
                let mut map = pending.lock();
                match map.get(&timer_room) {
                    Some(entry) if entry.generation == generation => {
                        map.remove(&timer_room);
                        true
                    }
                    _ => false,
                }
            };

            if still_current {
                debug!("Expiry timer fired for room {}", timer_room);
                on_fire();
            }
        });

        if let Some(previous) = map.insert(
            room_id,
            PendingExpiry {
                generation,
                task: task.abort_handle(),
            },
        ) {
            previous.task.abort();
        }
    }

    /// Disarm the timer for `room_id`; returns whether one was pending
    pub fn cancel(&self, room_id: &RoomId) -> bool {
        match self.pending.lock().remove(room_id) {
            Some(entry) => {
                entry.task.abort();
                debug!("Expiry timer cancelled for room {}", room_id);
                true
            }
            None => false,
        }
    }

    /// Whether a timer is armed for `room_id`
    pub fn is_pending(&self, room_id: &RoomId) -> bool {
        self.pending.lock().contains_key(room_id)
    }

    /// Number of armed timers
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether no timers are armed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        for (_, entry) in self.pending.lock().drain() {
            entry.task.abort();
        }
    }
}
