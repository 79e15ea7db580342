//! Client-side loop prevention.
//!
//! Every device both produces and consumes the same event stream, so three
//! independent rules keep updates from bouncing between devices:
//!
//! 1. **Self-origin filter**: remote updates from our own device id are ignored.
//! 2. **Apply-then-ignore window**: right before writing a remote update into
//!    the local clipboard, local change events are muted for a short window so
//!    the OS notification caused by our own write is not re-published.
//! 3. **Debounce + duplicate hash**: a local change is not published if it
//!    arrives within the debounce window of the last accepted publish, or if
//!    its content hash equals the last accepted one.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::constants::{IGNORE_LOCAL_AFTER_REMOTE_MS, LOCAL_DEBOUNCE_MS};
use crate::crypto::hash_equals;

#[derive(Debug, Default)]
struct GuardState {
    ignore_local_until: Option<DateTime<Utc>>,
    last_local_publish: Option<DateTime<Utc>>,
    last_published_hash: Option<Vec<u8>>,
}

/// Per-device loop guard. Never shared between devices, never persisted.
#[derive(Debug)]
pub struct LoopGuard {
    ignore_window: Duration,
    debounce_window: Duration,
    state: Mutex<GuardState>,
}

impl LoopGuard {
    pub fn new(ignore_window: Duration, debounce_window: Duration) -> Self {
        Self {
            ignore_window,
            debounce_window,
            state: Mutex::new(GuardState::default()),
        }
    }

    /// True when a remote update originated on this device.
    pub fn should_ignore_remote(local_device_id: Uuid, origin_device_id: Uuid) -> bool {
        local_device_id == origin_device_id
    }

    /// Call immediately before setting the local clipboard from a remote update.
    pub fn begin_remote_apply(&self, now: DateTime<Utc>) {
        let mut state = self.lock();
        state.ignore_local_until = Some(now + self.ignore_window);
    }

    /// True if a local clipboard event at `now` falls inside the window opened
    /// by the last [`begin_remote_apply`](Self::begin_remote_apply).
    pub fn should_ignore_local_clipboard_event(&self, now: DateTime<Utc>) -> bool {
        let state = self.lock();
        matches!(state.ignore_local_until, Some(until) if now <= until)
    }

    /// Returns true if publishing should be suppressed (debounce or duplicate).
    ///
    /// When it returns false the publish is recorded as accepted.
    pub fn should_suppress_local_publish(&self, now: DateTime<Utc>, hash: &[u8]) -> bool {
        let mut state = self.lock();

        if let Some(last) = state.last_local_publish {
            let since = now - last;
            // A clock that went backwards does not count as "within the window".
            if since >= Duration::zero() && since < self.debounce_window {
                return true;
            }
        }

        if let Some(last_hash) = state.last_published_hash.as_deref() {
            if hash_equals(last_hash, hash) {
                return true;
            }
        }

        state.last_local_publish = Some(now);
        state.last_published_hash = Some(hash.to_vec());
        false
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self::new(
            Duration::milliseconds(IGNORE_LOCAL_AFTER_REMOTE_MS),
            Duration::milliseconds(LOCAL_DEBOUNCE_MS),
        )
    }
}
