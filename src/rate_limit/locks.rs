//! Session Key Lock Manager
//!
//! One async mutex per session key, created lazily on first acquisition and
//! never removed for the lifetime of the process. The admission decision for
//! a session must never run concurrently with itself; holding the guard
//! across the stall sleep is intentional, so a second event for the same
//! session queues at the lock while other sessions proceed unimpeded.
//!
//! Removing a lock from the map is unsafe even when it looks idle: a waiter
//! still holding the `Arc` would keep the old mutex alive while a newcomer
//! minted a fresh one for the same key, and the two would not exclude each
//! other. The map therefore only ever grows (bounded by the number of
//! distinct sessions seen).

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lazily-created per-session mutexes
#[derive(Debug, Default)]
pub(crate) struct SessionLockManager {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionLockManager {
    /// Acquire the lock for a session key, creating it on first use
    ///
    /// The returned guard releases on drop, on every exit path, including
    /// cancellation of a future that is parked on the stall sleep.
    pub(crate) async fn acquire(&self, session_key: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the map shard guard is released before the
        // (potentially long) lock wait.
        let lock = {
            let entry = self.locks.entry(session_key.to_owned()).or_default();
            entry.value().clone()
        };
        lock.lock_owned().await
    }

    /// Number of distinct session keys ever locked
    pub(crate) fn lock_count(&self) -> usize {
        self.locks.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
