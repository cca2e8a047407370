//! Fixed-Window Counter Store
//!
//! Per-session ordered sequences of admission instants. Each session's
//! deque is pruned eagerly: after any operation completes, every surviving
//! entry satisfies `now - entry < window`. Entries self-prune, so memory is
//! bounded by `capacity` per session that stays active.
//!
//! The store is sharded by session key via `DashMap`; no shard guard is
//! ever held across an await point (callers get plain values back).

use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// Outcome of one atomic admission check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AdmissionCheck {
    /// Under capacity; `now` was appended to the window
    Admitted,
    /// At capacity; nothing was recorded
    OverCapacity {
        /// Oldest surviving admission instant (the window frees up at
        /// `oldest + window`)
        oldest: Instant,
    },
}

/// Per-session fixed-window admission timestamps
///
/// Created lazily per session key and never garbage-collected during the
/// process lifetime unless [`FixedWindowStore::evict_idle`] is called.
#[derive(Debug, Default)]
pub(crate) struct FixedWindowStore {
    windows: DashMap<String, VecDeque<Instant>>,
}

impl FixedWindowStore {
    /// Prune expired entries, then admit `now` if the session is under
    /// `capacity`, all under one shard lock
    ///
    /// Performing prune, count, and append as a single operation means no
    /// concurrent reader ever observes a half-updated window.
    pub(crate) fn try_admit(
        &self,
        session_key: &str,
        now: Instant,
        capacity: usize,
        window: Duration,
    ) -> AdmissionCheck {
        let mut entry = self.windows.entry(session_key.to_owned()).or_default();
        let timestamps = entry.value_mut();
        Self::evict_expired(timestamps, now, window);

        if timestamps.len() >= capacity {
            if let Some(&oldest) = timestamps.front() {
                return AdmissionCheck::OverCapacity { oldest };
            }
        }
        timestamps.push_back(now);
        AdmissionCheck::Admitted
    }

    /// Number of admissions currently inside the session's trailing window
    ///
    /// Prunes expired entries before counting, so the result honors the
    /// staleness invariant at the instant the read completes.
    pub(crate) fn count_in_window(
        &self,
        session_key: &str,
        now: Instant,
        window: Duration,
    ) -> usize {
        match self.windows.get_mut(session_key) {
            Some(mut entry) => {
                let timestamps = entry.value_mut();
                Self::evict_expired(timestamps, now, window);
                timestamps.len()
            }
            None => 0,
        }
    }

    /// Number of sessions ever observed (and not evicted)
    pub(crate) fn session_count(&self) -> usize {
        self.windows.len()
    }

    /// Remove sessions whose newest admission is at least `idle_for` old
    ///
    /// Returns the number of sessions evicted. Sessions with an empty
    /// window are always evicted.
    pub(crate) fn evict_idle(&self, now: Instant, idle_for: Duration) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| match timestamps.back() {
            Some(&newest) => now.duration_since(newest) < idle_for,
            None => false,
        });
        before - self.windows.len()
    }

    /// Drop leading entries that have aged out of the window
    ///
    /// An entry expires once `now - entry >= window`.
    fn evict_expired(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(&head) = timestamps.front() {
            if now.duration_since(head) >= window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn test_admits_under_capacity() {
        let store = FixedWindowStore::default();
        let now = Instant::now();

        for _ in 0..3 {
            assert_eq!(store.try_admit("a", now, 3, WINDOW), AdmissionCheck::Admitted);
        }
        assert_eq!(store.count_in_window("a", now, WINDOW), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_over_capacity_reports_oldest() {
        let store = FixedWindowStore::default();
        let t0 = Instant::now();

        store.try_admit("a", t0, 2, WINDOW);
        tokio::time::advance(Duration::from_secs(1)).await;
        let t1 = Instant::now();
        store.try_admit("a", t1, 2, WINDOW);

        tokio::time::advance(Duration::from_secs(1)).await;
        let t2 = Instant::now();
        assert_eq!(
            store.try_admit("a", t2, 2, WINDOW),
            AdmissionCheck::OverCapacity { oldest: t0 }
        );
        // A rejected attempt records nothing
        assert_eq!(store.count_in_window("a", t2, WINDOW), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_age_out_at_window_boundary() {
        let store = FixedWindowStore::default();
        let t0 = Instant::now();
        store.try_admit("a", t0, 2, WINDOW);

        // One instant before expiry the entry still counts
        tokio::time::advance(WINDOW - Duration::from_millis(1)).await;
        assert_eq!(store.count_in_window("a", Instant::now(), WINDOW), 1);

        // At exactly `now - entry == window` it is gone
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(store.count_in_window("a", Instant::now(), WINDOW), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_after_oldest_expires() {
        let store = FixedWindowStore::default();
        let t0 = Instant::now();
        store.try_admit("a", t0, 1, WINDOW);

        tokio::time::advance(WINDOW).await;
        let later = Instant::now();
        assert_eq!(
            store.try_admit("a", later, 1, WINDOW),
            AdmissionCheck::Admitted
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pruning_is_idempotent() {
        let store = FixedWindowStore::default();
        let t0 = Instant::now();
        store.try_admit("a", t0, 5, WINDOW);
        tokio::time::advance(Duration::from_secs(4)).await;
        store.try_admit("a", Instant::now(), 5, WINDOW);

        tokio::time::advance(Duration::from_secs(7)).await;
        let now = Instant::now();
        let first = store.count_in_window("a", now, WINDOW);
        let second = store.count_in_window("a", now, WINDOW);
        assert_eq!(first, 1, "only the 4s-old entry survives an 11s horizon");
        assert_eq!(first, second, "pruning twice must equal pruning once");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sessions_are_independent() {
        let store = FixedWindowStore::default();
        let now = Instant::now();

        store.try_admit("a", now, 1, WINDOW);
        assert_eq!(
            store.try_admit("a", now, 1, WINDOW),
            AdmissionCheck::OverCapacity { oldest: now }
        );
        // A saturated session "a" never affects "b"
        assert_eq!(store.try_admit("b", now, 1, WINDOW), AdmissionCheck::Admitted);
        assert_eq!(store.count_in_window("b", now, WINDOW), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_idle_removes_only_stale_sessions() {
        let store = FixedWindowStore::default();
        let t0 = Instant::now();
        store.try_admit("stale", t0, 5, WINDOW);

        tokio::time::advance(Duration::from_secs(25)).await;
        store.try_admit("fresh", Instant::now(), 5, WINDOW);
        assert_eq!(store.session_count(), 2);

        let evicted = store.evict_idle(Instant::now(), WINDOW * 2);
        assert_eq!(evicted, 1);
        assert_eq!(store.session_count(), 1);
        assert_eq!(store.count_in_window("fresh", Instant::now(), WINDOW), 1);
    }
}
