//! Admission Control Stage
//!
//! Enforces "at most `window_capacity` admissions per `window_duration` per
//! session key" with a fixed-window algorithm. An event for a session that
//! is over capacity either stalls (the stage sleeps until the window frees
//! up, then re-checks) or is discarded, per the configured
//! [`OverflowStrategy`].
//!
//! # Design Philosophy
//!
//! The whole decision for one session key is a single logical transaction:
//! the per-session lock is held across the stall sleep on purpose. A second
//! event for the same session arriving mid-stall queues at the lock, which
//! serializes the fixed-window state machine per session; events for other
//! sessions never contend. After waking, the stage re-checks from scratch
//! with a fresh `now` — fixed-window boundaries can admit a burst exactly at
//! rollover, and a queued same-session event may have consumed the freed
//! slot first.
//!
//! Fixed-window (rather than sliding-window or token-bucket) keeps the
//! bookkeeping O(1) amortized per admitted event with memory bounded by
//! `capacity` per active session: entries self-prune as they age out.

mod locks;
mod window;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::config::OverflowStrategy;
use crate::event::InboundEvent;
use crate::pipeline::{PipelineContext, Stage, StageError, StageSignal};

use self::locks::SessionLockManager;
use self::window::{AdmissionCheck, FixedWindowStore};

/// Padding added to every stall so the stage never wakes exactly at the
/// window boundary and re-fails on clock skew
pub const STALL_GRACE: Duration = Duration::from_millis(300);

/// Limits captured from the pipeline context at initialization
#[derive(Clone, Copy, Debug)]
struct WindowLimits {
    capacity: usize,
    window: Duration,
    strategy: OverflowStrategy,
}

/// Pipeline stage applying per-session fixed-window admission control
///
/// Owns both per-session maps (admission timestamps and locks) exclusively;
/// no other component reads or mutates them. Both maps grow with the number
/// of distinct sessions observed and are never pruned automatically —
/// [`AdmissionControlStage::evict_idle_windows`] exists for callers that
/// want to reclaim timestamp state for long-idle sessions.
#[derive(Debug, Default)]
pub struct AdmissionControlStage {
    limits: Option<WindowLimits>,
    windows: FixedWindowStore,
    locks: SessionLockManager,
}

impl AdmissionControlStage {
    /// Create an uninitialized stage
    ///
    /// Limits are supplied by [`Stage::initialize`] during pipeline
    /// assembly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admissions currently inside the session's trailing window
    #[must_use]
    pub fn admitted_in_window(&self, session_key: &str) -> usize {
        match self.limits {
            Some(limits) => {
                self.windows
                    .count_in_window(session_key, Instant::now(), limits.window)
            }
            None => 0,
        }
    }

    /// Number of distinct sessions currently tracked
    #[must_use]
    pub fn tracked_sessions(&self) -> usize {
        self.windows.session_count()
    }

    /// Evict timestamp state for sessions idle for at least `idle_for`
    ///
    /// Returns the number of sessions evicted. Only window state is
    /// reclaimed; session locks are retained for the process lifetime (see
    /// the lock manager for why removal would be unsound).
    pub fn evict_idle_windows(&self, idle_for: Duration) -> usize {
        self.windows.evict_idle(Instant::now(), idle_for)
    }
}

#[async_trait]
impl Stage for AdmissionControlStage {
    fn name(&self) -> &'static str {
        "admission_control"
    }

    async fn initialize(&mut self, ctx: &PipelineContext) -> Result<(), StageError> {
        self.limits = Some(WindowLimits {
            capacity: ctx.window_capacity(),
            window: ctx.window_duration(),
            strategy: ctx.overflow_strategy(),
        });
        Ok(())
    }

    async fn process(&self, event: &mut InboundEvent) -> Result<StageSignal, StageError> {
        let limits = self.limits.ok_or(StageError::NotInitialized)?;
        let session_key = event.session_key().to_owned();

        // Held across the stall sleep: the admission decision for one
        // session is a single transaction.
        let _guard = self.locks.acquire(&session_key).await;

        loop {
            let now = Instant::now();
            match self
                .windows
                .try_admit(&session_key, now, limits.capacity, limits.window)
            {
                AdmissionCheck::Admitted => return Ok(StageSignal::Continue),
                AdmissionCheck::OverCapacity { oldest } => {
                    let wake_at = oldest + limits.window;
                    let wait = wake_at.saturating_duration_since(now) + STALL_GRACE;

                    match limits.strategy {
                        OverflowStrategy::Stall => {
                            tracing::info!(
                                session = %session_key,
                                stall_secs = wait.as_secs_f64(),
                                "Session over rate limit, stalling until the window frees up"
                            );
                            tokio::time::sleep(wait).await;
                            // Re-check with a fresh `now`: another admission
                            // may have landed while this task slept.
                        }
                        OverflowStrategy::Discard => {
                            tracing::info!(
                                session = %session_key,
                                reset_secs = wait.as_secs_f64(),
                                "Session over rate limit, discarding event until the window resets"
                            );
                            event.stop();
                            return Ok(StageSignal::Terminate);
                        }
                    }
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
