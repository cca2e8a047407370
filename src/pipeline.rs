//! Pipeline Dispatcher and Stage Contract
//!
//! The dispatcher drives each inbound event through an ordered list of
//! stages. Stages are initialized exactly once, in registration order,
//! before the pipeline serves any traffic; a stage that fails to initialize
//! aborts assembly so a misconfigured pipeline never sees an event.
//!
//! # Design Philosophy
//!
//! There is no ambient registry of stages. The stage list and the
//! [`PipelineContext`] are plain values passed to [`Dispatcher::assemble`],
//! which returns an owned dispatcher. A stage's `process` may suspend
//! internally (the admission stage sleeps while stalling); the dispatcher
//! never runs two stages for the same event concurrently, but different
//! events interleave freely across tasks since [`Dispatcher::run`] takes
//! `&self`.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{ConfigError, OverflowStrategy, RateLimitConfig};
use crate::event::InboundEvent;

// =============================================================================
// Error Types
// =============================================================================

/// Unexpected failure inside a stage
///
/// The dispatcher treats any stage error as fatal for that event: it logs
/// the error, skips the remaining stages, and does not retry. Retry, if
/// desired, belongs to an upstream collaborator.
#[derive(Debug, Error)]
pub enum StageError {
    /// `process` was called on a stage that was never initialized
    #[error("stage used before initialization")]
    NotInitialized,

    /// Stage-specific failure
    #[error("{0}")]
    Failed(String),
}

/// Errors that can occur while assembling a pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid configuration; the pipeline must not start
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A stage failed during one-time initialization
    #[error("stage `{stage}` failed to initialize: {source}")]
    StageInit {
        /// Name of the failing stage
        stage: &'static str,
        /// The underlying stage error
        source: StageError,
    },
}

// =============================================================================
// Pipeline Context
// =============================================================================

/// Immutable configuration shared with every stage during initialization
///
/// Built from a validated [`RateLimitConfig`]; construction fails on
/// invalid values rather than clamping them.
#[derive(Clone, Debug)]
pub struct PipelineContext {
    window_capacity: usize,
    window_duration: Duration,
    overflow_strategy: OverflowStrategy,
}

impl PipelineContext {
    /// Build a context from a rate-limit configuration
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `count` or `time` is zero.
    pub fn new(config: &RateLimitConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            window_capacity: config.count as usize,
            window_duration: config.window_duration(),
            overflow_strategy: config.strategy,
        })
    }

    /// Maximum admissions per window per session (always >= 1)
    #[must_use]
    pub fn window_capacity(&self) -> usize {
        self.window_capacity
    }

    /// Window length (always > 0)
    #[must_use]
    pub fn window_duration(&self) -> Duration {
        self.window_duration
    }

    /// What to do with events once a session is over capacity
    #[must_use]
    pub fn overflow_strategy(&self) -> OverflowStrategy {
        self.overflow_strategy
    }
}

// =============================================================================
// Stage Contract
// =============================================================================

/// What a stage tells the dispatcher after processing an event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageSignal {
    /// Hand the event to the next stage
    Continue,
    /// Stop dispatch; the event is handled (dropped or already replied to)
    Terminate,
}

/// One unit of pipeline processing
///
/// `initialize` is called exactly once, before any traffic, with the shared
/// [`PipelineContext`]. `process` is called once per event in registration
/// order and may suspend internally before returning.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable name used in logs and error reports
    fn name(&self) -> &'static str;

    /// One-time initialization with the shared pipeline configuration
    async fn initialize(&mut self, ctx: &PipelineContext) -> Result<(), StageError>;

    /// Process one event, signalling whether dispatch continues
    async fn process(&self, event: &mut InboundEvent) -> Result<StageSignal, StageError>;
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Result of driving one event through the pipeline
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Every stage returned [`StageSignal::Continue`]
    PassedThrough,
    /// A stage terminated dispatch; the event is handled
    Stopped,
    /// A stage failed; dispatch was abandoned and the error logged
    Failed(StageError),
}

impl DispatchOutcome {
    /// Whether the event passed every stage
    #[must_use]
    pub fn is_passed_through(&self) -> bool {
        matches!(self, Self::PassedThrough)
    }

    /// Whether a stage terminated the event
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Whether a stage failed
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Drives events through an ordered sequence of stages
///
/// The stage list is fixed at assembly time. See [`Dispatcher::assemble`].
pub struct Dispatcher {
    stages: Vec<Box<dyn Stage>>,
    context: PipelineContext,
}

impl Dispatcher {
    /// Assemble a pipeline: initialize every stage, in order, exactly once
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::StageInit`] if any stage fails to
    /// initialize; no event is ever served by a partially initialized
    /// pipeline.
    pub async fn assemble(
        context: PipelineContext,
        mut stages: Vec<Box<dyn Stage>>,
    ) -> Result<Self, PipelineError> {
        for stage in &mut stages {
            let name = stage.name();
            stage
                .initialize(&context)
                .await
                .map_err(|source| PipelineError::StageInit {
                    stage: name,
                    source,
                })?;
            tracing::debug!(stage = name, "Initialized pipeline stage");
        }
        Ok(Self { stages, context })
    }

    /// The configuration the stages were initialized with
    #[must_use]
    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Number of registered stages
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Drive one event through the stages in registration order
    ///
    /// Stops at the first stage that terminates the event or fails. A
    /// failing stage is logged and the event abandoned; it is not retried
    /// at this layer.
    pub async fn run(&self, event: &mut InboundEvent) -> DispatchOutcome {
        for stage in &self.stages {
            match stage.process(event).await {
                Ok(StageSignal::Continue) => {}
                Ok(StageSignal::Terminate) => {
                    tracing::debug!(
                        stage = stage.name(),
                        event = %event.id(),
                        session = event.session_key(),
                        "Stage terminated event dispatch"
                    );
                    return DispatchOutcome::Stopped;
                }
                Err(err) => {
                    tracing::error!(
                        stage = stage.name(),
                        event = %event.id(),
                        session = event.session_key(),
                        error = %err,
                        "Stage failed, abandoning event"
                    );
                    return DispatchOutcome::Failed(err);
                }
            }
        }
        DispatchOutcome::PassedThrough
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("context", &self.context)
            .field("stage_count", &self.stages.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
