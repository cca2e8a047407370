//! Relay Core - Staged Event Pipeline with Admission Control
//!
//! This crate provides the event-processing pipeline for relay, completely
//! independent of any platform adapter or UI. Inbound events are driven
//! through an ordered list of stages; the built-in admission-control stage
//! decides, per conversational session, whether an event proceeds
//! immediately, stalls until rate-limit capacity frees up, or is dropped.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Platform Adapters                        │
//! │        (create InboundEvents, call Dispatcher::run)          │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//! ┌──────────────────────────────┼───────────────────────────────┐
//! │                        RELAY CORE                            │
//! │  ┌───────────────────────────┴────────────────────────────┐  │
//! │  │                      Dispatcher                        │  │
//! │  │   ┌──────────────────┐      ┌──────────────────────┐   │  │
//! │  │   │ AdmissionControl │ ───► │   further stages...  │   │  │
//! │  │   │      Stage       │      │  (business logic)    │   │  │
//! │  │   └───┬──────────┬───┘      └──────────────────────┘   │  │
//! │  │       │          │                                     │  │
//! │  │  ┌────┴─────┐ ┌──┴────────┐                            │  │
//! │  │  │ Session  │ │ Fixed-    │     per-session, sharded,  │  │
//! │  │  │ Locks    │ │ Window    │     no global lock         │  │
//! │  │  └──────────┘ └───────────┘                            │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Dispatcher`]: drives each event through the stages in order
//! - [`Stage`]: the `initialize`/`process` contract stages implement
//! - [`AdmissionControlStage`]: per-session fixed-window rate limiting
//! - [`InboundEvent`]: one inbound unit of work, keyed by session
//! - [`RateLimitConfig`] / [`PipelineContext`]: validated configuration
//!
//! # Quick Start
//!
//! ```ignore
//! use relay_core::{
//!     AdmissionControlStage, Dispatcher, InboundEvent, PipelineContext,
//!     RateLimitConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), relay_core::PipelineError> {
//!     let config = relay_core::load_config()?;
//!     let context = PipelineContext::new(&config)?;
//!     let dispatcher = Dispatcher::assemble(
//!         context,
//!         vec![Box::new(AdmissionControlStage::new())],
//!     )
//!     .await?;
//!
//!     let mut event = InboundEvent::new("qq:12345", "hello");
//!     let outcome = dispatcher.run(&mut event).await;
//!     if outcome.is_passed_through() {
//!         // hand the event to business logic
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`config`]: rate-limit settings, validation, TOML file loading
//! - [`event`]: the inbound event type and its termination flag
//! - [`pipeline`]: the stage contract and the dispatcher
//! - [`rate_limit`]: the admission-control stage and its per-session state
//!
//! # No Platform Dependencies
//!
//! This crate has **zero** dependencies on any chat platform SDK, HTTP
//! stack, or UI framework. It's pure pipeline logic that can be driven from
//! anywhere.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod event;
pub mod pipeline;
pub mod rate_limit;

// Re-exports for convenience
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, OverflowStrategy,
    RateLimitConfig, RateLimitToml, RelayToml,
};
pub use event::{EventId, InboundEvent};
pub use pipeline::{
    DispatchOutcome, Dispatcher, PipelineContext, PipelineError, Stage, StageError, StageSignal,
};
pub use rate_limit::{AdmissionControlStage, STALL_GRACE};
