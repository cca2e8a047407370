//! Inbound Events
//!
//! The unit of work the pipeline processes. An event is created by an
//! upstream platform adapter, driven through the pipeline by the
//! [`Dispatcher`](crate::pipeline::Dispatcher), and either handed to
//! downstream business logic (passed through) or dropped (terminated).
//!
//! # Design Philosophy
//!
//! Events don't know what the pipeline will do with them. They carry the
//! session key that groups them into a rate-limit window, the payload, and
//! a termination flag any stage can set to halt further dispatch.

use serde::{Deserialize, Serialize};

/// Process-unique event identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// Generate a new unique event ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("evt_{id}"))
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An inbound unit of work flowing through the pipeline
///
/// The `session_key` is a stable identifier grouping all events that share
/// one rate-limit window (typically platform + conversation id). Once a
/// stage calls [`InboundEvent::stop`], dispatch halts and downstream
/// business logic never sees the event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Unique event ID
    id: EventId,
    /// Stable identifier of the conversation/session this event belongs to
    session_key: String,
    /// Message payload as delivered by the platform adapter
    content: String,
    /// When the event was received (Unix timestamp ms)
    received_at: u64,
    /// Whether a stage has terminated this event's dispatch
    terminated: bool,
}

impl InboundEvent {
    /// Create a new event for a session
    pub fn new(session_key: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            session_key: session_key.into(),
            content: content.into(),
            received_at: now_ms(),
            terminated: false,
        }
    }

    /// The event's unique ID
    #[must_use]
    pub fn id(&self) -> &EventId {
        &self.id
    }

    /// The session key this event is rate-limited under
    #[must_use]
    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    /// The message payload
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// When the event was received (Unix timestamp ms)
    #[must_use]
    pub fn received_at(&self) -> u64 {
        self.received_at
    }

    /// Terminate this event's dispatch
    ///
    /// Calling this is the sole way a stage communicates a drop decision to
    /// the rest of the pipeline and to downstream business logic.
    pub fn stop(&mut self) {
        self.terminated = true;
    }

    /// Whether a stage has terminated this event
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

/// Current Unix timestamp in milliseconds
fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_unique() {
        let a = EventId::new();
        let b = EventId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_new_event_not_terminated() {
        let event = InboundEvent::new("qq:12345", "hello");
        assert_eq!(event.session_key(), "qq:12345");
        assert_eq!(event.content(), "hello");
        assert!(!event.is_terminated());
    }

    #[test]
    fn test_stop_sets_terminated() {
        let mut event = InboundEvent::new("qq:12345", "hello");
        event.stop();
        assert!(event.is_terminated());

        // stop is idempotent
        event.stop();
        assert!(event.is_terminated());
    }

    #[test]
    fn test_event_serde_round_trip() {
        let event = InboundEvent::new("tg:42", "payload");
        let json = toml::to_string(&event).expect("serialize");
        let back: InboundEvent = toml::from_str(&json).expect("deserialize");
        assert_eq!(back.session_key(), event.session_key());
        assert_eq!(back.content(), event.content());
        assert_eq!(back.is_terminated(), event.is_terminated());
    }
}
