//! Status events: progress notifications emitted while a session runs.
//!
//! Every event is recorded in the run report and also published on an
//! [`EventBus`] so live consumers (the CLI, a future gateway) can follow
//! a session without polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::session::SessionStatus;

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusKind {
    /// The reasoner was asked for the next step
    ReasonerInvoked,

    ToolStarted {
        call_id: String,
        tool: String,
    },

    ToolFinished {
        call_id: String,
        tool: String,
        outcome: String,
        duration_ms: u64,
    },

    /// An external tool was used before the curated corpus was tried
    RoutingAdvisory {
        tool: String,
        reason: String,
    },

    /// A final answer passed citation validation
    Finalized {
        citations: Vec<String>,
    },

    Terminated {
        status: SessionStatus,
    },
}

/// One progress notification for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Monotonic sequence number within the session, starting at 0
    pub seq: u64,
    pub session_id: String,
    pub iteration: u32,
    #[serde(flatten)]
    pub kind: StatusKind,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(seq: u64, session_id: impl Into<String>, iteration: u32, kind: StatusKind) -> Self {
        Self {
            seq,
            session_id: session_id.into(),
            iteration,
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// A broadcast-based bus for status events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Slow
/// subscribers lag and drop old events; publishers never block.
pub struct EventBus {
    sender: broadcast::Sender<Arc<StatusEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: StatusEvent) {
        let seq = event.seq;
        if self.sender.send(Arc::new(event)).is_err() {
            tracing::trace!(seq, "No status subscribers");
        }
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StatusEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
