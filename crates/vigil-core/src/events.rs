//! Typed lifecycle events over a broadcast channel.
//!
//! Subscribers (CLI output, future UI surfaces) get strongly-typed events
//! instead of string-keyed emissions. Emitting with no subscribers is fine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// EngineEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    ActionStarted {
        id: Uuid,
        tool: String,
    },
    ActionCompleted {
        id: Uuid,
        tool: String,
    },
    ActionFailed {
        id: Uuid,
        tool: String,
        error: String,
        will_retry: bool,
    },
    ModeChanged {
        mode: String,
    },
    GoalSelected {
        id: String,
        title: String,
    },
    GoalHeld {
        id: String,
        reason: String,
    },
    GoalCompleted {
        id: String,
    },
    ApprovalRequested {
        goal_id: String,
        title: String,
    },
    RestStarted {
        until: DateTime<Utc>,
        reason: String,
    },
    RestEnded {
        woken: bool,
    },
    BillingPause {
        until: DateTime<Utc>,
    },
    CycleError {
        error: String,
    },
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Fire-and-forget: a send error just means nobody is listening.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
