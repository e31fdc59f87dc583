//! Adaptive, interruptible rest between engine cycles.
//!
//! The rest length scales with the external data-completeness metric: the
//! more complete the picture, the longer the agent can afford to sleep.
//! A wake signal (urgent user input) resolves the pending wait immediately.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Duration mapping
// ---------------------------------------------------------------------------

/// Banded mapping from data completeness (0.0–1.0) to rest length.
pub fn rest_duration(completeness: f32) -> Duration {
    let c = completeness.clamp(0.0, 1.0);
    let minutes = if c < 0.25 {
        15
    } else if c < 0.50 {
        30
    } else if c < 0.75 {
        60
    } else {
        120
    };
    Duration::from_secs(minutes * 60)
}

// ---------------------------------------------------------------------------
// RestWindow
// ---------------------------------------------------------------------------

/// One reusable wake handle shared across all rest periods.
#[derive(Clone)]
pub struct RestWindow {
    wake: Arc<Notify>,
}

impl RestWindow {
    pub fn new() -> Self {
        Self {
            wake: Arc::new(Notify::new()),
        }
    }

    /// Handle external callers use to cut a rest short.
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Sleep for `duration` or until woken. Returns `true` if woken early.
    pub async fn rest(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.wake.notified() => true,
        }
    }
}

impl Default for RestWindow {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
