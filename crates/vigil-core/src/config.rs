//! Runtime configuration, loaded from `.vigil/config.yaml`.
//!
//! Every knob has a serde default so a missing or partial file yields a
//! working daemon. Command tables map tool slugs and the orchestrator to
//! external argv vectors; the AI layer itself stays opaque.

use crate::error::Result;
use crate::io;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Tick interval for the scheduler's own drive loop.
    #[serde(default = "default_tick_secs")]
    pub tick_interval_secs: u64,
    /// Default retry budget for actions that don't specify one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Completed/failed/cancelled history retention cap.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

fn default_tick_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_history_cap() -> usize {
    100
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_secs(),
            max_attempts: default_max_attempts(),
            history_cap: default_history_cap(),
        }
    }
}

// ---------------------------------------------------------------------------
// LeaseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// Heartbeat renewal interval while holding the lease.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// A heartbeat older than this is stale and the lease is up for grabs.
    #[serde(default = "default_stale_secs")]
    pub stale_secs: u64,
    /// Upper bound of the randomized claim delay. Zero in tests.
    #[serde(default = "default_jitter_secs")]
    pub election_jitter_max_secs: u64,
}

fn default_heartbeat_secs() -> u64 {
    15
}

fn default_stale_secs() -> u64 {
    45
}

fn default_jitter_secs() -> u64 {
    5
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            stale_secs: default_stale_secs(),
            election_jitter_max_secs: default_jitter_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hard timeout raced against each orchestrator call.
    #[serde(default = "default_orchestrator_timeout_secs")]
    pub orchestrator_timeout_secs: u64,
    /// Pause after a recognized billing/credit failure.
    #[serde(default = "default_billing_pause_secs")]
    pub billing_pause_secs: u64,
    /// Minimum gap between goal-generation requests to the AI brain.
    #[serde(default = "default_generation_cooldown_secs")]
    pub generation_cooldown_secs: u64,
    /// Consecutive orchestrator failures before switching goals.
    #[serde(default = "default_failure_switch_threshold")]
    pub failure_switch_threshold: u32,
    /// Fixed backoff after an uncaught cycle error.
    #[serde(default = "default_cycle_error_backoff_secs")]
    pub cycle_error_backoff_secs: u64,
    /// How long a persisted handoff stays valid.
    #[serde(default = "default_handoff_ttl_secs")]
    pub handoff_ttl_secs: u64,
    /// Sleep between cycles while in viewer mode.
    #[serde(default = "default_viewer_poll_secs")]
    pub viewer_poll_secs: u64,
}

fn default_orchestrator_timeout_secs() -> u64 {
    15 * 60
}

fn default_billing_pause_secs() -> u64 {
    60 * 60
}

fn default_generation_cooldown_secs() -> u64 {
    10 * 60
}

fn default_failure_switch_threshold() -> u32 {
    20
}

fn default_cycle_error_backoff_secs() -> u64 {
    5
}

fn default_handoff_ttl_secs() -> u64 {
    4 * 60 * 60
}

fn default_viewer_poll_secs() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            orchestrator_timeout_secs: default_orchestrator_timeout_secs(),
            billing_pause_secs: default_billing_pause_secs(),
            generation_cooldown_secs: default_generation_cooldown_secs(),
            failure_switch_threshold: default_failure_switch_threshold(),
            cycle_error_backoff_secs: default_cycle_error_backoff_secs(),
            handoff_ttl_secs: default_handoff_ttl_secs(),
            viewer_poll_secs: default_viewer_poll_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// CommandSpec — external argv for a tool or the orchestrator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program plus fixed leading arguments.
    pub argv: Vec<String>,
    /// Extra environment for the subprocess.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// VigilConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub lease: LeaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Orchestrator command; absent means "no orchestrator, fallback only".
    #[serde(default)]
    pub orchestrator: Option<CommandSpec>,
    /// Goal-generation command, consulted when no active goals remain.
    #[serde(default)]
    pub goal_source: Option<CommandSpec>,
    /// Tool slug → command table for the plain executor.
    #[serde(default)]
    pub tools: HashMap<String, CommandSpec>,
}

impl VigilConfig {
    /// Load `.vigil/config.yaml`, falling back to defaults if absent.
    pub fn load(root: &Path) -> Result<Self> {
        Ok(io::load_yaml(&paths::config_path(root))?.unwrap_or_default())
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        io::save_yaml(&paths::config_path(root), self)
    }

    pub fn orchestrator_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.orchestrator_timeout_secs)
    }

    pub fn billing_pause(&self) -> Duration {
        Duration::from_secs(self.engine.billing_pause_secs)
    }

    pub fn generation_cooldown(&self) -> Duration {
        Duration::from_secs(self.engine.generation_cooldown_secs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
