//! `vigil-engine` — the state machine that keeps a vigil instance working.
//!
//! Three pieces cooperate here:
//!
//! - [`coordinator::WorkerCoordinator`] decides whether this process may
//!   execute side effects (worker) or only observe (viewer), via a
//!   heartbeat-renewed lease with a fencing token.
//! - [`engine::EngineLoop`] runs the cycle: drain due scheduler work, select
//!   or generate a goal, dispatch through the orchestrator (or the fallback
//!   executor), classify failures into holds, rest adaptively.
//! - The collaborator contracts ([`orchestrator::Orchestrator`],
//!   [`vigil_core::goal::GoalManager`], [`notify::Notifier`]) keep the AI
//!   layer and goal storage outside this crate.

pub mod approval;
pub mod coordinator;
pub mod engine;
pub mod executor;
pub mod goal_store;
pub mod handoff;
pub mod notify;
pub mod orchestrator;
pub mod rest;
pub mod session;

pub use coordinator::{FileLeaseStore, LeaseRecord, LeaseStore, WorkerCoordinator, WorkerMode};
pub use engine::{CyclePause, EngineDeps, EngineLoop, EngineState};
pub use notify::{LogNotifier, Notifier, NoticeLevel, NullNotifier};
pub use goal_store::YamlGoalStore;
pub use orchestrator::{
    CommandGoalSource, CommandOrchestrator, GoalContext, GoalRunResult, GoalSource, Orchestrator,
};
