//! Goal types and the `GoalManager` collaborator contract.
//!
//! Goals are owned by an external manager; the core only references them.
//! The engine holds at most one current goal at a time.

use crate::hold::HoldReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Goal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalState {
    Active,
    OnHold,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub title: String,
    /// Drives the engine-state label and the fallback action sequence.
    pub category: String,
    pub state: GoalState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_reason: Option<HoldReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Goal {
    pub fn new(id: impl Into<String>, title: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            category: category.into(),
            state: GoalState::Active,
            hold_reason: None,
            review_at: None,
            project_id: None,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// GoalTask
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Open,
    Blocked,
    OnHold,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalTask {
    pub id: String,
    pub goal_id: String,
    pub title: String,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_reason: Option<HoldReason>,
}

// ---------------------------------------------------------------------------
// CriteriaReport
// ---------------------------------------------------------------------------

/// Result of evaluating a goal's completion criteria.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriteriaReport {
    pub complete: bool,
    pub completed_count: usize,
    pub total_count: usize,
}

// ---------------------------------------------------------------------------
// GoalManager contract
// ---------------------------------------------------------------------------

/// External goal-state collaborator. Implementations are expected to be
/// cheap, synchronous reads/writes over their own storage; the engine calls
/// these inside its single-threaded cycle.
pub trait GoalManager: Send + Sync {
    fn current_goal(&self) -> Option<Goal>;
    /// Pick the next active, non-held goal and make it current.
    fn select_next_goal(&self) -> Option<Goal>;
    fn add_goal(&self, goal: Goal);
    fn set_current_goal(&self, goal_id: Option<&str>);
    fn goal_status(&self, goal_id: &str) -> Option<GoalState>;
    fn active_goals(&self) -> Vec<Goal>;
    fn held_goals(&self) -> Vec<Goal>;

    fn tasks(&self, goal_id: &str) -> Vec<GoalTask>;
    fn next_task(&self, goal_id: &str) -> Option<GoalTask>;
    fn complete_task(&self, task_id: &str, result: &str);
    fn hold_task(&self, task_id: &str, reason: HoldReason);

    fn put_goal_on_hold(&self, goal_id: &str, reason: HoldReason, notes: &str);
    /// Clear a hold and reactivate (used to break the all-goals-held deadlock).
    fn release_goal(&self, goal_id: &str);
    fn complete_goal(&self, goal_id: &str);

    fn evaluate_criteria(&self, goal_id: &str) -> CriteriaReport;
    /// Record an orchestrator-reported tool call against the goal's history.
    fn record_activity(&self, goal_id: &str, description: &str);
    /// Count of recorded activity entries; indexes the fallback sequence.
    fn activity_len(&self, goal_id: &str) -> usize;

    /// External 0.0–1.0 metric driving the adaptive rest window.
    fn data_completeness(&self) -> f32;
}
