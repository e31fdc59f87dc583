//! Scheduled action data model.
//!
//! A `ScheduledAction` is the atomic unit of schedulable work: a tool name
//! and input, a priority, optional dependencies, an optional due time, and
//! an optional recurrence. The scheduler in `scheduler.rs` owns all
//! transitions between the four lists.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Priority bands. Lower value = more urgent. Retries escalate toward 0.
pub mod priority {
    pub const CRITICAL: u8 = 0;
    pub const HIGH: u8 = 1;
    pub const NORMAL: u8 = 2;
    pub const LOW: u8 = 3;
}

// ---------------------------------------------------------------------------
// ActionStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an action.
///
/// Transitions are monotonic except `Pending ↔ Blocked` and the retry edge
/// `Failed-attempt → Pending`. Terminal states (`Completed`, `Failed`,
/// `Cancelled`) live only in the history list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Waiting for its due time on the scheduled list.
    Scheduled,
    /// Ready to run, sitting in the priority queue.
    Pending,
    /// Waiting on unmet dependencies.
    Blocked,
    /// Currently running (at most one per instance).
    Executing,
    Completed,
    Failed,
    Cancelled,
}

// ---------------------------------------------------------------------------
// Recurrence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    #[default]
    None,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Recurrence {
    /// Next due time for a recurring clone, computed from `from`.
    ///
    /// `Monthly` advances the calendar month (clamping day 31 → 28/30 where
    /// needed) rather than adding a fixed number of days.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Recurrence::None => None,
            Recurrence::Hourly => Some(from + Duration::hours(1)),
            Recurrence::Daily => Some(from + Duration::hours(24)),
            Recurrence::Weekly => Some(from + Duration::days(7)),
            Recurrence::Monthly => Some(add_one_month(from)),
        }
    }
}

fn add_one_month(from: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if from.month() == 12 {
        (from.year() + 1, 1)
    } else {
        (from.year(), from.month() + 1)
    };
    // Clamp the day until it lands on a valid date (e.g. Jan 31 → Feb 28).
    let mut day = from.day();
    loop {
        if let Some(next) = from
            .with_day(1)
            .and_then(|d| d.with_year(year))
            .and_then(|d| d.with_month(month))
            .and_then(|d| d.with_day(day))
        {
            return next;
        }
        day -= 1;
    }
}

// ---------------------------------------------------------------------------
// ScheduledAction
// ---------------------------------------------------------------------------

/// Unit of schedulable work with priority, dependencies, and recurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledAction {
    pub id: Uuid,
    /// What kind of work this is (e.g. "sync", "publish", "review").
    pub action_type: String,
    /// Tool slug resolved by the executor.
    pub tool: String,
    /// What the tool operates on (free-form, tool-specific).
    pub target: String,
    pub params: serde_json::Value,
    /// Lower = more urgent. Ties broken by `created_at` (FIFO).
    pub priority: u8,
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub depends_on: Vec<Uuid>,
    #[serde(default)]
    pub recurrence: Recurrence,
    #[serde(default)]
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Caller-facing request for a new action. The scheduler fills in id,
/// status, timestamps, and placement.
#[derive(Debug, Clone, Default)]
pub struct ActionSpec {
    pub action_type: String,
    pub tool: String,
    pub target: String,
    pub params: serde_json::Value,
    pub priority: u8,
    pub goal_id: Option<String>,
    pub project_id: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub depends_on: Vec<Uuid>,
    pub recurrence: Recurrence,
    pub max_attempts: Option<u32>,
}

impl ScheduledAction {
    pub fn from_spec(spec: ActionSpec, default_max_attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type: spec.action_type,
            tool: spec.tool,
            target: spec.target,
            params: spec.params,
            priority: spec.priority,
            status: ActionStatus::Pending,
            goal_id: spec.goal_id,
            project_id: spec.project_id,
            scheduled_for: spec.scheduled_for,
            depends_on: spec.depends_on,
            recurrence: spec.recurrence,
            attempts: 0,
            max_attempts: spec.max_attempts.unwrap_or(default_max_attempts),
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Fresh clone for the next recurrence: new id, reset execution fields,
    /// `scheduled_for` recomputed from now.
    pub fn recurrence_clone(&self, due: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: ActionStatus::Scheduled,
            scheduled_for: Some(due),
            attempts: 0,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn recurrence_intervals() {
        let from = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(
            Recurrence::Hourly.next_after(from),
            Some(from + Duration::hours(1))
        );
        assert_eq!(
            Recurrence::Daily.next_after(from),
            Some(from + Duration::hours(24))
        );
        assert_eq!(
            Recurrence::Weekly.next_after(from),
            Some(from + Duration::days(7))
        );
        assert_eq!(Recurrence::None.next_after(from), None);
    }

    #[test]
    fn monthly_advances_calendar_month() {
        let from = Utc.with_ymd_and_hms(2026, 3, 10, 8, 30, 0).unwrap();
        let next = Recurrence::Monthly.next_after(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 4, 10, 8, 30, 0).unwrap());
    }

    #[test]
    fn monthly_clamps_end_of_month() {
        let from = Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap();
        let next = Recurrence::Monthly.next_after(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap());
    }

    #[test]
    fn monthly_wraps_year() {
        let from = Utc.with_ymd_and_hms(2025, 12, 15, 0, 0, 0).unwrap();
        let next = Recurrence::Monthly.next_after(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn recurrence_clone_resets_execution_fields() {
        let mut action = ScheduledAction::from_spec(
            ActionSpec {
                action_type: "sync".into(),
                tool: "inbox".into(),
                recurrence: Recurrence::Daily,
                ..Default::default()
            },
            3,
        );
        action.attempts = 2;
        action.result = Some(serde_json::json!({"ok": true}));
        action.error = Some("transient".into());

        let due = Utc::now() + Duration::hours(24);
        let clone = action.recurrence_clone(due);

        assert_ne!(clone.id, action.id);
        assert_eq!(clone.status, ActionStatus::Scheduled);
        assert_eq!(clone.scheduled_for, Some(due));
        assert_eq!(clone.attempts, 0);
        assert!(clone.result.is_none());
        assert!(clone.error.is_none());
        assert_eq!(clone.tool, "inbox");
        assert_eq!(clone.recurrence, Recurrence::Daily);
    }
}
