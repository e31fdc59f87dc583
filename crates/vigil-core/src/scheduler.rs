//! Durable priority/dependency queue with retries and recurrence.
//!
//! The scheduler owns four lists and every transition between them:
//!
//! - `queue`     — ready actions, ordered by priority ascending, then
//!                 `created_at` ascending (strict FIFO within a band)
//! - `scheduled` — time-gated actions, ordered by due time
//! - `blocked`   — actions with unmet dependencies
//! - `completed` — terminal history (completed/failed/cancelled), newest
//!                 first, capped
//!
//! An action is in exactly one list at any time except transiently during a
//! move. Every mutating call persists the full state atomically, so a crash
//! recovers from the latest snapshot without replaying a log. Any action
//! found in `Executing` state on reload is demoted back to `Pending` (the
//! attempt was already counted).

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::{ActionSpec, ActionStatus, ScheduledAction};
use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::events::{EngineEvent, EventBus};
use crate::{io, paths};

// ---------------------------------------------------------------------------
// Executor contract
// ---------------------------------------------------------------------------

/// Outcome of a single tool execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn ok(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Generic executor contract. Infrastructure failures surface as `Err`;
/// tool-level failures as `Ok` with `success: false`. The scheduler treats
/// both as a failed attempt.
#[async_trait::async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &ScheduledAction) -> Result<ExecutionOutcome>;
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub version: u32,
    pub queue: Vec<ScheduledAction>,
    pub scheduled: Vec<ScheduledAction>,
    pub blocked: Vec<ScheduledAction>,
    pub completed: VecDeque<ScheduledAction>,
    pub current_goal: Option<String>,
    pub current_project: Option<String>,
}

impl Default for SchedulerSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            queue: Vec::new(),
            scheduled: Vec::new(),
            blocked: Vec::new(),
            completed: VecDeque::new(),
            current_goal: None,
            current_project: None,
        }
    }
}

impl SchedulerSnapshot {
    /// Every id in `deps` has a `Completed` counterpart in history.
    /// Failed or cancelled dependencies do not satisfy.
    fn deps_satisfied(&self, deps: &[Uuid]) -> bool {
        deps.iter().all(|dep| {
            self.completed
                .iter()
                .any(|a| a.id == *dep && a.status == ActionStatus::Completed)
        })
    }

    fn insert_queued(&mut self, action: ScheduledAction) {
        let pos = self
            .queue
            .iter()
            .position(|a| (a.priority, a.created_at) > (action.priority, action.created_at))
            .unwrap_or(self.queue.len());
        self.queue.insert(pos, action);
    }

    fn insert_scheduled(&mut self, action: ScheduledAction) {
        let due = action.scheduled_for;
        let pos = self
            .scheduled
            .iter()
            .position(|a| a.scheduled_for > due)
            .unwrap_or(self.scheduled.len());
        self.scheduled.insert(pos, action);
    }

    fn push_history(&mut self, action: ScheduledAction, cap: usize) {
        self.completed.push_front(action);
        self.completed.truncate(cap);
    }

    /// Move any blocked action whose dependencies are now satisfied into the
    /// ready queue.
    fn promote_blocked(&mut self) {
        let mut i = 0;
        while i < self.blocked.len() {
            if self.deps_satisfied(&self.blocked[i].depends_on.clone()) {
                let mut action = self.blocked.remove(i);
                action.status = ActionStatus::Pending;
                self.insert_queued(action);
            } else {
                i += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ActionScheduler
// ---------------------------------------------------------------------------

pub struct ActionScheduler {
    path: PathBuf,
    config: SchedulerConfig,
    events: EventBus,
    state: Mutex<SchedulerSnapshot>,
    /// At-most-one in-flight action per instance.
    in_flight: AtomicBool,
}

impl ActionScheduler {
    /// Open the scheduler, reloading the latest snapshot if one exists.
    pub fn open(root: &Path, config: SchedulerConfig, events: EventBus) -> Result<Self> {
        let path = paths::scheduler_path(root);
        let mut snapshot: SchedulerSnapshot = io::load_yaml(&path)?.unwrap_or_default();

        // Crash recovery: an action persisted mid-execution goes back to
        // pending. Its attempt was already counted.
        for action in snapshot.queue.iter_mut() {
            if action.status == ActionStatus::Executing {
                action.status = ActionStatus::Pending;
            }
        }

        Ok(Self {
            path,
            config,
            events,
            state: Mutex::new(snapshot),
            in_flight: AtomicBool::new(false),
        })
    }

    fn persist(&self, state: &SchedulerSnapshot) -> Result<()> {
        io::save_yaml(&self.path, state)
    }

    /// Build and place a new action.
    ///
    /// Time-gated specs go to the scheduled list; dependency-satisfied specs
    /// to the ready queue; the rest to blocked.
    pub fn schedule(&self, spec: ActionSpec) -> Result<ScheduledAction> {
        let mut action = ScheduledAction::from_spec(spec, self.config.max_attempts);
        let mut state = self.state.lock().expect("scheduler lock poisoned");

        if action.scheduled_for.is_some() {
            action.status = ActionStatus::Scheduled;
            state.insert_scheduled(action.clone());
        } else if state.deps_satisfied(&action.depends_on) {
            action.status = ActionStatus::Pending;
            state.insert_queued(action.clone());
        } else {
            action.status = ActionStatus::Blocked;
            state.blocked.push(action.clone());
        }

        self.persist(&state)?;
        Ok(action)
    }

    /// Return the next runnable action, or `None`.
    ///
    /// Due scheduled actions are promoted first: a dependency-satisfied one
    /// is returned immediately (single pop); unsatisfied ones move to
    /// blocked. Otherwise the head of the ready queue is returned. The
    /// returned action stays in the queue in `Pending` state until
    /// `execute` moves it; that keeps the snapshot crash-safe.
    pub fn next_action(&self) -> Result<Option<ScheduledAction>> {
        let mut state = self.state.lock().expect("scheduler lock poisoned");
        let now = Utc::now();
        let mut dirty = false;

        while let Some(first) = state.scheduled.first() {
            match first.scheduled_for {
                Some(due) if due <= now => {}
                _ => break,
            }
            let mut action = state.scheduled.remove(0);
            dirty = true;
            if state.deps_satisfied(&action.depends_on) {
                action.status = ActionStatus::Pending;
                state.queue.insert(0, action.clone());
                self.persist(&state)?;
                return Ok(Some(action));
            }
            action.status = ActionStatus::Blocked;
            state.blocked.push(action);
        }

        if dirty {
            self.persist(&state)?;
        }

        Ok(state
            .queue
            .iter()
            .find(|a| a.status == ActionStatus::Pending)
            .cloned())
    }

    /// Run `action` through `executor` exactly once and record the outcome.
    ///
    /// On success the action moves to history; a recurring action schedules a
    /// fresh clone and the blocked list is re-scanned. On failure the action
    /// retries with escalated priority until `max_attempts`, then fails
    /// permanently.
    pub async fn execute(
        &self,
        action_id: Uuid,
        executor: &dyn ActionExecutor,
    ) -> Result<ExecutionOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(crate::VigilError::ActionInFlight);
        }
        let result = self.execute_inner(action_id, executor).await;
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn execute_inner(
        &self,
        action_id: Uuid,
        executor: &dyn ActionExecutor,
    ) -> Result<ExecutionOutcome> {
        // Phase 1: mark executing. The action stays in the queue so a crash
        // here recovers it on reload.
        let action = {
            let mut state = self.state.lock().expect("scheduler lock poisoned");
            let Some(entry) = state.queue.iter_mut().find(|a| a.id == action_id) else {
                return Err(crate::VigilError::ActionNotFound(action_id));
            };
            entry.status = ActionStatus::Executing;
            entry.attempts += 1;
            entry.started_at = Some(Utc::now());
            let action = entry.clone();
            self.persist(&state)?;
            action
        };

        self.events.emit(EngineEvent::ActionStarted {
            id: action.id,
            tool: action.tool.clone(),
        });
        tracing::debug!(id = %action.id, tool = %action.tool, attempt = action.attempts, "executing action");

        let outcome = match executor.execute(&action).await {
            Ok(outcome) => outcome,
            Err(e) => ExecutionOutcome::failed(e.to_string()),
        };

        // Phase 2: record the outcome.
        let mut state = self.state.lock().expect("scheduler lock poisoned");
        let Some(pos) = state.queue.iter().position(|a| a.id == action_id) else {
            // Cancelled or cleared while running; drop the outcome.
            return Ok(outcome);
        };
        let mut action = state.queue.remove(pos);

        if outcome.success {
            action.status = ActionStatus::Completed;
            action.result = outcome.output.clone();
            action.completed_at = Some(Utc::now());
            let recurrence = action.recurrence;
            let finished = action.clone();
            state.push_history(action, self.config.history_cap);

            if let Some(due) = recurrence.next_after(Utc::now()) {
                state.insert_scheduled(finished.recurrence_clone(due));
            }

            state.promote_blocked();
            self.persist(&state)?;
            self.events.emit(EngineEvent::ActionCompleted {
                id: finished.id,
                tool: finished.tool.clone(),
            });
        } else {
            let error = outcome
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".into());
            action.error = Some(error.clone());
            let will_retry = action.attempts < action.max_attempts;
            if will_retry {
                // Each retry becomes more urgent.
                action.status = ActionStatus::Pending;
                action.priority = action.priority.saturating_sub(1);
                action.started_at = None;
                let requeued = action.clone();
                state.insert_queued(action);
                self.persist(&state)?;
                self.events.emit(EngineEvent::ActionFailed {
                    id: requeued.id,
                    tool: requeued.tool,
                    error,
                    will_retry: true,
                });
            } else {
                action.status = ActionStatus::Failed;
                action.completed_at = Some(Utc::now());
                let failed = action.clone();
                state.push_history(action, self.config.history_cap);
                self.persist(&state)?;
                tracing::warn!(id = %failed.id, tool = %failed.tool, "action permanently failed");
                self.events.emit(EngineEvent::ActionFailed {
                    id: failed.id,
                    tool: failed.tool,
                    error,
                    will_retry: false,
                });
            }
        }

        Ok(outcome)
    }

    /// Cancel an action wherever it currently lives (queue → scheduled →
    /// blocked, first match). Returns `None` if not found — idempotent.
    pub fn cancel(&self, id: Uuid) -> Result<Option<ScheduledAction>> {
        let mut state = self.state.lock().expect("scheduler lock poisoned");

        let removed = if let Some(pos) = state.queue.iter().position(|a| a.id == id) {
            Some(state.queue.remove(pos))
        } else if let Some(pos) = state.scheduled.iter().position(|a| a.id == id) {
            Some(state.scheduled.remove(pos))
        } else if let Some(pos) = state.blocked.iter().position(|a| a.id == id) {
            Some(state.blocked.remove(pos))
        } else {
            None
        };

        let Some(mut action) = removed else {
            return Ok(None);
        };
        action.status = ActionStatus::Cancelled;
        action.completed_at = Some(Utc::now());
        let cancelled = action.clone();
        state.push_history(action, self.config.history_cap);
        self.persist(&state)?;
        Ok(Some(cancelled))
    }

    /// Remove all active actions for a goal. History is untouched.
    pub fn clear_goal_actions(&self, goal_id: &str) -> Result<usize> {
        self.clear_where(|a| a.goal_id.as_deref() == Some(goal_id))
    }

    /// Remove all active actions for a project. History is untouched.
    pub fn clear_project_actions(&self, project_id: &str) -> Result<usize> {
        self.clear_where(|a| a.project_id.as_deref() == Some(project_id))
    }

    fn clear_where(&self, matches: impl Fn(&ScheduledAction) -> bool) -> Result<usize> {
        let mut state = self.state.lock().expect("scheduler lock poisoned");
        let before = state.queue.len() + state.scheduled.len() + state.blocked.len();
        state.queue.retain(|a| !matches(a));
        state.scheduled.retain(|a| !matches(a));
        state.blocked.retain(|a| !matches(a));
        let removed = before - (state.queue.len() + state.scheduled.len() + state.blocked.len());
        if removed > 0 {
            self.persist(&state)?;
        }
        Ok(removed)
    }

    /// Record the goal/project context persisted alongside the lists.
    pub fn set_context(&self, goal: Option<String>, project: Option<String>) -> Result<()> {
        let mut state = self.state.lock().expect("scheduler lock poisoned");
        state.current_goal = goal;
        state.current_project = project;
        self.persist(&state)
    }

    /// Clone of the full persisted state, for status surfaces.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        self.state.lock().expect("scheduler lock poisoned").clone()
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Drive the scheduler from its own timer: each tick runs at most one
    /// action. Returns the task handle so callers can abort on shutdown.
    pub fn start(
        self: &Arc<Self>,
        executor: Arc<dyn ActionExecutor>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if scheduler.has_in_flight() {
                    continue;
                }
                match scheduler.next_action() {
                    Ok(Some(action)) => {
                        if let Err(e) = scheduler.execute(action.id, executor.as_ref()).await {
                            tracing::error!(error = %e, id = %action.id, "scheduler tick failed");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::error!(error = %e, "scheduler tick failed"),
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{priority, Recurrence};
    use chrono::Duration as CDur;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    struct StubExecutor {
        succeed: bool,
        calls: AtomicUsize,
    }

    impl StubExecutor {
        fn ok() -> Self {
            Self {
                succeed: true,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                succeed: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ActionExecutor for StubExecutor {
        async fn execute(&self, _action: &ScheduledAction) -> Result<ExecutionOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(ExecutionOutcome::ok(serde_json::json!({"done": true})))
            } else {
                Ok(ExecutionOutcome::failed("connection timeout"))
            }
        }
    }

    fn open_tmp() -> (TempDir, ActionScheduler) {
        let dir = TempDir::new().unwrap();
        let scheduler =
            ActionScheduler::open(dir.path(), SchedulerConfig::default(), EventBus::new()).unwrap();
        (dir, scheduler)
    }

    fn spec(tool: &str, prio: u8) -> ActionSpec {
        ActionSpec {
            action_type: "work".into(),
            tool: tool.into(),
            target: "t".into(),
            params: serde_json::json!({}),
            priority: prio,
            ..Default::default()
        }
    }

    #[test]
    fn lower_priority_value_dequeues_first() {
        let (_dir, s) = open_tmp();
        s.schedule(spec("low", priority::LOW)).unwrap();
        let high = s.schedule(spec("high", priority::HIGH)).unwrap();

        let next = s.next_action().unwrap().unwrap();
        assert_eq!(next.id, high.id);
    }

    #[test]
    fn equal_priority_is_fifo_by_creation() {
        let (_dir, s) = open_tmp();
        let first = s.schedule(spec("first", priority::NORMAL)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        s.schedule(spec("second", priority::NORMAL)).unwrap();

        let next = s.next_action().unwrap().unwrap();
        assert_eq!(next.id, first.id);
    }

    #[test]
    fn unmet_dependency_goes_to_blocked() {
        let (_dir, s) = open_tmp();
        let dep = Uuid::new_v4();
        let action = s
            .schedule(ActionSpec {
                depends_on: vec![dep],
                ..spec("dependent", priority::HIGH)
            })
            .unwrap();

        assert_eq!(action.status, ActionStatus::Blocked);
        assert!(s.next_action().unwrap().is_none());
        let snap = s.snapshot();
        assert_eq!(snap.blocked.len(), 1);
        assert!(snap.queue.is_empty());
    }

    #[tokio::test]
    async fn dependency_chain_promotes_after_completion() {
        let (_dir, s) = open_tmp();
        let a = s.schedule(spec("a", priority::NORMAL)).unwrap();
        let b = s
            .schedule(ActionSpec {
                depends_on: vec![a.id],
                ..spec("b", priority::HIGH)
            })
            .unwrap();
        assert_eq!(b.status, ActionStatus::Blocked);

        // A dequeues first despite B's higher priority — B is blocked.
        let next = s.next_action().unwrap().unwrap();
        assert_eq!(next.id, a.id);

        let executor = StubExecutor::ok();
        s.execute(a.id, &executor).await.unwrap();

        let next = s.next_action().unwrap().unwrap();
        assert_eq!(next.id, b.id, "B promoted once A completed");
    }

    #[tokio::test]
    async fn failed_dependency_does_not_promote() {
        let (_dir, s) = open_tmp();
        let a = s
            .schedule(ActionSpec {
                max_attempts: Some(1),
                ..spec("a", priority::NORMAL)
            })
            .unwrap();
        s.schedule(ActionSpec {
            depends_on: vec![a.id],
            ..spec("b", priority::NORMAL)
        })
        .unwrap();

        let executor = StubExecutor::failing();
        s.execute(a.id, &executor).await.unwrap();

        assert!(s.next_action().unwrap().is_none());
        assert_eq!(s.snapshot().blocked.len(), 1);
    }

    #[test]
    fn due_scheduled_action_is_returned_immediately() {
        let (_dir, s) = open_tmp();
        s.schedule(spec("queued", priority::CRITICAL)).unwrap();
        let due = s
            .schedule(ActionSpec {
                scheduled_for: Some(Utc::now() - CDur::seconds(1)),
                ..spec("due", priority::LOW)
            })
            .unwrap();

        // The due scheduled action wins even over a critical queued one.
        let next = s.next_action().unwrap().unwrap();
        assert_eq!(next.id, due.id);
        assert_eq!(next.status, ActionStatus::Pending);
    }

    #[test]
    fn future_scheduled_action_stays_put() {
        let (_dir, s) = open_tmp();
        s.schedule(ActionSpec {
            scheduled_for: Some(Utc::now() + CDur::hours(1)),
            ..spec("later", priority::HIGH)
        })
        .unwrap();

        assert!(s.next_action().unwrap().is_none());
        assert_eq!(s.snapshot().scheduled.len(), 1);
    }

    #[test]
    fn due_with_unmet_deps_moves_to_blocked() {
        let (_dir, s) = open_tmp();
        s.schedule(ActionSpec {
            scheduled_for: Some(Utc::now() - CDur::seconds(1)),
            depends_on: vec![Uuid::new_v4()],
            ..spec("gated", priority::NORMAL)
        })
        .unwrap();

        assert!(s.next_action().unwrap().is_none());
        let snap = s.snapshot();
        assert!(snap.scheduled.is_empty());
        assert_eq!(snap.blocked.len(), 1);
        assert_eq!(snap.blocked[0].status, ActionStatus::Blocked);
    }

    #[tokio::test]
    async fn retry_escalates_priority_then_fails_permanently() {
        let (_dir, s) = open_tmp();
        let action = s
            .schedule(ActionSpec {
                max_attempts: Some(2),
                ..spec("flaky", priority::NORMAL)
            })
            .unwrap();
        let executor = StubExecutor::failing();

        s.execute(action.id, &executor).await.unwrap();
        let snap = s.snapshot();
        let requeued = &snap.queue[0];
        assert_eq!(requeued.status, ActionStatus::Pending);
        assert_eq!(requeued.priority, priority::NORMAL - 1);
        assert_eq!(requeued.attempts, 1);

        s.execute(action.id, &executor).await.unwrap();
        let snap = s.snapshot();
        assert!(snap.queue.is_empty());
        assert_eq!(snap.completed[0].status, ActionStatus::Failed);
        assert_eq!(snap.completed[0].attempts, 2);

        // Never re-queued after permanent failure.
        assert!(s.next_action().unwrap().is_none());
    }

    #[tokio::test]
    async fn priority_zero_does_not_underflow_on_retry() {
        let (_dir, s) = open_tmp();
        let action = s
            .schedule(ActionSpec {
                max_attempts: Some(3),
                ..spec("urgent", priority::CRITICAL)
            })
            .unwrap();
        let executor = StubExecutor::failing();
        s.execute(action.id, &executor).await.unwrap();
        assert_eq!(s.snapshot().queue[0].priority, priority::CRITICAL);
    }

    #[tokio::test]
    async fn daily_recurrence_schedules_fresh_clone() {
        let (_dir, s) = open_tmp();
        let action = s
            .schedule(ActionSpec {
                recurrence: Recurrence::Daily,
                ..spec("report", priority::NORMAL)
            })
            .unwrap();
        let executor = StubExecutor::ok();
        s.execute(action.id, &executor).await.unwrap();

        let snap = s.snapshot();
        assert_eq!(snap.scheduled.len(), 1);
        let clone = &snap.scheduled[0];
        assert_ne!(clone.id, action.id);
        assert_eq!(clone.attempts, 0);
        assert!(clone.result.is_none());

        let due = clone.scheduled_for.unwrap();
        let expected = Utc::now() + CDur::hours(24);
        assert!((due - expected).num_seconds().abs() < 5);
    }

    #[tokio::test]
    async fn cancel_moves_to_history_once_and_is_idempotent() {
        let (_dir, s) = open_tmp();
        let action = s.schedule(spec("doomed", priority::NORMAL)).unwrap();

        let cancelled = s.cancel(action.id).unwrap().unwrap();
        assert_eq!(cancelled.status, ActionStatus::Cancelled);
        let snap = s.snapshot();
        assert!(snap.queue.is_empty());
        assert_eq!(snap.completed.len(), 1);

        // Second cancel is a no-op.
        assert!(s.cancel(action.id).unwrap().is_none());
        assert_eq!(s.snapshot().completed.len(), 1);
    }

    #[test]
    fn cancel_finds_scheduled_and_blocked_actions() {
        let (_dir, s) = open_tmp();
        let scheduled = s
            .schedule(ActionSpec {
                scheduled_for: Some(Utc::now() + CDur::hours(1)),
                ..spec("later", priority::NORMAL)
            })
            .unwrap();
        let blocked = s
            .schedule(ActionSpec {
                depends_on: vec![Uuid::new_v4()],
                ..spec("gated", priority::NORMAL)
            })
            .unwrap();

        assert!(s.cancel(scheduled.id).unwrap().is_some());
        assert!(s.cancel(blocked.id).unwrap().is_some());
        let snap = s.snapshot();
        assert!(snap.scheduled.is_empty());
        assert!(snap.blocked.is_empty());
        assert_eq!(snap.completed.len(), 2);
    }

    #[tokio::test]
    async fn clear_goal_actions_spares_history() {
        let (_dir, s) = open_tmp();
        let done = s
            .schedule(ActionSpec {
                goal_id: Some("g1".into()),
                ..spec("done", priority::NORMAL)
            })
            .unwrap();
        let executor = StubExecutor::ok();
        s.execute(done.id, &executor).await.unwrap();

        s.schedule(ActionSpec {
            goal_id: Some("g1".into()),
            ..spec("pending", priority::NORMAL)
        })
        .unwrap();
        s.schedule(ActionSpec {
            goal_id: Some("g2".into()),
            ..spec("other", priority::NORMAL)
        })
        .unwrap();

        let removed = s.clear_goal_actions("g1").unwrap();
        assert_eq!(removed, 1);
        let snap = s.snapshot();
        assert_eq!(snap.queue.len(), 1);
        assert_eq!(snap.queue[0].goal_id.as_deref(), Some("g2"));
        assert_eq!(snap.completed.len(), 1, "history untouched");
    }

    #[tokio::test]
    async fn clear_project_actions_spares_history() {
        let (_dir, s) = open_tmp();
        let done = s
            .schedule(ActionSpec {
                project_id: Some("p1".into()),
                ..spec("done", priority::NORMAL)
            })
            .unwrap();
        let executor = StubExecutor::ok();
        s.execute(done.id, &executor).await.unwrap();

        s.schedule(ActionSpec {
            project_id: Some("p1".into()),
            scheduled_for: Some(Utc::now() + CDur::hours(1)),
            ..spec("pending", priority::NORMAL)
        })
        .unwrap();
        s.schedule(ActionSpec {
            project_id: Some("p2".into()),
            ..spec("other", priority::NORMAL)
        })
        .unwrap();

        let removed = s.clear_project_actions("p1").unwrap();
        assert_eq!(removed, 1);
        let snap = s.snapshot();
        assert!(snap.scheduled.is_empty());
        assert_eq!(snap.queue.len(), 1);
        assert_eq!(snap.queue[0].project_id.as_deref(), Some("p2"));
        assert_eq!(snap.completed.len(), 1, "history untouched");
    }

    #[tokio::test]
    async fn snapshot_survives_reload() {
        let dir = TempDir::new().unwrap();
        let events = EventBus::new();
        let s =
            ActionScheduler::open(dir.path(), SchedulerConfig::default(), events.clone()).unwrap();
        let a = s.schedule(spec("keep", priority::HIGH)).unwrap();
        s.schedule(ActionSpec {
            scheduled_for: Some(Utc::now() + CDur::hours(2)),
            ..spec("later", priority::NORMAL)
        })
        .unwrap();
        s.set_context(Some("g1".into()), Some("p1".into())).unwrap();
        drop(s);

        let reloaded =
            ActionScheduler::open(dir.path(), SchedulerConfig::default(), events).unwrap();
        let snap = reloaded.snapshot();
        assert_eq!(snap.queue.len(), 1);
        assert_eq!(snap.queue[0].id, a.id);
        assert_eq!(snap.scheduled.len(), 1);
        assert_eq!(snap.current_goal.as_deref(), Some("g1"));
        assert_eq!(snap.current_project.as_deref(), Some("p1"));
    }

    #[test]
    fn executing_action_recovers_to_pending_on_reload() {
        let dir = TempDir::new().unwrap();
        let events = EventBus::new();
        let s =
            ActionScheduler::open(dir.path(), SchedulerConfig::default(), events.clone()).unwrap();
        let a = s.schedule(spec("crashy", priority::NORMAL)).unwrap();

        // Simulate a crash mid-execution: persist the Executing state by hand.
        {
            let mut state = s.state.lock().unwrap();
            state.queue[0].status = ActionStatus::Executing;
            state.queue[0].attempts = 1;
            s.persist(&state).unwrap();
        }
        drop(s);

        let reloaded =
            ActionScheduler::open(dir.path(), SchedulerConfig::default(), events).unwrap();
        let snap = reloaded.snapshot();
        assert_eq!(snap.queue[0].id, a.id);
        assert_eq!(snap.queue[0].status, ActionStatus::Pending);
        assert_eq!(snap.queue[0].attempts, 1, "attempt already counted");
    }

    #[tokio::test]
    async fn history_is_capped() {
        let dir = TempDir::new().unwrap();
        let config = SchedulerConfig {
            history_cap: 3,
            ..Default::default()
        };
        let s = ActionScheduler::open(dir.path(), config, EventBus::new()).unwrap();
        let executor = StubExecutor::ok();
        for i in 0..5 {
            let a = s.schedule(spec(&format!("a{i}"), priority::NORMAL)).unwrap();
            s.execute(a.id, &executor).await.unwrap();
        }
        let snap = s.snapshot();
        assert_eq!(snap.completed.len(), 3);
        // Newest first.
        assert_eq!(snap.completed[0].tool, "a4");
    }

    #[tokio::test]
    async fn execute_emits_lifecycle_events() {
        let dir = TempDir::new().unwrap();
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let s = ActionScheduler::open(dir.path(), SchedulerConfig::default(), events).unwrap();
        let a = s.schedule(spec("observed", priority::NORMAL)).unwrap();
        s.execute(a.id, &StubExecutor::ok()).await.unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::ActionStarted { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::ActionCompleted { .. }
        ));
    }
}
