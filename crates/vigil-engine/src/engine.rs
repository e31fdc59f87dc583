//! The engine loop: one long-lived cycle driving goals to completion.
//!
//! Each cycle the engine drains at most one due scheduler action, then
//! works its current goal through the orchestrator (or, without one, the
//! fallback tool sequence), classifies failures into holds instead of
//! abandoning goals, and rests for a window scaled by data completeness.
//! A cycle-level error never terminates the loop; it logs, emits an event
//! and backs off.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use vigil_core::config::EngineConfig;
use vigil_core::events::{EngineEvent, EventBus};
use vigil_core::goal::{Goal, GoalManager, TaskState};
use vigil_core::hold::{classify_failure, is_billing_error, HoldKind, HoldReason};
use vigil_core::action::{ActionSpec, ScheduledAction};
use vigil_core::scheduler::{ActionExecutor, ActionScheduler, ExecutionOutcome};
use vigil_core::Result;

use crate::approval::{requires_approval, ApprovalGate, ApprovalStatus};
use crate::coordinator::WorkerCoordinator;
use crate::handoff::{extract_next_task, HandoffStore};
use crate::notify::{NoticeLevel, Notifier};
use crate::orchestrator::{GoalContext, GoalSource, Orchestrator};
use crate::rest::{rest_duration, RestWindow};
use crate::session::{EngineSession, SessionStore};

// ---------------------------------------------------------------------------
// EngineState
// ---------------------------------------------------------------------------

/// Coarse activity label, driven by the current goal's category. Purely
/// observational; no behavior branches on it beyond logging and status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Thinking,
    Researching,
    Planning,
    Building,
    Working,
    Executing,
    Reflecting,
    Resting,
    Closing,
}

impl EngineState {
    pub fn for_category(category: &str) -> Self {
        match category {
            "research" => EngineState::Researching,
            "planning" => EngineState::Planning,
            "build" | "development" => EngineState::Building,
            _ => EngineState::Working,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Thinking => "thinking",
            EngineState::Researching => "researching",
            EngineState::Planning => "planning",
            EngineState::Building => "building",
            EngineState::Working => "working",
            EngineState::Executing => "executing",
            EngineState::Reflecting => "reflecting",
            EngineState::Resting => "resting",
            EngineState::Closing => "closing",
        }
    }
}

// ---------------------------------------------------------------------------
// CyclePause
// ---------------------------------------------------------------------------

/// What the loop should do between cycles. Returned instead of sleeping so
/// cycles stay testable without waiting out real durations.
#[derive(Debug, Clone, PartialEq)]
pub enum CyclePause {
    /// More work is immediately available.
    None,
    /// Short poll (viewer mode, pending approval, retry).
    Brief,
    /// Interruptible rest.
    Rest { duration: Duration, reason: String },
    /// Fixed backoff after a cycle error.
    Backoff,
}

// ---------------------------------------------------------------------------
// EngineLoop
// ---------------------------------------------------------------------------

/// Collaborators the engine is wired to. The AI layer (orchestrator, goal
/// source) is optional; everything else is required.
pub struct EngineDeps {
    pub scheduler: Arc<ActionScheduler>,
    pub executor: Arc<dyn ActionExecutor>,
    pub goals: Arc<dyn GoalManager>,
    pub orchestrator: Option<Arc<dyn Orchestrator>>,
    pub goal_source: Option<Arc<dyn GoalSource>>,
    pub coordinator: Arc<WorkerCoordinator>,
    pub notifier: Arc<dyn Notifier>,
    pub events: EventBus,
}

pub struct EngineLoop {
    config: EngineConfig,
    deps: EngineDeps,
    approvals: ApprovalGate,
    handoff: HandoffStore,
    sessions: SessionStore,
    rest_window: RestWindow,
    state: Mutex<EngineState>,
    session: Mutex<EngineSession>,
    billing_pause_until: Mutex<Option<DateTime<Utc>>>,
    consecutive_failures: AtomicU32,
    last_generation: Mutex<Option<DateTime<Utc>>>,
}

impl EngineLoop {
    pub fn new(root: &Path, config: EngineConfig, deps: EngineDeps) -> Result<Self> {
        let sessions = SessionStore::new(root);
        let session = sessions.load()?;
        Ok(Self {
            config,
            deps,
            approvals: ApprovalGate::new(root),
            handoff: HandoffStore::new(root),
            sessions,
            rest_window: RestWindow::new(),
            state: Mutex::new(EngineState::Idle),
            session: Mutex::new(session),
            billing_pause_until: Mutex::new(None),
            consecutive_failures: AtomicU32::new(0),
            last_generation: Mutex::new(None),
        })
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock().unwrap()
    }

    /// Handle for urgent input to cut a rest short.
    pub fn rest_waker(&self) -> Arc<Notify> {
        self.rest_window.waker()
    }

    pub fn approvals(&self) -> &ApprovalGate {
        &self.approvals
    }

    fn set_state(&self, state: EngineState) {
        let mut current = self.state.lock().unwrap();
        if *current != state {
            debug!(from = current.as_str(), to = state.as_str(), "engine state");
            *current = state;
        }
    }

    /// Run forever. A failed cycle is logged and backed off, never fatal.
    pub async fn run(self: Arc<Self>) {
        info!("engine loop starting");
        loop {
            let pause = match self.run_cycle().await {
                Ok(pause) => pause,
                Err(e) => {
                    error!(error = %e, "cycle failed");
                    self.deps.events.emit(EngineEvent::CycleError {
                        error: e.to_string(),
                    });
                    CyclePause::Backoff
                }
            };
            self.pause(pause).await;
        }
    }

    async fn pause(&self, pause: CyclePause) {
        match pause {
            CyclePause::None => tokio::time::sleep(Duration::from_millis(250)).await,
            CyclePause::Brief => {
                tokio::time::sleep(Duration::from_secs(self.config.viewer_poll_secs)).await
            }
            CyclePause::Rest { duration, reason } => {
                self.set_state(EngineState::Resting);
                self.deps.events.emit(EngineEvent::RestStarted {
                    until: Utc::now()
                        + chrono::Duration::from_std(duration).unwrap_or_default(),
                    reason,
                });
                let woken = self.rest_window.rest(duration).await;
                self.deps.events.emit(EngineEvent::RestEnded { woken });
            }
            CyclePause::Backoff => {
                tokio::time::sleep(Duration::from_secs(self.config.cycle_error_backoff_secs)).await
            }
        }
    }

    /// One engine cycle. Public so callers (and tests) can drive the machine
    /// without the outer sleep loop.
    pub async fn run_cycle(&self) -> Result<CyclePause> {
        // Viewers observe; only the lease holder executes side effects.
        if !self.deps.coordinator.should_execute() {
            self.set_state(EngineState::Idle);
            return Ok(CyclePause::Brief);
        }

        // Due scheduler work runs before goal work, one action per cycle.
        if let Some(action) = self.deps.scheduler.next_action()? {
            self.set_state(EngineState::Executing);
            self.deps
                .scheduler
                .execute(action.id, self.deps.executor.as_ref())
                .await?;
            return Ok(CyclePause::None);
        }

        // The billing pause gates only the goal/orchestrator side; plain
        // tool actions above keep running through it.
        if let Some(remaining) = self.billing_pause_remaining() {
            debug!(secs = remaining.as_secs(), "billing pause in effect");
            return Ok(CyclePause::Rest {
                duration: remaining,
                reason: "billing pause".into(),
            });
        }

        let Some(goal) = self.pick_goal().await? else {
            self.set_state(EngineState::Idle);
            return Ok(CyclePause::Rest {
                duration: rest_duration(self.deps.goals.data_completeness()),
                reason: "idle".into(),
            });
        };

        if let Some(pause) = self.check_approval(&goal)? {
            return Ok(pause);
        }

        // Done already? Close out before spending another orchestrator call.
        let report = self.deps.goals.evaluate_criteria(&goal.id);
        if report.complete {
            info!(goal = %goal.id, "completion criteria met");
            self.deps.goals.complete_goal(&goal.id);
            self.deps.scheduler.clear_goal_actions(&goal.id)?;
            self.deps.goals.set_current_goal(None);
            self.deps.events.emit(EngineEvent::GoalCompleted {
                id: goal.id.clone(),
            });
            self.deps.notifier.notify(
                NoticeLevel::Info,
                "Goal completed",
                &format!("{} ({}/{} criteria)", goal.title, report.completed_count, report.total_count),
            );
            self.set_state(EngineState::Reflecting);
            return Ok(CyclePause::None);
        }

        // A goal whose every task is blocked or held cannot make progress.
        let tasks = self.deps.goals.tasks(&goal.id);
        if !tasks.is_empty()
            && tasks
                .iter()
                .all(|t| matches!(t.state, TaskState::Blocked | TaskState::OnHold))
        {
            let reason = HoldReason::new(
                HoldKind::ExternalWait,
                "all tasks blocked or held",
                Utc::now(),
            );
            self.hold_goal(&goal, reason, "every task is blocked");
            return Ok(CyclePause::None);
        }

        self.set_state(EngineState::for_category(&goal.category));

        if let Some(orchestrator) = self.deps.orchestrator.clone() {
            self.dispatch_orchestrator(&goal, orchestrator.as_ref()).await
        } else {
            self.dispatch_fallback(&goal).await
        }
    }

    // -- goal selection -----------------------------------------------------

    async fn pick_goal(&self) -> Result<Option<Goal>> {
        if let Some(goal) = self.deps.goals.current_goal() {
            return Ok(Some(goal));
        }
        if let Some(goal) = self.select_goal()? {
            return Ok(Some(goal));
        }

        // Nothing active. Ask the AI brain for new goals, at most once per
        // cooldown window.
        if let Some(source) = self.deps.goal_source.clone() {
            if self.generation_cooldown_elapsed() {
                self.set_state(EngineState::Thinking);
                *self.last_generation.lock().unwrap() = Some(Utc::now());
                match source.generate_goals("no active goals").await {
                    Ok(goals) if !goals.is_empty() => {
                        info!(count = goals.len(), "generated new goals");
                        for goal in goals {
                            self.deps.goals.add_goal(goal);
                        }
                        return self.select_goal();
                    }
                    Ok(_) => debug!("goal source produced nothing"),
                    Err(e) => warn!(error = %e, "goal generation failed"),
                }
            }
        }

        // Deadlock breaker: when everything is held, release the oldest hold
        // and try again rather than idling forever.
        let mut held = self.deps.goals.held_goals();
        if !held.is_empty() {
            held.sort_by_key(|g| g.created_at);
            let oldest = &held[0];
            info!(goal = %oldest.id, "all goals held, releasing the oldest");
            self.deps.goals.release_goal(&oldest.id);
            return self.select_goal();
        }

        self.deps.notifier.notify(
            NoticeLevel::Info,
            "Nothing to do",
            "no active goals and no generator output",
        );
        Ok(None)
    }

    /// Make the next active goal current: emit the selection event and sync
    /// the scheduler's persisted context. Every selection path funnels here.
    fn select_goal(&self) -> Result<Option<Goal>> {
        let Some(goal) = self.deps.goals.select_next_goal() else {
            return Ok(None);
        };
        self.deps.events.emit(EngineEvent::GoalSelected {
            id: goal.id.clone(),
            title: goal.title.clone(),
        });
        self.deps
            .scheduler
            .set_context(Some(goal.id.clone()), goal.project_id.clone())?;
        Ok(Some(goal))
    }

    fn generation_cooldown_elapsed(&self) -> bool {
        let last = self.last_generation.lock().unwrap();
        match *last {
            None => true,
            Some(at) => {
                Utc::now() - at
                    >= chrono::Duration::seconds(self.config.generation_cooldown_secs as i64)
            }
        }
    }

    // -- approval gate ------------------------------------------------------

    fn check_approval(&self, goal: &Goal) -> Result<Option<CyclePause>> {
        if !requires_approval(&goal.title) {
            return Ok(None);
        }
        match self.approvals.status(&goal.id)? {
            None => {
                self.approvals.request(&goal.id, &goal.title)?;
                self.deps.events.emit(EngineEvent::ApprovalRequested {
                    goal_id: goal.id.clone(),
                    title: goal.title.clone(),
                });
                self.deps.notifier.notify(
                    NoticeLevel::Warning,
                    "Approval needed",
                    &format!("'{}' is waiting for sign-off", goal.title),
                );
                Ok(Some(CyclePause::Brief))
            }
            Some(req) if req.status == ApprovalStatus::Pending => Ok(Some(CyclePause::Brief)),
            Some(req) if req.status == ApprovalStatus::Rejected => {
                let reason =
                    HoldReason::new(HoldKind::ApprovalWait, "approval rejected", Utc::now());
                self.hold_goal(goal, reason, "approval was rejected");
                self.approvals.clear(&goal.id)?;
                Ok(Some(CyclePause::None))
            }
            Some(_) => Ok(None), // approved
        }
    }

    // -- orchestrator path --------------------------------------------------

    async fn dispatch_orchestrator(
        &self,
        goal: &Goal,
        orchestrator: &dyn Orchestrator,
    ) -> Result<CyclePause> {
        let handoff = self.handoff.load()?;
        let ctx = {
            let session = self.session.lock().unwrap();
            GoalContext {
                work_dir: None,
                user_context: handoff
                    .as_ref()
                    .map(|h| format!("Continue with: {}", h.task))
                    .unwrap_or_default(),
                agent_identity: "vigil".into(),
                resume_session: handoff
                    .as_ref()
                    .and_then(|h| h.session_id.clone())
                    .or_else(|| session.session_id.clone()),
            }
        };

        let timeout = Duration::from_secs(self.config.orchestrator_timeout_secs);
        let outcome = tokio::time::timeout(timeout, orchestrator.execute_goal(goal, &ctx)).await;

        let result = match outcome {
            Err(_) => {
                warn!(goal = %goal.id, secs = timeout.as_secs(), "orchestrator timed out");
                return self.handle_failure(goal, &format!("orchestrator timed out after {}s", timeout.as_secs()));
            }
            Ok(Err(e)) => {
                return self.handle_failure(goal, &e.to_string());
            }
            Ok(Ok(result)) => result,
        };

        if !result.success {
            let error = result.error.as_deref().unwrap_or("unknown error");
            return self.handle_failure(goal, error);
        }

        self.consecutive_failures.store(0, Ordering::SeqCst);
        for call in &result.tool_calls {
            self.deps.goals.record_activity(&goal.id, call);
        }

        // Persist the session, then the handoff for the next cycle.
        {
            let mut session = self.session.lock().unwrap();
            if result.session_id.is_some() {
                session.session_id = result.session_id.clone();
            }
            session.goal_id = Some(goal.id.clone());
            session.cycle_count += 1;
            session.saved_at = Utc::now();
            self.sessions.save(&session)?;
        }

        self.handoff.clear()?;
        if let Some(task) = extract_next_task(&result.output) {
            let ttl = chrono::Duration::seconds(self.config.handoff_ttl_secs as i64);
            self.handoff.save(&task, result.session_id.as_deref(), ttl)?;
            debug!(task = %task, "saved handoff for next cycle");
        }

        Ok(CyclePause::Rest {
            duration: rest_duration(self.deps.goals.data_completeness()),
            reason: "cycle complete".into(),
        })
    }

    fn handle_failure(&self, goal: &Goal, error: &str) -> Result<CyclePause> {
        if is_billing_error(error) {
            // Credit exhaustion is a pause with automatic resumption. The
            // goal is never failed for it.
            let until = Utc::now()
                + chrono::Duration::seconds(self.config.billing_pause_secs as i64);
            *self.billing_pause_until.lock().unwrap() = Some(until);
            warn!(until = %until, "billing error, pausing orchestrator work");
            self.deps.events.emit(EngineEvent::BillingPause { until });
            self.deps.notifier.notify(
                NoticeLevel::Urgent,
                "Billing pause",
                &format!("orchestrator reported a billing problem: {error}"),
            );
            return Ok(CyclePause::Rest {
                duration: Duration::from_secs(self.config.billing_pause_secs),
                reason: "billing pause".into(),
            });
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(goal = %goal.id, failures, error, "orchestrator cycle failed");

        if failures >= self.config.failure_switch_threshold {
            // Stuck. Park this goal with a typed hold and move on.
            let reason = classify_failure(error, Utc::now());
            self.hold_goal(goal, reason, error);
            self.consecutive_failures.store(0, Ordering::SeqCst);
            return Ok(CyclePause::None);
        }

        Ok(CyclePause::Brief)
    }

    fn hold_goal(&self, goal: &Goal, reason: HoldReason, notes: &str) {
        info!(goal = %goal.id, kind = %reason.kind, "putting goal on hold");
        self.deps.events.emit(EngineEvent::GoalHeld {
            id: goal.id.clone(),
            reason: reason.kind.as_str().to_owned(),
        });
        self.deps.goals.put_goal_on_hold(&goal.id, reason, notes);
        self.deps.goals.set_current_goal(None);
    }

    // -- fallback path ------------------------------------------------------

    /// Without an orchestrator the engine still makes progress: each cycle
    /// runs the next entry of the category's fixed tool sequence, indexed by
    /// how much activity the goal has accumulated.
    async fn dispatch_fallback(&self, goal: &Goal) -> Result<CyclePause> {
        let sequence = fallback_sequence(&goal.category);
        let index = self.deps.goals.activity_len(&goal.id) % sequence.len();
        let (action_type, tool) = sequence[index];

        // Ephemeral one-shot action; never enters the scheduler's lists.
        let action = ScheduledAction::from_spec(
            ActionSpec {
                action_type: action_type.to_owned(),
                tool: tool.to_owned(),
                target: goal.title.clone(),
                goal_id: Some(goal.id.clone()),
                ..Default::default()
            },
            1,
        );
        debug!(goal = %goal.id, tool, "running fallback action");

        let outcome = match self.deps.executor.execute(&action).await {
            Ok(outcome) => outcome,
            Err(e) => ExecutionOutcome::failed(e.to_string()),
        };

        if outcome.success {
            self.deps
                .goals
                .record_activity(&goal.id, &format!("{action_type} via {tool}"));
        } else {
            let error = outcome.error.as_deref().unwrap_or("unknown error");
            let reason = classify_failure(error, Utc::now());
            // Pause the narrowest thing that can absorb the failure.
            if let Some(task) = self.deps.goals.next_task(&goal.id) {
                info!(task = %task.id, kind = %reason.kind, "holding task after fallback failure");
                self.deps.goals.hold_task(&task.id, reason);
            } else {
                self.hold_goal(goal, reason, error);
                return Ok(CyclePause::None);
            }
        }

        Ok(CyclePause::Rest {
            duration: rest_duration(self.deps.goals.data_completeness()),
            reason: "cycle complete".into(),
        })
    }

    // -- helpers ------------------------------------------------------------

    fn billing_pause_remaining(&self) -> Option<Duration> {
        let mut until = self.billing_pause_until.lock().unwrap();
        match *until {
            Some(at) if at > Utc::now() => Some(
                (at - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::from_secs(1)),
            ),
            Some(_) => {
                info!("billing pause elapsed, resuming");
                *until = None;
                None
            }
            None => None,
        }
    }
}

/// Per-category tool sequences for orchestrator-less operation.
fn fallback_sequence(category: &str) -> &'static [(&'static str, &'static str)] {
    match category {
        "research" => &[
            ("search", "web_search"),
            ("summarize", "notes"),
            ("monitor", "web_search"),
        ],
        "finance" => &[("sync", "accounts"), ("analyze", "notes")],
        "health" => &[("sync", "health_data"), ("summarize", "notes")],
        _ => &[("check", "inbox"), ("summarize", "notes")],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
