//! File-backed goal storage: the bundled [`GoalManager`] implementation.
//!
//! One YAML book holds goals, tasks, completion criteria, and per-goal
//! activity history. Every mutation persists the whole book with the same
//! atomic write-replace the scheduler uses. Held goals whose review time
//! has passed reactivate automatically during selection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use vigil_core::goal::{CriteriaReport, Goal, GoalManager, GoalState, GoalTask, TaskState};
use vigil_core::hold::HoldReason;
use vigil_core::{io, paths, Result};

const BOOK_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criterion {
    pub description: String,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GoalBook {
    version: u32,
    goals: Vec<Goal>,
    tasks: Vec<GoalTask>,
    #[serde(default)]
    current: Option<String>,
    #[serde(default)]
    criteria: HashMap<String, Vec<Criterion>>,
    #[serde(default)]
    activity: HashMap<String, Vec<String>>,
    /// External 0.0–1.0 signal; updated by whatever feeds the agent data.
    #[serde(default)]
    completeness: f32,
}

impl Default for GoalBook {
    fn default() -> Self {
        Self {
            version: BOOK_VERSION,
            goals: Vec::new(),
            tasks: Vec::new(),
            current: None,
            criteria: HashMap::new(),
            activity: HashMap::new(),
            completeness: 0.0,
        }
    }
}

pub struct YamlGoalStore {
    path: PathBuf,
    book: Mutex<GoalBook>,
}

impl YamlGoalStore {
    pub fn open(root: &Path) -> Result<Self> {
        let path = paths::vigil_dir(root).join("goals.yaml");
        let book = io::load_yaml(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            book: Mutex::new(book),
        })
    }

    fn persist(&self, book: &GoalBook) {
        if let Err(e) = io::save_yaml(&self.path, book) {
            warn!(error = %e, "failed to persist goal book");
        }
    }

    /// Reactivate held goals whose review time has passed.
    fn review_holds(&self, book: &mut GoalBook) {
        let now = Utc::now();
        let mut changed = false;
        for goal in book.goals.iter_mut() {
            if goal.state == GoalState::OnHold {
                if let Some(review_at) = goal.review_at {
                    if review_at <= now {
                        info!(goal = %goal.id, "hold review due, reactivating");
                        goal.state = GoalState::Active;
                        goal.hold_reason = None;
                        goal.review_at = None;
                        changed = true;
                    }
                }
            }
        }
        if changed {
            self.persist(book);
        }
    }

    // -- extras beyond the GoalManager contract, for the CLI ---------------

    pub fn create_goal(&self, title: &str, category: &str) -> Goal {
        let goal = Goal::new(Uuid::new_v4().to_string(), title, category);
        self.add_goal(goal.clone());
        goal
    }

    pub fn all_goals(&self) -> Vec<Goal> {
        self.book.lock().unwrap().goals.clone()
    }

    pub fn add_task(&self, goal_id: &str, title: &str) -> GoalTask {
        let task = GoalTask {
            id: Uuid::new_v4().to_string(),
            goal_id: goal_id.to_owned(),
            title: title.to_owned(),
            state: TaskState::Open,
            hold_reason: None,
        };
        let mut book = self.book.lock().unwrap();
        book.tasks.push(task.clone());
        self.persist(&book);
        task
    }

    pub fn add_criterion(&self, goal_id: &str, description: &str) {
        let mut book = self.book.lock().unwrap();
        book.criteria.entry(goal_id.to_owned()).or_default().push(Criterion {
            description: description.to_owned(),
            done: false,
        });
        self.persist(&book);
    }

    pub fn mark_criterion_done(&self, goal_id: &str, index: usize) -> bool {
        let mut book = self.book.lock().unwrap();
        let marked = book
            .criteria
            .get_mut(goal_id)
            .and_then(|c| c.get_mut(index))
            .map(|c| {
                c.done = true;
            })
            .is_some();
        if marked {
            self.persist(&book);
        }
        marked
    }

    pub fn set_completeness(&self, value: f32) {
        let mut book = self.book.lock().unwrap();
        book.completeness = value.clamp(0.0, 1.0);
        self.persist(&book);
    }
}

impl GoalManager for YamlGoalStore {
    fn current_goal(&self) -> Option<Goal> {
        let book = self.book.lock().unwrap();
        let id = book.current.as_ref()?;
        book.goals
            .iter()
            .find(|g| &g.id == id && g.state == GoalState::Active)
            .cloned()
    }

    fn select_next_goal(&self) -> Option<Goal> {
        let mut book = self.book.lock().unwrap();
        self.review_holds(&mut book);
        let goal = book
            .goals
            .iter()
            .find(|g| g.state == GoalState::Active)
            .cloned()?;
        book.current = Some(goal.id.clone());
        self.persist(&book);
        Some(goal)
    }

    fn add_goal(&self, goal: Goal) {
        let mut book = self.book.lock().unwrap();
        book.goals.push(goal);
        self.persist(&book);
    }

    fn set_current_goal(&self, goal_id: Option<&str>) {
        let mut book = self.book.lock().unwrap();
        book.current = goal_id.map(str::to_owned);
        self.persist(&book);
    }

    fn goal_status(&self, goal_id: &str) -> Option<GoalState> {
        self.book
            .lock()
            .unwrap()
            .goals
            .iter()
            .find(|g| g.id == goal_id)
            .map(|g| g.state)
    }

    fn active_goals(&self) -> Vec<Goal> {
        self.book
            .lock()
            .unwrap()
            .goals
            .iter()
            .filter(|g| g.state == GoalState::Active)
            .cloned()
            .collect()
    }

    fn held_goals(&self) -> Vec<Goal> {
        self.book
            .lock()
            .unwrap()
            .goals
            .iter()
            .filter(|g| g.state == GoalState::OnHold)
            .cloned()
            .collect()
    }

    fn tasks(&self, goal_id: &str) -> Vec<GoalTask> {
        self.book
            .lock()
            .unwrap()
            .tasks
            .iter()
            .filter(|t| t.goal_id == goal_id)
            .cloned()
            .collect()
    }

    fn next_task(&self, goal_id: &str) -> Option<GoalTask> {
        self.book
            .lock()
            .unwrap()
            .tasks
            .iter()
            .find(|t| t.goal_id == goal_id && t.state == TaskState::Open)
            .cloned()
    }

    fn complete_task(&self, task_id: &str, _result: &str) {
        let mut book = self.book.lock().unwrap();
        if let Some(task) = book.tasks.iter_mut().find(|t| t.id == task_id) {
            task.state = TaskState::Done;
        }
        self.persist(&book);
    }

    fn hold_task(&self, task_id: &str, reason: HoldReason) {
        let mut book = self.book.lock().unwrap();
        if let Some(task) = book.tasks.iter_mut().find(|t| t.id == task_id) {
            task.state = TaskState::OnHold;
            task.hold_reason = Some(reason);
        }
        self.persist(&book);
    }

    fn put_goal_on_hold(&self, goal_id: &str, reason: HoldReason, notes: &str) {
        let mut book = self.book.lock().unwrap();
        if let Some(goal) = book.goals.iter_mut().find(|g| g.id == goal_id) {
            goal.state = GoalState::OnHold;
            goal.review_at = Some(reason.review_at);
            goal.hold_reason = Some(reason);
            info!(goal = %goal_id, notes, "goal placed on hold");
        }
        self.persist(&book);
    }

    fn release_goal(&self, goal_id: &str) {
        let mut book = self.book.lock().unwrap();
        if let Some(goal) = book.goals.iter_mut().find(|g| g.id == goal_id) {
            goal.state = GoalState::Active;
            goal.hold_reason = None;
            goal.review_at = None;
        }
        self.persist(&book);
    }

    fn complete_goal(&self, goal_id: &str) {
        let mut book = self.book.lock().unwrap();
        if let Some(goal) = book.goals.iter_mut().find(|g| g.id == goal_id) {
            goal.state = GoalState::Completed;
        }
        if book.current.as_deref() == Some(goal_id) {
            book.current = None;
        }
        self.persist(&book);
    }

    fn evaluate_criteria(&self, goal_id: &str) -> CriteriaReport {
        let book = self.book.lock().unwrap();
        let criteria = book.criteria.get(goal_id).map(Vec::as_slice).unwrap_or(&[]);
        let completed_count = criteria.iter().filter(|c| c.done).count();
        CriteriaReport {
            complete: !criteria.is_empty() && completed_count == criteria.len(),
            completed_count,
            total_count: criteria.len(),
        }
    }

    fn record_activity(&self, goal_id: &str, description: &str) {
        let mut book = self.book.lock().unwrap();
        book.activity
            .entry(goal_id.to_owned())
            .or_default()
            .push(description.to_owned());
        self.persist(&book);
    }

    fn activity_len(&self, goal_id: &str) -> usize {
        self.book
            .lock()
            .unwrap()
            .activity
            .get(goal_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn data_completeness(&self) -> f32 {
        self.book.lock().unwrap().completeness
    }
}
