use anyhow::Context;
use chrono::Utc;
use std::path::Path;
use vigil_core::config::VigilConfig;
use vigil_core::events::EventBus;
use vigil_core::scheduler::ActionScheduler;
use vigil_core::{io, paths};
use vigil_engine::coordinator::LeaseRecord;
use vigil_engine::goal_store::YamlGoalStore;
use vigil_engine::session::SessionStore;
use vigil_core::goal::GoalManager;

use crate::output::print_json;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = VigilConfig::load(root)?;
    let scheduler = ActionScheduler::open(root, config.scheduler.clone(), EventBus::new())
        .context("failed to open scheduler state")?;
    let snap = scheduler.snapshot();

    let lease: Option<LeaseRecord> = io::load_yaml(&paths::lease_path(root))?;
    let stale = lease.as_ref().map(|l| {
        (Utc::now() - l.last_heartbeat).num_seconds() >= config.lease.stale_secs as i64
    });

    let goals = YamlGoalStore::open(root)?;
    let current = goals.current_goal();
    let session = SessionStore::new(root).load()?;

    #[derive(serde::Serialize)]
    struct StatusOutput<'a> {
        lease: &'a Option<LeaseRecord>,
        lease_stale: Option<bool>,
        current_goal: Option<&'a str>,
        active_goals: usize,
        held_goals: usize,
        queue: usize,
        scheduled: usize,
        blocked: usize,
        history: usize,
        cycle_count: u64,
        session_id: Option<&'a str>,
    }

    let active = goals.active_goals().len();
    let held = goals.held_goals().len();
    let output = StatusOutput {
        lease: &lease,
        lease_stale: stale,
        current_goal: current.as_ref().map(|g| g.id.as_str()),
        active_goals: active,
        held_goals: held,
        queue: snap.queue.len(),
        scheduled: snap.scheduled.len(),
        blocked: snap.blocked.len(),
        history: snap.completed.len(),
        cycle_count: session.cycle_count,
        session_id: session.session_id.as_deref(),
    };

    if json {
        return print_json(&output);
    }

    match &lease {
        Some(l) => {
            let freshness = if stale == Some(true) { "stale" } else { "live" };
            println!(
                "worker: {} on {} (fence {}, heartbeat {} — {})",
                l.worker_id, l.hostname, l.fence, l.last_heartbeat, freshness
            );
        }
        None => println!("worker: none (lease unclaimed)"),
    }
    match &current {
        Some(goal) => println!("current goal: {} ({})", goal.title, goal.id),
        None => println!("current goal: none"),
    }
    println!("goals: {active} active, {held} held");
    println!(
        "actions: {} queued, {} scheduled, {} blocked, {} in history",
        output.queue, output.scheduled, output.blocked, output.history
    );
    println!("cycles run: {}", output.cycle_count);

    Ok(())
}
