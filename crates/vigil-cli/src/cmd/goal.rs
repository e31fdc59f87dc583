use anyhow::{bail, Context};
use clap::Subcommand;
use std::path::Path;
use vigil_core::goal::{GoalManager, GoalState};
use vigil_engine::goal_store::YamlGoalStore;

use crate::output::{print_json, print_table};

#[derive(Subcommand)]
pub enum GoalSubcommand {
    /// List all goals
    List,

    /// Add a goal
    Add {
        title: String,
        /// Category drives the engine's activity label and fallback tools
        #[arg(long, default_value = "general")]
        category: String,
    },

    /// Add a task under a goal
    Task { goal_id: String, title: String },

    /// Add a completion criterion to a goal
    Criterion { goal_id: String, description: String },

    /// Mark a completion criterion done (by zero-based index)
    Done { goal_id: String, index: usize },

    /// Release a held goal back to active
    Release { goal_id: String },

    /// Mark a goal completed
    Complete { goal_id: String },

    /// Record the external data-completeness signal (0.0–1.0)
    Completeness { value: f32 },
}

pub fn run(root: &Path, subcommand: GoalSubcommand, json: bool) -> anyhow::Result<()> {
    let store = YamlGoalStore::open(root).context("failed to open goal store")?;

    match subcommand {
        GoalSubcommand::List => {
            let goals = store.all_goals();
            if json {
                return print_json(&goals);
            }
            let rows = goals
                .iter()
                .map(|g| {
                    let state = match g.state {
                        GoalState::Active => "active",
                        GoalState::OnHold => "on_hold",
                        GoalState::Completed => "completed",
                    };
                    let hold = g
                        .hold_reason
                        .as_ref()
                        .map(|r| r.kind.as_str().to_owned())
                        .unwrap_or_default();
                    vec![
                        g.id.clone(),
                        state.to_owned(),
                        g.category.clone(),
                        g.title.clone(),
                        hold,
                    ]
                })
                .collect();
            print_table(&["id", "state", "category", "title", "hold"], rows);
        }

        GoalSubcommand::Add { title, category } => {
            let goal = store.create_goal(&title, &category);
            if json {
                print_json(&goal)?;
            } else {
                println!("added goal {}", goal.id);
            }
        }

        GoalSubcommand::Task { goal_id, title } => {
            if store.goal_status(&goal_id).is_none() {
                bail!("no goal with id '{goal_id}'");
            }
            let task = store.add_task(&goal_id, &title);
            println!("added task {}", task.id);
        }

        GoalSubcommand::Criterion {
            goal_id,
            description,
        } => {
            if store.goal_status(&goal_id).is_none() {
                bail!("no goal with id '{goal_id}'");
            }
            store.add_criterion(&goal_id, &description);
            println!("added criterion to {goal_id}");
        }

        GoalSubcommand::Done { goal_id, index } => {
            if !store.mark_criterion_done(&goal_id, index) {
                bail!("no criterion {index} on goal '{goal_id}'");
            }
            let report = store.evaluate_criteria(&goal_id);
            println!(
                "{}/{} criteria met{}",
                report.completed_count,
                report.total_count,
                if report.complete { " — goal is complete" } else { "" }
            );
        }

        GoalSubcommand::Release { goal_id } => {
            if store.goal_status(&goal_id).is_none() {
                bail!("no goal with id '{goal_id}'");
            }
            store.release_goal(&goal_id);
            println!("released {goal_id}");
        }

        GoalSubcommand::Complete { goal_id } => {
            if store.goal_status(&goal_id).is_none() {
                bail!("no goal with id '{goal_id}'");
            }
            store.complete_goal(&goal_id);
            println!("completed {goal_id}");
        }

        GoalSubcommand::Completeness { value } => {
            store.set_completeness(value);
            println!("data completeness set to {:.2}", value.clamp(0.0, 1.0));
        }
    }

    Ok(())
}
