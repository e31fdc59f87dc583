use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use std::path::Path;
use uuid::Uuid;
use vigil_core::action::{ActionSpec, Recurrence};
use vigil_core::config::VigilConfig;
use vigil_core::events::EventBus;
use vigil_core::scheduler::ActionScheduler;

use crate::output::{print_json, print_table};

#[derive(Subcommand)]
pub enum ActionSubcommand {
    /// List queued, scheduled, and blocked actions
    List {
        /// Include terminal history entries
        #[arg(long)]
        history: bool,
    },

    /// Schedule a new action
    Add {
        /// Kind of work (e.g. "sync", "publish", "review")
        action_type: String,
        /// Tool slug from the config's tool table
        tool: String,
        /// What the tool operates on
        #[arg(default_value = "")]
        target: String,
        /// JSON parameters passed to the tool
        #[arg(long, default_value = "{}")]
        params: String,
        /// 0 = critical, 1 = high, 2 = normal, 3 = low
        #[arg(long, default_value = "2")]
        priority: u8,
        /// Run at a specific time (RFC 3339)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        /// Recur hourly, daily, weekly, or monthly
        #[arg(long)]
        every: Option<String>,
        /// Action ids this one depends on
        #[arg(long)]
        depends_on: Vec<Uuid>,
        /// Goal this action belongs to
        #[arg(long)]
        goal: Option<String>,
    },

    /// Cancel an action wherever it currently sits
    Cancel { id: Uuid },
}

pub fn run(root: &Path, subcommand: ActionSubcommand, json: bool) -> anyhow::Result<()> {
    let config = VigilConfig::load(root)?;
    let scheduler = ActionScheduler::open(root, config.scheduler, EventBus::new())
        .context("failed to open scheduler state")?;

    match subcommand {
        ActionSubcommand::List { history } => {
            let snap = scheduler.snapshot();
            if json {
                return print_json(&snap);
            }
            let mut rows: Vec<Vec<String>> = Vec::new();
            let lists: [(&str, &[vigil_core::action::ScheduledAction]); 3] = [
                ("queue", &snap.queue),
                ("scheduled", &snap.scheduled),
                ("blocked", &snap.blocked),
            ];
            for (list, actions) in lists {
                for a in actions {
                    rows.push(vec![
                        a.id.to_string(),
                        list.to_owned(),
                        a.tool.clone(),
                        a.action_type.clone(),
                        a.priority.to_string(),
                        a.scheduled_for
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_default(),
                    ]);
                }
            }
            if history {
                for a in &snap.completed {
                    rows.push(vec![
                        a.id.to_string(),
                        format!("{:?}", a.status).to_lowercase(),
                        a.tool.clone(),
                        a.action_type.clone(),
                        a.priority.to_string(),
                        a.completed_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                    ]);
                }
            }
            print_table(&["id", "state", "tool", "type", "prio", "when"], rows);
        }

        ActionSubcommand::Add {
            action_type,
            tool,
            target,
            params,
            priority,
            at,
            every,
            depends_on,
            goal,
        } => {
            let params: serde_json::Value =
                serde_json::from_str(&params).context("--params is not valid JSON")?;
            let recurrence = match every.as_deref() {
                None => Recurrence::None,
                Some("hourly") => Recurrence::Hourly,
                Some("daily") => Recurrence::Daily,
                Some("weekly") => Recurrence::Weekly,
                Some("monthly") => Recurrence::Monthly,
                Some(other) => bail!("unknown recurrence '{other}'"),
            };

            let action = scheduler.schedule(ActionSpec {
                action_type,
                tool,
                target,
                params,
                priority,
                goal_id: goal,
                scheduled_for: at,
                depends_on,
                recurrence,
                ..Default::default()
            })?;

            if json {
                print_json(&action)?;
            } else {
                println!("scheduled {} ({:?})", action.id, action.status);
            }
        }

        ActionSubcommand::Cancel { id } => match scheduler.cancel(id)? {
            Some(action) => println!("cancelled {} ({})", action.id, action.tool),
            None => bail!("no active action with id {id}"),
        },
    }

    Ok(())
}
