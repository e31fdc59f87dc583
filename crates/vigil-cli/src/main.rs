mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{action::ActionSubcommand, goal::GoalSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "vigil",
    about = "Autonomous agent daemon — durable scheduling, goal cycles, worker election",
    version,
    propagate_version = true
)]
struct Cli {
    /// Agent root (default: auto-detect from .vigil/)
    #[arg(long, global = true, env = "VIGIL_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a vigil root in the current directory
    Init,

    /// Run the daemon (worker or viewer, decided by lease election)
    Run,

    /// Show the instance's mode, current goal, and queue depths
    Status,

    /// Manage scheduled actions
    Action {
        #[command(subcommand)]
        subcommand: ActionSubcommand,
    },

    /// Manage goals
    Goal {
        #[command(subcommand)]
        subcommand: GoalSubcommand,
    },

    /// Approve a goal waiting for sign-off
    Approve { goal_id: String },

    /// Reject a goal waiting for sign-off
    Reject { goal_id: String },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Run => cmd::run::run(&root),
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Action { subcommand } => cmd::action::run(&root, subcommand, cli.json),
        Commands::Goal { subcommand } => cmd::goal::run(&root, subcommand, cli.json),
        Commands::Approve { goal_id } => cmd::approve::run(&root, &goal_id, true),
        Commands::Reject { goal_id } => cmd::approve::run(&root, &goal_id, false),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
