//! The daemon: wire every component together and run until interrupted.

use anyhow::Context;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;
use vigil_core::config::VigilConfig;
use vigil_core::events::EventBus;
use vigil_core::goal::GoalManager;
use vigil_core::scheduler::{ActionExecutor, ActionScheduler};
use vigil_engine::coordinator::{FileLeaseStore, WorkerCoordinator};
use vigil_engine::engine::{EngineDeps, EngineLoop};
use vigil_engine::executor::CommandToolExecutor;
use vigil_engine::goal_store::YamlGoalStore;
use vigil_engine::notify::LogNotifier;
use vigil_engine::orchestrator::{
    CommandGoalSource, CommandOrchestrator, GoalSource, Orchestrator,
};

pub fn run(root: &Path) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_daemon(root))
}

async fn run_daemon(root: &Path) -> anyhow::Result<()> {
    let config = VigilConfig::load(root).context("failed to load config")?;
    let events = EventBus::new();

    let scheduler = Arc::new(
        ActionScheduler::open(root, config.scheduler.clone(), events.clone())
            .context("failed to open scheduler state")?,
    );
    let executor: Arc<dyn ActionExecutor> =
        Arc::new(CommandToolExecutor::new(config.tools.clone()));
    let goals: Arc<dyn GoalManager> =
        Arc::new(YamlGoalStore::open(root).context("failed to open goal store")?);

    let orchestrator: Option<Arc<dyn Orchestrator>> = config
        .orchestrator
        .clone()
        .map(|spec| Arc::new(CommandOrchestrator::new(spec)) as Arc<dyn Orchestrator>);
    let goal_source: Option<Arc<dyn GoalSource>> = config
        .goal_source
        .clone()
        .map(|spec| Arc::new(CommandGoalSource::new(spec)) as Arc<dyn GoalSource>);
    if orchestrator.is_none() {
        info!("no orchestrator configured, running with fallback tool sequences");
    }

    let coordinator = Arc::new(WorkerCoordinator::new(
        root,
        Arc::new(FileLeaseStore::new(root)),
        config.lease.clone(),
        events.clone(),
    ));
    coordinator.initialize().await;
    info!(
        instance = coordinator.instance_id(),
        mode = coordinator.mode().as_str(),
        "coordinator initialized"
    );
    let heartbeat = Arc::clone(&coordinator).run();

    // Mirror engine events onto stdout as JSON lines, for tailing.
    let mut event_stream = BroadcastStream::new(events.subscribe());
    let printer = tokio::spawn(async move {
        while let Some(event) = event_stream.next().await {
            if let Ok(event) = event {
                if let Ok(line) = serde_json::to_string(&event) {
                    println!("{line}");
                }
            }
        }
    });

    let engine = Arc::new(
        EngineLoop::new(
            root,
            config.engine.clone(),
            EngineDeps {
                scheduler,
                executor,
                goals,
                orchestrator,
                goal_source,
                coordinator: Arc::clone(&coordinator),
                notifier: Arc::new(LogNotifier),
                events,
            },
        )
        .context("failed to initialize engine")?,
    );

    tokio::select! {
        _ = Arc::clone(&engine).run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
    }

    heartbeat.abort();
    printer.abort();
    // Release the lease so a peer can take over without the staleness wait.
    coordinator.shutdown().await;
    Ok(())
}
