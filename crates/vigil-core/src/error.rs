use thiserror::Error;

#[derive(Debug, Error)]
pub enum VigilError {
    #[error("action not found: {0}")]
    ActionNotFound(uuid::Uuid),

    #[error("goal not found: {0}")]
    GoalNotFound(String),

    #[error("another action is already executing")]
    ActionInFlight,

    #[error("lease store error: {0}")]
    LeaseStore(String),

    #[error("lease lock busy: {0}")]
    LeaseLockBusy(String),

    #[error("orchestrator error: {0}")]
    Orchestrator(String),

    #[error("orchestrator timed out after {0}s")]
    OrchestratorTimeout(u64),

    #[error("tool '{tool}' failed: {reason}")]
    ToolFailed { tool: String, reason: String },

    #[error("tool '{0}' is not configured")]
    ToolNotConfigured(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VigilError>;
