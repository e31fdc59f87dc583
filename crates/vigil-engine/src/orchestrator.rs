//! Orchestrator and goal-generation contracts.
//!
//! The orchestrator wraps an external AI-driven execution tool. It stays
//! opaque to the engine: one async call per goal dispatch, bounded by the
//! engine's timeout, plus a lifecycle stream for telemetry. The bundled
//! [`CommandOrchestrator`] shells out to a configured argv; anything
//! smarter lives outside this workspace.

use std::process::Stdio;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::broadcast;
use vigil_core::config::CommandSpec;
use vigil_core::goal::Goal;
use vigil_core::{Result, VigilError};

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct GoalContext {
    pub work_dir: Option<std::path::PathBuf>,
    pub user_context: String,
    pub agent_identity: String,
    /// Session to resume, if a previous cycle saved one.
    pub resume_session: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoalRunResult {
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Tool calls the orchestrator reports having made, as descriptions.
    #[serde(default)]
    pub tool_calls: Vec<String>,
}

/// Lifecycle telemetry emitted while a goal runs.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    Started { goal_id: String },
    OutputChunk { text: String },
    ToolUse { description: String },
    Decision { text: String },
    Error { error: String },
    Escalate { reason: String },
}

#[async_trait::async_trait]
pub trait Orchestrator: Send + Sync {
    async fn execute_goal(&self, goal: &Goal, ctx: &GoalContext) -> Result<GoalRunResult>;

    /// Subscribe to lifecycle telemetry. Implementations with nothing to
    /// report may return a channel that never fires.
    fn lifecycle(&self) -> broadcast::Receiver<OrchestratorEvent>;
}

/// AI-brain collaborator that proposes new goals when the manager runs dry.
#[async_trait::async_trait]
pub trait GoalSource: Send + Sync {
    async fn generate_goals(&self, context: &str) -> Result<Vec<Goal>>;
}

// ---------------------------------------------------------------------------
// CommandOrchestrator
// ---------------------------------------------------------------------------

/// Shells out to a configured command, feeding the goal prompt on stdin.
///
/// The subprocess may either print a JSON `GoalRunResult` object or plain
/// text (taken as successful output). A nonzero exit becomes a failed
/// result, not an `Err` — infrastructure failures (spawn errors) are `Err`.
pub struct CommandOrchestrator {
    spec: CommandSpec,
    lifecycle: broadcast::Sender<OrchestratorEvent>,
}

impl CommandOrchestrator {
    pub fn new(spec: CommandSpec) -> Self {
        let (lifecycle, _) = broadcast::channel(64);
        Self { spec, lifecycle }
    }

    fn prompt(goal: &Goal, ctx: &GoalContext) -> String {
        let mut parts = vec![
            format!("Goal: {}", goal.title),
            format!("Category: {}", goal.category),
        ];
        if !ctx.agent_identity.is_empty() {
            parts.push(format!("Identity: {}", ctx.agent_identity));
        }
        if !ctx.user_context.is_empty() {
            parts.push(format!("Context: {}", ctx.user_context));
        }
        if let Some(session) = &ctx.resume_session {
            parts.push(format!("Resume session: {session}"));
        }
        parts.join("\n")
    }

    fn parse_result(stdout: &str, status_ok: bool) -> GoalRunResult {
        // Structured result on the last non-empty line, plain text otherwise.
        if let Some(line) = stdout.lines().rev().find(|l| !l.trim().is_empty()) {
            if let Ok(parsed) = serde_json::from_str::<GoalRunResult>(line) {
                return parsed;
            }
        }
        GoalRunResult {
            success: status_ok,
            output: stdout.trim().to_owned(),
            error: if status_ok {
                None
            } else {
                Some(stdout.trim().to_owned())
            },
            session_id: None,
            tool_calls: Vec::new(),
        }
    }

    fn emit(&self, event: OrchestratorEvent) {
        let _ = self.lifecycle.send(event);
    }
}

#[async_trait::async_trait]
impl Orchestrator for CommandOrchestrator {
    async fn execute_goal(&self, goal: &Goal, ctx: &GoalContext) -> Result<GoalRunResult> {
        let [program, args @ ..] = self.spec.argv.as_slice() else {
            return Err(VigilError::InvalidConfig(
                "orchestrator has an empty argv".into(),
            ));
        };

        self.emit(OrchestratorEvent::Started {
            goal_id: goal.id.clone(),
        });

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&self.spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            // The engine races this call against its timeout; dropping the
            // future must take the subprocess down with it.
            .kill_on_drop(true);
        if let Some(dir) = &ctx.work_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| VigilError::Orchestrator(format!("spawn failed: {e}")))?;

        let prompt = Self::prompt(goal, ctx);
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| VigilError::Orchestrator(format!("failed to write stdin: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| VigilError::Orchestrator(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let result = Self::parse_result(&stdout, output.status.success());

        if result.success {
            self.emit(OrchestratorEvent::OutputChunk {
                text: result.output.clone(),
            });
            for call in &result.tool_calls {
                self.emit(OrchestratorEvent::ToolUse {
                    description: call.clone(),
                });
            }
        } else {
            self.emit(OrchestratorEvent::Error {
                error: result
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".into()),
            });
        }
        Ok(result)
    }

    fn lifecycle(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.lifecycle.subscribe()
    }
}

// ---------------------------------------------------------------------------
// CommandGoalSource
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProposedGoal {
    title: String,
    #[serde(default = "default_category")]
    category: String,
}

fn default_category() -> String {
    "general".to_owned()
}

/// Goal generation over the same subprocess convention: context on stdin,
/// a JSON array of `{title, category}` objects on stdout.
pub struct CommandGoalSource {
    spec: CommandSpec,
}

impl CommandGoalSource {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl GoalSource for CommandGoalSource {
    async fn generate_goals(&self, context: &str) -> Result<Vec<Goal>> {
        let [program, args @ ..] = self.spec.argv.as_slice() else {
            return Err(VigilError::InvalidConfig(
                "goal source has an empty argv".into(),
            ));
        };

        let mut child = Command::new(program)
            .args(args)
            .envs(&self.spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VigilError::Orchestrator(format!("spawn failed: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(context.as_bytes())
                .await
                .map_err(|e| VigilError::Orchestrator(format!("failed to write stdin: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| VigilError::Orchestrator(e.to_string()))?;
        if !output.status.success() {
            return Err(VigilError::Orchestrator(format!(
                "goal source exited with {}",
                output.status
            )));
        }

        let proposed: Vec<ProposedGoal> = serde_json::from_slice(&output.stdout)?;
        Ok(proposed
            .into_iter()
            .map(|p| Goal::new(uuid::Uuid::new_v4().to_string(), p.title, p.category))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
