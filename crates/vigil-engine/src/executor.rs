//! Subprocess-backed tool executor.
//!
//! Tools are external programs speaking a JSON stdin/stdout protocol: the
//! action's params (plus target) go in on stdin, a JSON result comes back on
//! stdout. Stderr flows through for real-time logging. The tool table lives
//! in config; an unmapped tool slug is an infrastructure error.

use std::collections::HashMap;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use vigil_core::action::ScheduledAction;
use vigil_core::config::CommandSpec;
use vigil_core::scheduler::{ActionExecutor, ExecutionOutcome};
use vigil_core::{Result, VigilError};

pub struct CommandToolExecutor {
    tools: HashMap<String, CommandSpec>,
}

impl CommandToolExecutor {
    pub fn new(tools: HashMap<String, CommandSpec>) -> Self {
        Self { tools }
    }

    fn stdin_payload(action: &ScheduledAction) -> serde_json::Value {
        serde_json::json!({
            "action_type": action.action_type,
            "target": action.target,
            "params": action.params,
        })
    }
}

#[async_trait::async_trait]
impl ActionExecutor for CommandToolExecutor {
    async fn execute(&self, action: &ScheduledAction) -> Result<ExecutionOutcome> {
        let spec = self
            .tools
            .get(&action.tool)
            .ok_or_else(|| VigilError::ToolNotConfigured(action.tool.clone()))?;
        let [program, args @ ..] = spec.argv.as_slice() else {
            return Err(VigilError::InvalidConfig(format!(
                "tool '{}' has an empty argv",
                action.tool
            )));
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // stderr flows through so tool log lines appear in the terminal
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| VigilError::ToolFailed {
            tool: action.tool.clone(),
            reason: format!("spawn failed: {e}"),
        })?;

        let payload = serde_json::to_vec(&Self::stdin_payload(action))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| VigilError::ToolFailed {
                    tool: action.tool.clone(),
                    reason: format!("failed to write stdin: {e}"),
                })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| VigilError::ToolFailed {
                tool: action.tool.clone(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            let hint: String = stdout.chars().take(500).collect();
            return Ok(ExecutionOutcome::failed(format!(
                "tool '{}' exited with {}: {hint}",
                action.tool, output.status
            )));
        }

        // A well-behaved tool prints a JSON result; anything else is kept
        // verbatim as a string.
        let value = serde_json::from_str(&stdout)
            .unwrap_or(serde_json::Value::String(stdout.trim().to_owned()));
        Ok(ExecutionOutcome::ok(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::action::ActionSpec;

    fn action(tool: &str) -> ScheduledAction {
        ScheduledAction::from_spec(
            ActionSpec {
                action_type: "work".into(),
                tool: tool.into(),
                target: "t".into(),
                params: serde_json::json!({"key": "value"}),
                ..Default::default()
            },
            3,
        )
    }

    fn executor_with(tool: &str, argv: Vec<String>) -> CommandToolExecutor {
        let mut tools = HashMap::new();
        tools.insert(
            tool.to_owned(),
            CommandSpec {
                argv,
                env: HashMap::new(),
            },
        );
        CommandToolExecutor::new(tools)
    }

    #[tokio::test]
    async fn unconfigured_tool_is_an_error() {
        let executor = CommandToolExecutor::new(HashMap::new());
        let err = executor.execute(&action("ghost")).await.unwrap_err();
        assert!(matches!(err, VigilError::ToolNotConfigured(_)));
    }

    #[tokio::test]
    async fn successful_tool_returns_stdout_json() {
        // `cat` echoes the stdin payload back, which is valid JSON.
        let executor = executor_with("echo", vec!["cat".into()]);
        let outcome = executor.execute(&action("echo")).await.unwrap();
        assert!(outcome.success);
        let value = outcome.output.unwrap();
        assert_eq!(value["target"], "t");
        assert_eq!(value["params"]["key"], "value");
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_failed_outcome_not_an_error() {
        let executor = executor_with("broken", vec!["false".into()]);
        let outcome = executor.execute(&action("broken")).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("broken"));
    }
}
