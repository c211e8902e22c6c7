//! Adapters wrapping `sa_tools`'s exec/process functions as [`Tool`]
//! implementations, so the Tool Executor (C5) has concrete production
//! tools registered against it rather than only test doubles. Grounded
//! on the teacher's gateway tool dispatch, which called these same
//! `sa_tools` functions directly from its own HTTP tool-call handler.

use std::sync::Arc;

use sa_tools::exec::{exec, ExecRequest};
use sa_tools::process::{handle_process, ProcessRequest};
use sa_tools::ProcessManager;

use crate::tool_executor::{Tool, ToolExecutionContext, ToolInfo, ToolOutcome};

/// `exec` — run a shell command foreground or background.
pub struct ExecTool {
    manager: Arc<ProcessManager>,
}

impl ExecTool {
    pub fn new(manager: Arc<ProcessManager>) -> Self {
        Self { manager }
    }
}

#[async_trait::async_trait]
impl Tool for ExecTool {
    fn get_info(&self) -> ToolInfo {
        ToolInfo {
            name: "exec".into(),
            description: "Run a shell command. Long-running commands auto-background after the configured yield time.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string" },
                    "background": { "type": "boolean" },
                    "yield_ms": { "type": "integer" },
                    "timeout_sec": { "type": "integer" },
                    "workdir": { "type": "string" },
                    "env": { "type": "object" }
                },
                "required": ["command"]
            }),
        }
    }

    async fn execute(&self, arguments: serde_json::Value, _ctx: &ToolExecutionContext) -> ToolOutcome {
        let req: ExecRequest = match serde_json::from_value(arguments) {
            Ok(r) => r,
            Err(e) => return ToolOutcome::error(format!("invalid exec arguments: {e}")),
        };
        let response = exec(&self.manager, req).await;
        match serde_json::to_value(&response) {
            Ok(v) => ToolOutcome::ok(v.to_string()),
            Err(e) => ToolOutcome::error(format!("failed to serialize exec response: {e}")),
        }
    }
}

/// `process` — manage background process sessions started by `exec`.
pub struct ProcessTool {
    manager: Arc<ProcessManager>,
}

impl ProcessTool {
    pub fn new(manager: Arc<ProcessManager>) -> Self {
        Self { manager }
    }
}

#[async_trait::async_trait]
impl Tool for ProcessTool {
    fn get_info(&self) -> ToolInfo {
        ToolInfo {
            name: "process".into(),
            description: "Inspect or control a background process session started by exec (list/poll/log/write/kill/clear/remove).".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["list", "poll", "log", "write", "kill", "clear", "remove"] },
                    "session_id": { "type": "string" },
                    "offset": { "type": "integer" },
                    "limit": { "type": "integer" },
                    "tail_lines": { "type": "integer" },
                    "data": { "type": "string" },
                    "eof": { "type": "boolean" }
                },
                "required": ["action"]
            }),
        }
    }

    async fn execute(&self, arguments: serde_json::Value, _ctx: &ToolExecutionContext) -> ToolOutcome {
        let req: ProcessRequest = match serde_json::from_value(arguments) {
            Ok(r) => r,
            Err(e) => return ToolOutcome::error(format!("invalid process arguments: {e}")),
        };
        let response = handle_process(&self.manager, req).await;
        if !response.success {
            return ToolOutcome::error(response.error.unwrap_or_else(|| "process action failed".into()));
        }
        match response.data {
            Some(v) => ToolOutcome::ok(v.to_string()),
            None => ToolOutcome::ok(""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::config::ExecConfig;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn ctx() -> ToolExecutionContext {
        ToolExecutionContext { task_id: Uuid::new_v4(), cancel: CancellationToken::new(), chunk_sink: None }
    }

    #[tokio::test]
    async fn exec_tool_runs_a_foreground_command() {
        let manager = Arc::new(ProcessManager::new(ExecConfig::default()));
        let tool = ExecTool::new(manager);
        let outcome = tool.execute(serde_json::json!({"command": "echo hi"}), &ctx()).await;
        assert!(outcome.error.is_none());
        assert!(outcome.content.contains("\"output\""));
    }

    #[tokio::test]
    async fn exec_tool_rejects_malformed_arguments() {
        let manager = Arc::new(ProcessManager::new(ExecConfig::default()));
        let tool = ExecTool::new(manager);
        let outcome = tool.execute(serde_json::json!({}), &ctx()).await;
        assert!(outcome.error.unwrap().contains("invalid exec arguments"));
    }

    #[tokio::test]
    async fn process_tool_lists_empty_sessions() {
        let manager = Arc::new(ProcessManager::new(ExecConfig::default()));
        let tool = ProcessTool::new(manager);
        let outcome = tool.execute(serde_json::json!({"action": "list"}), &ctx()).await;
        assert!(outcome.error.is_none());
        assert!(outcome.content.contains("\"count\":0"));
    }

    #[tokio::test]
    async fn process_tool_poll_unknown_session_is_error() {
        let manager = Arc::new(ProcessManager::new(ExecConfig::default()));
        let tool = ProcessTool::new(manager);
        let outcome = tool.execute(serde_json::json!({"action": "poll", "session_id": "nope"}), &ctx()).await;
        assert!(outcome.error.is_some());
    }
}
