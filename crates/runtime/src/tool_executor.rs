//! Tool Executor (C5).
//!
//! Invokes a named tool, truncates oversized output, and surfaces tool
//! errors as structured results rather than raising them loop-fatally.
//! Tools are enumerated by tag in a registry (§9 "Polymorphism over
//! tool/strategy implementations"), not by inheritance.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use sa_domain::config::ToolPolicy;
use sa_domain::tool::ToolCall;

/// A tool result exceeding this many bytes is truncated with a visible
/// notice, per §4.5.
pub const TRUNCATION_CAP_BYTES: usize = 50_000;

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The structured result C5 returns — never raises tool errors as
/// loop-fatal; they're surfaced here instead.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: serde_json::Value,
    pub truncated: bool,
    pub cancelled: bool,
}

impl ToolOutcome {
    pub(crate) fn ok(content: impl Into<String>) -> Self {
        Self { content: content.into(), error: None, metadata: serde_json::Value::Null, truncated: false, cancelled: false }
    }

    pub(crate) fn error(message: impl Into<String>) -> Self {
        Self { content: String::new(), error: Some(message.into()), metadata: serde_json::Value::Null, truncated: false, cancelled: false }
    }

    pub(crate) fn cancelled() -> Self {
        Self { content: String::new(), error: Some("cancelled".into()), metadata: serde_json::Value::Null, truncated: false, cancelled: true }
    }
}

/// Context passed to a running tool: cancellation and, for streaming
/// tools, a sink to forward intermediate chunks to the caller's event
/// stream as they're produced (§4.5). A tool that streams sends each
/// chunk through `chunk_sink` as it's generated and still returns the
/// full accumulated content in its final `ToolOutcome`; a tool with no
/// intermediate output can ignore the field entirely. The caller (C7)
/// populates `chunk_sink` and forwards received chunks to its own event
/// stream for the lifetime of the call.
pub struct ToolExecutionContext {
    pub task_id: Uuid,
    pub cancel: CancellationToken,
    pub chunk_sink: Option<mpsc::Sender<String>>,
}

/// `{get_info, execute}` — the capability every built-in or user tool
/// implements (§9).
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn get_info(&self) -> ToolInfo;
    async fn execute(&self, arguments: serde_json::Value, ctx: &ToolExecutionContext) -> ToolOutcome;
}

/// Registry of available tools, enumerated by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.get_info().name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn definitions(&self) -> Vec<ToolInfo> {
        self.tools.values().map(|t| t.get_info()).collect()
    }

    /// Build a copy restricted to the tools a `ToolPolicy` allows — used
    /// to scope a sub-agent's tool set (§3 "Supplemented features").
    pub fn filtered(&self, policy: &ToolPolicy) -> ToolRegistry {
        ToolRegistry {
            tools: self.tools.iter().filter(|(name, _)| policy.allows(name)).map(|(n, t)| (n.clone(), t.clone())).collect(),
        }
    }
}

/// The Tool Executor: `execute(tool_call, ctx) -> ToolOutcome`.
pub struct ToolExecutor {
    registry: ToolRegistry,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// The tool definitions to advertise to the model for this turn.
    pub fn tool_definitions(&self) -> Vec<ToolInfo> {
        self.registry.definitions()
    }

    /// Invoke one tool call. Unknown tools produce `tool_not_found`;
    /// cancellation during the call produces a `cancelled` outcome
    /// rather than panicking or hanging; everything else is truncated
    /// per §4.5 and returned as a structured result.
    pub async fn execute(
        &self,
        call: &ToolCall,
        ctx: &ToolExecutionContext,
        timeout: Option<Duration>,
    ) -> ToolOutcome {
        if ctx.cancel.is_cancelled() {
            return ToolOutcome::cancelled();
        }

        let Some(tool) = self.registry.get(&call.tool_name) else {
            return ToolOutcome::error(format!("tool_not_found: {}", call.tool_name));
        };

        let run = tool.execute(call.arguments.clone(), ctx);
        let result = match timeout {
            Some(d) => tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return ToolOutcome::cancelled(),
                _ = tokio::time::sleep(d) => ToolOutcome::error(format!("tool {} timed out after {:?}", call.tool_name, d)),
                r = run => r,
            },
            None => tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return ToolOutcome::cancelled(),
                r = run => r,
            },
        };

        Self::truncate(result)
    }

    fn truncate(mut outcome: ToolOutcome) -> ToolOutcome {
        if outcome.content.len() > TRUNCATION_CAP_BYTES {
            let original_len = outcome.content.len();
            let mut cut = TRUNCATION_CAP_BYTES;
            while !outcome.content.is_char_boundary(cut) {
                cut -= 1;
            }
            outcome.content.truncate(cut);
            outcome
                .content
                .push_str(&format!("\n…[truncated, original size {original_len} bytes]"));
            outcome.truncated = true;
        }
        outcome
    }
}
