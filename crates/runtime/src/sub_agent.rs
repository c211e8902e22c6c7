//! Sub-agent delegation as a tool (§3 "Supplemented features").
//!
//! Grounded on the teacher's `runtime/agent.rs::run_agent`: a parent
//! reasoning loop delegates a task to a named sub-agent by recursively
//! driving another reasoning loop to completion and returning its final
//! text. Unlike the teacher, there is no separate `AgentManager`/
//! `AppState` — the tool itself holds one scoped `RuntimeServices` per
//! configured agent, built once at construction time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sa_domain::config::{AgentConfig, MemoryMode};

use crate::events::RuntimeEvent;
use crate::lifecycle::LifecycleManager;
use crate::reasoning_loop::{spawn_task, DefaultStrategy, RuntimeServices, Strategy};
use crate::tool_executor::{Tool, ToolExecutionContext, ToolExecutor, ToolInfo, ToolOutcome, ToolRegistry};

struct SubAgent {
    config: AgentConfig,
    services: Arc<RuntimeServices>,
}

/// `agent.run` — delegate a task string to a named sub-agent and block
/// until its child task completes, returning the final assistant text.
pub struct SubAgentTool {
    agents: HashMap<String, SubAgent>,
    lifecycle: Arc<LifecycleManager>,
}

impl SubAgentTool {
    /// Build the tool from configured agents. `base` supplies the task
    /// store, history, checkpoints, model, and retrieval config every
    /// sub-agent shares; `shared_registry` is filtered per-agent by its
    /// `tool_policy` (§ "AgentConfig"). Model routing per sub-agent role
    /// (`AgentConfig::models`) is not wired — every sub-agent currently
    /// runs against `base.model`, same as the parent.
    pub fn new(configs: HashMap<String, AgentConfig>, base: &RuntimeServices, shared_registry: &ToolRegistry, lifecycle: Arc<LifecycleManager>) -> Self {
        let agents = configs
            .into_iter()
            .map(|(id, config)| {
                let filtered = shared_registry.filtered(&config.tool_policy);
                let services = Arc::new(RuntimeServices {
                    task_store: base.task_store.clone(),
                    history: base.history.clone(),
                    checkpoints: base.checkpoints.clone(),
                    tool_executor: Arc::new(ToolExecutor::new(filtered)),
                    tool_policy: base.tool_policy.clone(),
                    model: base.model.clone(),
                    retrieval: base.retrieval.clone(),
                });
                (id, SubAgent { config, services })
            })
            .collect();
        Self { agents, lifecycle }
    }
}

#[async_trait::async_trait]
impl Tool for SubAgentTool {
    fn get_info(&self) -> ToolInfo {
        ToolInfo {
            name: "agent.run".into(),
            description: "Delegate a task to a named sub-agent and return its final answer.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "agent_id": { "type": "string", "description": "Configured sub-agent id" },
                    "task": { "type": "string", "description": "Task description passed to the sub-agent" }
                },
                "required": ["agent_id", "task"]
            }),
        }
    }

    async fn execute(&self, arguments: serde_json::Value, ctx: &ToolExecutionContext) -> ToolOutcome {
        let Some(agent_id) = arguments.get("agent_id").and_then(|v| v.as_str()) else {
            return ToolOutcome::error("missing required argument: agent_id");
        };
        let Some(task) = arguments.get("task").and_then(|v| v.as_str()) else {
            return ToolOutcome::error("missing required argument: task");
        };

        let Some(sub) = self.agents.get(agent_id) else {
            let available: Vec<&str> = self.agents.keys().map(String::as_str).collect();
            return ToolOutcome::error(format!("agent '{agent_id}' not found. Available: {available:?}"));
        };

        // Shared mode keeps one running context per agent id so repeat
        // delegation accumulates history; isolated mode starts fresh.
        let context_id = match sub.config.memory_mode {
            MemoryMode::Shared => format!("agent:{agent_id}"),
            MemoryMode::Isolated => format!("agent:{agent_id}:task:{}", uuid::Uuid::new_v4()),
        };

        let strategy: Arc<dyn Strategy> = Arc::new(DefaultStrategy);
        let spawned = spawn_task(self.lifecycle.clone(), sub.services.clone(), strategy, context_id, task.to_string(), None).await;
        let (_, rx) = match spawned {
            Ok(pair) => pair,
            Err(e) => return ToolOutcome::error(format!("failed to start sub-agent '{agent_id}': {e}")),
        };

        let drain = drain_final_text(rx);
        let outcome = if sub.config.limits.max_duration_ms == 0 {
            drain.await
        } else {
            match tokio::time::timeout(Duration::from_millis(sub.config.limits.max_duration_ms), drain).await {
                Ok(outcome) => outcome,
                Err(_) => ToolOutcome::error(format!("sub-agent '{agent_id}' exceeded max_duration_ms={}", sub.config.limits.max_duration_ms)),
            }
        };

        if ctx.cancel.is_cancelled() {
            return ToolOutcome::cancelled();
        }
        outcome
    }
}

async fn drain_final_text(mut rx: tokio::sync::mpsc::Receiver<RuntimeEvent>) -> ToolOutcome {
    let mut final_text = String::new();
    while let Some(event) = rx.recv().await {
        match event {
            RuntimeEvent::Text { text, .. } => final_text = text,
            RuntimeEvent::Error { message, .. } => return ToolOutcome::error(message),
            RuntimeEvent::Cancelled { .. } => return ToolOutcome::cancelled(),
            _ => {}
        }
    }
    ToolOutcome::ok(final_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use sa_domain::capability::LlmCapabilities;
    use sa_domain::config::{AgentLimits, RetrievalConfig, ToolPolicy};
    use sa_domain::error::{Error, Result};
    use sa_providers::traits::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};
    use sa_sessions::{CheckpointStore, HistoryStore};
    use tokio::sync::Mutex as AsyncMutex;
    use uuid::Uuid;

    use crate::task_store::TaskStore;
    use crate::tool_executor::ToolExecutionContext;

    struct StubProvider {
        responses: AsyncMutex<VecDeque<Result<ChatResponse>>>,
        caps: LlmCapabilities,
    }
    impl StubProvider {
        fn new(responses: Vec<Result<ChatResponse>>) -> Self {
            Self { responses: AsyncMutex::new(responses.into_iter().collect()), caps: LlmCapabilities::default() }
        }
    }
    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            self.responses.lock().await.pop_front().expect("no more scripted responses")
        }
        async fn chat_stream(&self, _req: ChatRequest) -> Result<sa_domain::stream::BoxStream<'static, Result<sa_domain::stream::StreamEvent>>> {
            Err(Error::Other("unused".into()))
        }
        async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
            Err(Error::Other("unused".into()))
        }
        fn capabilities(&self) -> &LlmCapabilities {
            &self.caps
        }
        fn provider_id(&self) -> &str {
            "stub"
        }
    }

    fn chat_response(content: &str) -> Result<ChatResponse> {
        Ok(ChatResponse { content: content.to_string(), tool_calls: vec![], usage: None, model: "stub".into(), finish_reason: Some("stop".into()) })
    }

    fn base_services(model: Arc<dyn LlmProvider>, dir: &std::path::Path) -> Arc<RuntimeServices> {
        Arc::new(RuntimeServices {
            task_store: Arc::new(TaskStore::new()),
            history: Arc::new(HistoryStore::new(dir)),
            checkpoints: Arc::new(CheckpointStore::new(dir).unwrap()),
            tool_executor: Arc::new(ToolExecutor::new(ToolRegistry::new())),
            tool_policy: HashMap::new(),
            model,
            retrieval: RetrievalConfig::default(),
        })
    }

    fn exec_ctx() -> ToolExecutionContext {
        ToolExecutionContext { task_id: Uuid::new_v4(), cancel: tokio_util::sync::CancellationToken::new(), chunk_sink: None }
    }

    #[tokio::test]
    async fn delegates_to_configured_agent_and_returns_final_text() {
        let tmp = tempfile::tempdir().unwrap();
        let base = base_services(Arc::new(StubProvider::new(vec![chat_response("sub-agent answer")])), tmp.path());
        let mut agents = HashMap::new();
        agents.insert("researcher".to_string(), AgentConfig::default());
        let lifecycle = Arc::new(LifecycleManager::new(base.task_store.clone()));
        let tool = SubAgentTool::new(agents, &base, &ToolRegistry::new(), lifecycle);

        let outcome = tool
            .execute(serde_json::json!({"agent_id": "researcher", "task": "look into X"}), &exec_ctx())
            .await;
        assert_eq!(outcome.content, "sub-agent answer");
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn unknown_agent_id_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let base = base_services(Arc::new(StubProvider::new(vec![])), tmp.path());
        let lifecycle = Arc::new(LifecycleManager::new(base.task_store.clone()));
        let tool = SubAgentTool::new(HashMap::new(), &base, &ToolRegistry::new(), lifecycle);

        let outcome = tool.execute(serde_json::json!({"agent_id": "nope", "task": "x"}), &exec_ctx()).await;
        assert!(outcome.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn missing_arguments_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let base = base_services(Arc::new(StubProvider::new(vec![])), tmp.path());
        let lifecycle = Arc::new(LifecycleManager::new(base.task_store.clone()));
        let tool = SubAgentTool::new(HashMap::new(), &base, &ToolRegistry::new(), lifecycle);

        let outcome = tool.execute(serde_json::json!({"task": "x"}), &exec_ctx()).await;
        assert!(outcome.error.unwrap().contains("agent_id"));

        let outcome = tool.execute(serde_json::json!({"agent_id": "a"}), &exec_ctx()).await;
        assert!(outcome.error.unwrap().contains("task"));
    }

    #[tokio::test]
    async fn slow_sub_agent_times_out() {
        let tmp = tempfile::tempdir().unwrap();
        // StubProvider with no scripted responses never answers before
        // the tight deadline below fires (the mpsc channel just hangs
        // open until the spawned loop panics trying to pop a response,
        // which closes the channel — either way the timeout wins the race).
        let base = base_services(Arc::new(StubProvider::new(vec![])), tmp.path());
        let mut agents = HashMap::new();
        agents.insert(
            "slow".to_string(),
            AgentConfig { limits: AgentLimits { max_duration_ms: 1, ..AgentLimits::default() }, ..AgentConfig::default() },
        );
        let lifecycle = Arc::new(LifecycleManager::new(base.task_store.clone()));
        let tool = SubAgentTool::new(agents, &base, &ToolRegistry::new(), lifecycle);

        let outcome = tool.execute(serde_json::json!({"agent_id": "slow", "task": "x"}), &exec_ctx()).await;
        assert!(outcome.error.is_some());
    }

    #[test]
    fn tool_policy_filters_registry() {
        let mut registry = ToolRegistry::new();
        struct NoopTool(&'static str);
        #[async_trait]
        impl Tool for NoopTool {
            fn get_info(&self) -> ToolInfo {
                ToolInfo { name: self.0.into(), description: String::new(), parameters: serde_json::json!({}) }
            }
            async fn execute(&self, _arguments: serde_json::Value, _ctx: &ToolExecutionContext) -> ToolOutcome {
                ToolOutcome::ok("")
            }
        }
        registry.register(Arc::new(NoopTool("exec")));
        registry.register(Arc::new(NoopTool("memory.search")));

        let policy = ToolPolicy { allow: vec![], deny: vec!["exec".into()] };
        let filtered = registry.filtered(&policy);
        assert!(filtered.get("exec").is_none());
        assert!(filtered.get("memory.search").is_some());
    }
}
