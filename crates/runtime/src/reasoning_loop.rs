//! Reasoning Loop (C7).
//!
//! One outer invocation per task: load history, iterate model calls
//! through the Context Builder (C4), route tool calls through the
//! Approval Gate (C6) and Tool Executor (C5), checkpoint via C3, and
//! advance the task through C8. Runs as a background producer writing
//! into a bounded output channel (§9 "Streaming channel + background
//! producer").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use sa_domain::config::{RetrievalConfig, ToolConfig};
use sa_domain::error::Result;
use sa_domain::task::TaskState;
use sa_domain::tool::{ContentPart, Message, MessageContent, Role, ToolDefinition};
use sa_providers::traits::{ChatRequest, ChatResponse, LlmProvider};
use sa_sessions::{CheckpointStore, HistoryStore};

use crate::approval::{self, CallDecision};
use crate::checkpoint::{CheckpointCodec, ExecutionState, Phase};
use crate::context_builder::{build_messages, DefaultPromptSlots, PromptSlotDefaults, PromptSlots};
use crate::events::RuntimeEvent;
use crate::lifecycle::LifecycleManager;
use crate::task_store::TaskStore;
use crate::tool_executor::{ToolExecutionContext, ToolExecutor};

/// Output channel capacity (§4.7 "capacity ≈100").
const OUTPUT_CHANNEL_CAPACITY: usize = 100;
/// Retry cap for retryable model-call errors (§4.7.1).
const MODEL_RETRY_CAP: u32 = 3;
const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(120);

/// `{prepare_iteration, after_iteration, should_stop, required_tools,
/// prompt_slots}` — a pluggable policy controlling iteration behavior
/// (§9 "Polymorphism over tool/strategy implementations"). Default
/// methods give a reasonable single-pass ReAct-style loop.
pub trait Strategy: Send + Sync {
    fn prompt_slots(&self) -> PromptSlots {
        PromptSlots::default()
    }

    fn required_tools(&self) -> Vec<String> {
        Vec::new()
    }

    fn max_iterations(&self) -> Option<u32> {
        None
    }

    /// Called before building messages for iteration `i`; may return
    /// extra context to insert as the `additional_context` message.
    fn prepare_iteration(&self, _iteration: u32, _state: &ExecutionState) -> Option<String> {
        None
    }

    fn after_iteration(&self, _iteration: u32, _response: &ChatResponse) {}

    /// Whether the loop should stop after this iteration. Default: stop
    /// once the model produces a turn with no tool calls.
    fn should_stop(&self, _iteration: u32, response: &ChatResponse) -> bool {
        response.tool_calls.is_empty()
    }
}

/// The default single-pass strategy: no planning/reflection overlay.
pub struct DefaultStrategy;
impl Strategy for DefaultStrategy {}

/// The services one reasoning loop invocation is wired against.
pub struct RuntimeServices {
    pub task_store: Arc<TaskStore>,
    pub history: Arc<HistoryStore>,
    pub checkpoints: Arc<CheckpointStore>,
    pub tool_executor: Arc<ToolExecutor>,
    pub tool_policy: HashMap<String, ToolConfig>,
    pub model: Arc<dyn LlmProvider>,
    pub retrieval: RetrievalConfig,
}

impl RuntimeServices {
    fn tool_timeout(&self, tool_name: &str) -> Option<Duration> {
        self.tool_policy.get(tool_name).and_then(|c| c.timeout())
    }
}

/// Start a brand-new task and spawn its reasoning loop. Returns
/// immediately with the task id and the loop's output stream.
pub async fn spawn_task(
    lifecycle: Arc<LifecycleManager>,
    services: Arc<RuntimeServices>,
    strategy: Arc<dyn Strategy>,
    context_id: String,
    user_input: String,
    max_iterations_override: Option<u32>,
) -> Result<(Uuid, mpsc::Receiver<RuntimeEvent>)> {
    let task = services.task_store.create(context_id.clone(), Some(Message::user(&user_input)));
    let task_id = task.id;
    services.task_store.update_status(task_id, TaskState::Working, None)?;

    let cancel = lifecycle
        .claim(task_id)
        .expect("a freshly created task id cannot already be active (I3)");
    let state = ExecutionState::new(task_id, context_id, user_input);

    let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
    tokio::spawn(run_loop(lifecycle, services, strategy, state, cancel, max_iterations_override, tx));
    Ok((task_id, rx))
}

/// Resume a loop from a checkpointed snapshot — used both by an inline
/// HITL resume across process boundaries and by Recovery (C9). `None`
/// if the task already has an active loop (I3).
pub async fn spawn_resume(
    lifecycle: Arc<LifecycleManager>,
    services: Arc<RuntimeServices>,
    strategy: Arc<dyn Strategy>,
    state: ExecutionState,
    max_iterations_override: Option<u32>,
) -> Option<(Uuid, mpsc::Receiver<RuntimeEvent>)> {
    let task_id = state.task_id;
    let cancel = lifecycle.claim(task_id)?;
    let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
    tokio::spawn(run_loop(lifecycle, services, strategy, state, cancel, max_iterations_override, tx));
    Some((task_id, rx))
}

async fn call_model_with_retry(
    model: &dyn LlmProvider,
    request: ChatRequest,
    iteration: u32,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<RuntimeEvent>,
) -> Result<ChatResponse> {
    let mut attempt = 0u32;
    loop {
        match model.chat(request.clone()).await {
            Ok(resp) => return Ok(resp),
            Err(err) if err.is_retryable() && attempt < MODEL_RETRY_CAP => {
                attempt += 1;
                let wait = err.retry_after().unwrap_or(DEFAULT_RETRY_WAIT);
                let _ = tx
                    .send(RuntimeEvent::RateLimitWait { iteration, wait_seconds: wait.as_secs(), attempt })
                    .await;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(err),
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            Err(err) => return Err(err),
        }
    }
}

fn error_tool_result(tool_use_id: &str, content: String) -> Message {
    Message {
        role: Role::Tool,
        content: MessageContent::Parts(vec![ContentPart::ToolResult { tool_use_id: tool_use_id.to_string(), content, is_error: true }]),
    }
}

async fn run_loop(
    lifecycle: Arc<LifecycleManager>,
    services: Arc<RuntimeServices>,
    strategy: Arc<dyn Strategy>,
    mut state: ExecutionState,
    cancel: CancellationToken,
    max_iterations_override: Option<u32>,
    tx: mpsc::Sender<RuntimeEvent>,
) {
    let task_id = state.task_id;
    let codec = CheckpointCodec::new(&services.checkpoints);
    let max_iterations = max_iterations_override.or_else(|| strategy.max_iterations()).unwrap_or(5);

    // B1: max_iterations = 0 makes zero model calls and fails the task.
    if max_iterations == 0 {
        let _ = services
            .task_store
            .update_status(task_id, TaskState::Failed, Some(Message::system("max_iterations is 0: no progress possible")));
        let _ = tx.send(RuntimeEvent::FinalStatus { task_id, state: TaskState::Failed.to_string() }).await;
        lifecycle.release(task_id);
        return;
    }

    let fresh_start = state.iteration == 0 && state.accumulated_response.is_empty() && state.pending_tool_call.is_none();
    // Pre-turn history (I6 slot (b)): fetched once, never includes messages
    // this task itself produces — those accumulate in `turn_messages` and
    // are passed separately so the current query always lands right after
    // history and before anything produced in this task's own iterations.
    let retrieved_history: Vec<Message> = services.history.recent(&state.context_id, &services.retrieval);
    let mut turn_messages: Vec<Message> = Vec::new();
    if fresh_start {
        let _ = services.history.add(&state.context_id, Message::user(&state.query), services.retrieval.budget);
    }

    let defaults = DefaultPromptSlots;
    let slots = strategy.prompt_slots();

    for i in state.iteration..max_iterations {
        if cancel.is_cancelled() {
            let _ = tx.send(RuntimeEvent::Cancelled { task_id }).await;
            let _ = services.task_store.update_status(task_id, TaskState::Cancelled, None);
            lifecycle.release(task_id);
            return;
        }

        let extra_context = strategy.prepare_iteration(i, &state);
        state.phase = Phase::BuildingMessages;

        let messages = build_messages(&state.query, None, &slots, &defaults, &retrieved_history, extra_context.as_deref(), &turn_messages);

        let tools: Vec<ToolDefinition> = services
            .tool_executor
            .tool_definitions()
            .into_iter()
            .map(|t| ToolDefinition { name: t.name, description: t.description, parameters: t.parameters })
            .collect();
        let request = ChatRequest { messages, tools, temperature: None, max_tokens: None, json_mode: false, model: None };

        state.phase = Phase::AwaitingModel;
        let response = match call_model_with_retry(services.model.as_ref(), request, i, &cancel, &tx).await {
            Ok(r) => r,
            Err(e) => {
                let _ = tx.send(RuntimeEvent::Error { task_id, message: e.to_string() }).await;
                let _ = services.task_store.update_status(task_id, TaskState::Failed, Some(Message::system(format!("model call failed: {e}"))));
                let _ = tx.send(RuntimeEvent::FinalStatus { task_id, state: TaskState::Failed.to_string() }).await;
                lifecycle.release(task_id);
                return;
            }
        };

        state.pending_tool_call = response.tool_calls.first().cloned();

        let text = if response.content.is_empty() && response.tool_calls.is_empty() {
            "agent returned empty response".to_string()
        } else {
            response.content.clone()
        };
        if !text.is_empty() {
            let _ = tx.send(RuntimeEvent::Text { iteration: i, text: text.clone() }).await;
        }
        state.accumulated_response = text.clone();

        if response.tool_calls.is_empty() {
            let assistant_msg = Message::assistant(&text);
            turn_messages.push(assistant_msg.clone());
            let _ = services.history.add(&state.context_id, assistant_msg.clone(), services.retrieval.budget);
            let _ = services.task_store.add_message(task_id, assistant_msg);
        } else {
            let mut parts = Vec::new();
            if !response.content.is_empty() {
                parts.push(ContentPart::Text { text: response.content.clone() });
            }
            for call in &response.tool_calls {
                parts.push(ContentPart::ToolUse { id: call.call_id.clone(), name: call.tool_name.clone(), input: call.arguments.clone() });
            }
            let assistant_msg = Message { role: Role::Assistant, content: MessageContent::Parts(parts) };
            turn_messages.push(assistant_msg.clone());
            let _ = services.history.add(&state.context_id, assistant_msg.clone(), services.retrieval.budget);
            let _ = services.task_store.add_message(task_id, assistant_msg);
            for call in &response.tool_calls {
                let _ = tx
                    .send(RuntimeEvent::ToolCallNotice {
                        iteration: i,
                        call_id: call.call_id.clone(),
                        tool_name: call.tool_name.clone(),
                        arguments: call.arguments.clone(),
                    })
                    .await;
            }

            state.phase = Phase::ExecutingTools;
            let mut stored_decision: Option<approval::UserDecision> = None;
            let resolved = loop {
                let outcome = approval::evaluate(&response.tool_calls, &services.tool_policy, stored_decision.as_ref());
                if !outcome.needs_user_input {
                    break outcome.resolved;
                }

                state.phase = Phase::AwaitingApproval;
                if let Err(e) = codec.write(&state.context_id, &state) {
                    let _ = tx.send(RuntimeEvent::Error { task_id, message: e.to_string() }).await;
                }
                let approval_message = outcome.approval_message.expect("needs_user_input implies a message");
                let _ = tx
                    .send(RuntimeEvent::ApprovalRequired {
                        task_id,
                        tool_name: response
                            .tool_calls
                            .iter()
                            .find(|c| !outcome.resolved.iter().any(|(r, _)| r.call_id == c.call_id))
                            .map(|c| c.tool_name.clone())
                            .unwrap_or_default(),
                        prompt: approval_message.content.text().unwrap_or_default().to_string(),
                    })
                    .await;

                let awaiter = match lifecycle.pause(task_id, approval_message) {
                    Ok(rx) => rx,
                    Err(e) => {
                        let _ = tx.send(RuntimeEvent::Error { task_id, message: e.to_string() }).await;
                        lifecycle.release(task_id);
                        return;
                    }
                };
                match awaiter.await {
                    Ok(resume_message) => {
                        stored_decision = Some(approval::parse_decision(&resume_message));
                        continue;
                    }
                    Err(_) => {
                        // Awaiter dropped: the pause timeout already failed the task.
                        lifecycle.release(task_id);
                        return;
                    }
                }
            };

            for (call, decision) in resolved {
                match decision {
                    CallDecision::Approved => {
                        // Streaming tools (§4.5) push intermediate chunks into
                        // `chunk_tx`; forward each straight to the event
                        // stream as it arrives rather than withholding it
                        // until the call completes. The forwarder exits once
                        // `exec_ctx` (and its sender) is dropped below.
                        let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(16);
                        let forward_tx = tx.clone();
                        let forward_call_id = call.call_id.clone();
                        let forward_tool_name = call.tool_name.clone();
                        let forward_task = tokio::spawn(async move {
                            while let Some(chunk) = chunk_rx.recv().await {
                                let _ = forward_tx
                                    .send(RuntimeEvent::ToolChunk {
                                        iteration: i,
                                        call_id: forward_call_id.clone(),
                                        tool_name: forward_tool_name.clone(),
                                        chunk,
                                    })
                                    .await;
                            }
                        });

                        let exec_ctx = ToolExecutionContext { task_id, cancel: cancel.clone(), chunk_sink: Some(chunk_tx) };
                        let timeout = services.tool_timeout(&call.tool_name);
                        let outcome = services.tool_executor.execute(&call, &exec_ctx, timeout).await;
                        drop(exec_ctx);
                        let _ = forward_task.await;

                        if outcome.cancelled {
                            let _ = tx.send(RuntimeEvent::Cancelled { task_id }).await;
                            let _ = services.task_store.update_status(task_id, TaskState::Cancelled, None);
                            lifecycle.release(task_id);
                            return;
                        }

                        let is_error = outcome.error.is_some();
                        let content = outcome.error.clone().unwrap_or_else(|| outcome.content.clone());
                        let _ = tx
                            .send(RuntimeEvent::ToolResultNotice {
                                iteration: i,
                                call_id: call.call_id.clone(),
                                tool_name: call.tool_name.clone(),
                                content: content.clone(),
                                is_error,
                            })
                            .await;
                        let result_msg = if is_error {
                            error_tool_result(&call.call_id, content)
                        } else {
                            Message::tool_result(&call.call_id, content)
                        };
                        turn_messages.push(result_msg.clone());
                        let _ = services.history.add(&state.context_id, result_msg.clone(), services.retrieval.budget);
                        let _ = services.task_store.add_message(task_id, result_msg);
                    }
                    CallDecision::Denied => {
                        let denial_msg = Message::tool_denied(&call.call_id);
                        let _ = tx
                            .send(RuntimeEvent::ToolResultNotice {
                                iteration: i,
                                call_id: call.call_id.clone(),
                                tool_name: call.tool_name.clone(),
                                content: "TOOL_EXECUTION_DENIED".to_string(),
                                is_error: true,
                            })
                            .await;
                        turn_messages.push(denial_msg.clone());
                        let _ = services.history.add(&state.context_id, denial_msg.clone(), services.retrieval.budget);
                        let _ = services.task_store.add_message(task_id, denial_msg);
                    }
                }
            }
            state.pending_tool_call = None;
        }

        strategy.after_iteration(i, &response);
        state.iteration = i + 1;
        state.phase = Phase::BuildingMessages;
        let _ = codec.write(&state.context_id, &state);

        if strategy.should_stop(i, &response) {
            break;
        }
    }

    let already_terminal = services.task_store.get(task_id).map(|t| t.status.state.is_terminal()).unwrap_or(true);
    if !already_terminal {
        let _ = services.task_store.update_status(task_id, TaskState::Completed, None);
    }
    let _ = codec.remove(&state.context_id, task_id);
    let final_state = services.task_store.get(task_id).map(|t| t.status.state.to_string()).unwrap_or_else(|| "unknown".to_string());
    let _ = tx.send(RuntimeEvent::FinalStatus { task_id, state: final_state }).await;
    lifecycle.release(task_id);
}
