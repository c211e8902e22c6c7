//! Agent execution runtime core: the nine components (C1-C9) that turn
//! a user message into a completed task, with checkpointed recovery
//! and human-in-the-loop approval.
//!
//! Modules map 1:1 onto the components: [`task_store`] (C1),
//! [`context_builder`] partially covers history retrieval wiring (C2
//! lives in `sa_sessions::HistoryStore`, consumed directly),
//! [`checkpoint`] (C3), [`context_builder`] (C4), [`tool_executor`]
//! (C5), [`approval`] (C6), [`reasoning_loop`] (C7), [`lifecycle`]
//! (C8), [`recovery`] (C9). [`sub_agent`] is a supplemented feature:
//! the `agent.run` tool, layered on top of C5/C7 rather than a core
//! component of its own.

pub mod approval;
pub mod builtin_tools;
pub mod checkpoint;
pub mod context_builder;
pub mod events;
pub mod lifecycle;
pub mod reasoning_loop;
pub mod recovery;
pub mod sub_agent;
pub mod task_store;
pub mod tool_executor;

pub use approval::{evaluate as evaluate_approval, parse_decision, CallDecision, Decision, DecisionStore, GateOutcome, UserDecision};
pub use builtin_tools::{ExecTool, ProcessTool};
pub use checkpoint::{CheckpointCodec, ExecutionState, Phase};
pub use context_builder::{build_messages, compose_system_prompt, DefaultPromptSlots, PromptSlotDefaults, PromptSlots};
pub use events::RuntimeEvent;
pub use lifecycle::{ActiveExecutions, AwaiterRegistry, LifecycleManager};
pub use reasoning_loop::{spawn_resume, spawn_task, DefaultStrategy, RuntimeServices, Strategy};
pub use recovery::{recover_all, RecoveryOutcome};
pub use sub_agent::SubAgentTool;
pub use task_store::TaskStore;
pub use tool_executor::{Tool, ToolExecutionContext, ToolExecutor, ToolInfo, ToolOutcome, ToolRegistry, TRUNCATION_CAP_BYTES};
