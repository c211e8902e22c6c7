//! The reasoning loop's output event stream (§4.7, §4.7.2).
//!
//! Events are produced by a single background producer per task and
//! consumed in iteration order: text chunks of iteration *i* precede tool
//! notices of iteration *i*, which precede tool results of iteration *i*,
//! which precede text of iteration *i+1*.

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    Text { iteration: u32, text: String },
    ToolCallNotice {
        iteration: u32,
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    ToolResultNotice {
        iteration: u32,
        call_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },
    /// An intermediate chunk from a streaming tool (§4.5), forwarded as the
    /// tool produces it rather than withheld until the call completes.
    ToolChunk {
        iteration: u32,
        call_id: String,
        tool_name: String,
        chunk: String,
    },
    Debug { iteration: u32, message: String },
    RateLimitWait { iteration: u32, wait_seconds: u64, attempt: u32 },
    ApprovalRequired { task_id: Uuid, tool_name: String, prompt: String },
    FinalStatus { task_id: Uuid, state: String },
    Cancelled { task_id: Uuid },
    Error { task_id: Uuid, message: String },
}
