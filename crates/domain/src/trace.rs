use serde::Serialize;

/// Structured trace events emitted across all SerialAgent crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    TaskTransition {
        task_id: String,
        from: String,
        to: String,
    },
    ApprovalDecided {
        task_id: String,
        tool_name: String,
        approved: bool,
    },
    CheckpointWritten {
        task_id: String,
        iteration: u32,
    },
    CheckpointRecovered {
        task_id: String,
        iteration: u32,
    },
    LlmRequest {
        provider: String,
        model: String,
        role: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    LlmFallback {
        from_provider: String,
        from_model: String,
        to_provider: String,
        to_model: String,
        reason: String,
    },
    TranscriptAppend {
        session_id: String,
        lines: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sa_event");
    }
}
