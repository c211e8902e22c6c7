use crate::task::TaskState;

/// Shared error type used across all SerialAgent crates.
///
/// Variants above the separator are ambient (I/O, config, provider
/// transport); variants below are the runtime's own typed taxonomy,
/// each carrying the structured fields callers need to classify and
/// react to the failure rather than matching on message text.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),

    // ── Runtime taxonomy (spec §7) ──────────────────────────────────
    #[error("configuration invalid: {0}")]
    ConfigurationInvalid(String),

    #[error("illegal transition {from} -> {to} for task {task_id}")]
    TransitionIllegal {
        task_id: uuid::Uuid,
        from: TaskState,
        to: TaskState,
    },

    /// Transient model failure. Retryable by the reasoning loop's
    /// model-call retry policy (§4.7.1).
    #[error("model rate limited (status {status_code:?})")]
    ModelRateLimited {
        status_code: Option<u16>,
        retry_after: Option<std::time::Duration>,
    },

    /// Non-retryable model failure (auth, invalid request, content
    /// policy). Aborts the iteration and fails the task.
    #[error("model call failed fatally: {0}")]
    ModelFatal(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool {tool_name} execution error: {message}")]
    ToolExecutionError { tool_name: String, message: String },

    #[error("tool {tool_name} denied by user")]
    ToolDenied { tool_name: String },

    #[error("tool {tool_name} result truncated from {original_bytes} bytes")]
    ToolTruncated {
        tool_name: String,
        original_bytes: usize,
    },

    #[error("no checkpoint for task {task_id}")]
    CheckpointAbsent { task_id: uuid::Uuid },

    #[error("checkpoint for task {task_id} expired ({age_seconds}s old)")]
    CheckpointExpired { task_id: uuid::Uuid, age_seconds: u64 },

    #[error("checkpoint for task {task_id} is corrupt: {message}")]
    CheckpointCorrupt { task_id: uuid::Uuid, message: String },

    #[error("awaiter for task {task_id} timed out")]
    AwaiterTimeout { task_id: uuid::Uuid },

    #[error("awaiter for task {task_id} was cancelled")]
    AwaiterCancelled { task_id: uuid::Uuid },
}

impl Error {
    /// Whether this error's iteration may be retried by the reasoning
    /// loop's model-call retry policy. Only `ModelRateLimited` is
    /// retryable; every other model-adjacent failure is fatal (§4.7.1,
    /// §7 propagation policy).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ModelRateLimited { .. })
    }

    /// The wait duration before a retry, falling back to the spec's
    /// default of 120 seconds when the provider didn't advertise one.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            Error::ModelRateLimited { retry_after, .. } => {
                Some(retry_after.unwrap_or(std::time::Duration::from_secs(120)))
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
