use crate::tool::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task state machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The lifecycle state of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    AuthRequired,
    Completed,
    Failed,
    Cancelled,
    Rejected,
}

impl TaskState {
    /// Terminal states never transition again; a task store must reject
    /// any mutation attempt once a task reaches one of these.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled | TaskState::Rejected
        )
    }

    /// Whether `self -> next` is a legal transition per the state table.
    /// A same-state "transition" is always legal (idempotent write).
    pub fn can_transition_to(self, next: TaskState) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        use TaskState::*;
        matches!(
            (self, next),
            (Submitted, Working)
                | (Submitted, AuthRequired)
                | (Submitted, Rejected)
                | (Working, InputRequired)
                | (Working, Completed)
                | (Working, Failed)
                | (Working, Cancelled)
                | (Working, Rejected)
                | (InputRequired, Working)
                | (InputRequired, Failed)
                | (InputRequired, Cancelled)
                | (AuthRequired, Working)
                | (AuthRequired, Cancelled)
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Submitted => "submitted",
            TaskState::Working => "working",
            TaskState::InputRequired => "input_required",
            TaskState::AuthRequired => "auth_required",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
            TaskState::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// A timestamped status with an optional human-readable update message
/// (e.g. the Approval Gate's rendered prompt when pausing into
/// `InputRequired`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub update_message: Option<Message>,
}

impl TaskStatus {
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            timestamp: Utc::now(),
            update_message: None,
        }
    }

    pub fn with_message(state: TaskState, update_message: Message) -> Self {
        Self {
            state,
            timestamp: Utc::now(),
            update_message: Some(update_message),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Artifacts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Output produced by a task — a file, a structured result, a generated
/// document — distinct from the conversational history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub parts: Vec<crate::tool::ContentPart>,
    /// `true` once the artifact is done being appended to (relevant for
    /// streaming artifact updates, see `ArtifactUpdate::last_chunk`).
    #[serde(default)]
    pub complete: bool,
}

impl Artifact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: Some(name.into()),
            parts: Vec::new(),
            complete: false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The durable record of one reasoning-loop invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Identifies the session/conversation this task belongs to; the
    /// History Store (C2) and the Context Builder (C4) scope by this id.
    pub context_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl Task {
    /// A fresh task always starts `SUBMITTED` with an empty history and
    /// no artifacts (§4.1 "create").
    pub fn new(context_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            context_id: context_id.into(),
            status: TaskStatus::new(TaskState::Submitted),
            history: Vec::new(),
            artifacts: Vec::new(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound events (§6)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events published by the Task Store's subscriber stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    TaskCreated {
        task: Task,
    },
    StatusUpdate {
        task_id: Uuid,
        status: TaskStatus,
        /// `true` only for terminal-state updates; subscribers close
        /// their stream after receiving one with `final = true`.
        #[serde(rename = "final")]
        is_final: bool,
    },
    ArtifactUpdate {
        task_id: Uuid,
        artifact: Artifact,
        append: bool,
        last_chunk: bool,
    },
}
