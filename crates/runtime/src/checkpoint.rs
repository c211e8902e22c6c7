//! Execution-State Codec (C3).
//!
//! `ExecutionState` is the reasoning snapshot checkpointed between
//! iterations. The codec is JSON with explicit field types so it
//! round-trips empty/nil `pending_tool_call` and a zero `iteration`
//! (R1). Storage is delegated to `sa_sessions::CheckpointStore`, which
//! stores the encoded JSON opaquely under `(session_id, task_id)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sa_domain::error::{Error, Result};
use sa_domain::tool::ToolCall;
use sa_sessions::CheckpointStore;

/// Phase within one reasoning-loop iteration, recorded so recovery knows
/// exactly where execution was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    BuildingMessages,
    AwaitingModel,
    ExecutingTools,
    AwaitingApproval,
}

/// A reasoning snapshot: iteration, accumulated text, pending tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub task_id: Uuid,
    pub context_id: String,
    pub query: String,
    #[serde(default)]
    pub iteration: u32,
    #[serde(default)]
    pub accumulated_response: String,
    #[serde(default)]
    pub pending_tool_call: Option<ToolCall>,
    pub phase: Phase,
    pub checkpoint_time: DateTime<Utc>,
}

impl ExecutionState {
    pub fn new(task_id: Uuid, context_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            task_id,
            context_id: context_id.into(),
            query: query.into(),
            iteration: 0,
            accumulated_response: String::new(),
            pending_tool_call: None,
            phase: Phase::BuildingMessages,
            checkpoint_time: Utc::now(),
        }
    }

    pub fn encode(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(Error::Json)
    }

    pub fn decode(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(Error::Json)
    }
}

/// Thin wrapper over `sa_sessions::CheckpointStore` that encodes/decodes
/// `ExecutionState` at the boundary, keeping the storage layer ignorant
/// of this crate's types.
pub struct CheckpointCodec<'a> {
    store: &'a CheckpointStore,
}

impl<'a> CheckpointCodec<'a> {
    pub fn new(store: &'a CheckpointStore) -> Self {
        Self { store }
    }

    pub fn write(&self, session_id: &str, state: &ExecutionState) -> Result<()> {
        let mut state = state.clone();
        state.checkpoint_time = Utc::now();
        self.store.store(session_id, &state.task_id.to_string(), state.encode()?)
    }

    pub fn read(&self, session_id: &str, task_id: Uuid) -> Result<Option<(ExecutionState, DateTime<Utc>)>> {
        match self.store.load(session_id, &task_id.to_string()) {
            Some((value, written_at)) => Ok(Some((ExecutionState::decode(value)?, written_at))),
            None => Ok(None),
        }
    }

    pub fn remove(&self, session_id: &str, task_id: Uuid) -> Result<()> {
        self.store.remove(session_id, &task_id.to_string())
    }

    /// All checkpoints across all sessions, decoded, for the recovery scan (C9).
    pub fn list_all(&self) -> Vec<(String, ExecutionState, DateTime<Utc>)> {
        self.store
            .list_all()
            .into_iter()
            .filter_map(|(session_id, _task_id, value, written_at)| {
                ExecutionState::decode(value).ok().map(|state| (session_id, state, written_at))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_empty_pending_call_and_zero_iteration() {
        let state = ExecutionState::new(Uuid::new_v4(), "ctx-1", "2+2");
        let encoded = state.encode().unwrap();
        let decoded = ExecutionState::decode(encoded).unwrap();
        assert_eq!(decoded.iteration, 0);
        assert!(decoded.pending_tool_call.is_none());
        assert_eq!(decoded.query, "2+2");
    }

    #[test]
    fn round_trips_populated_pending_call() {
        let mut state = ExecutionState::new(Uuid::new_v4(), "ctx-1", "list files");
        state.iteration = 2;
        state.accumulated_response = "partial".into();
        state.pending_tool_call = Some(ToolCall {
            call_id: "c1".into(),
            tool_name: "ls".into(),
            arguments: serde_json::json!({}),
        });
        state.phase = Phase::ExecutingTools;

        let decoded = ExecutionState::decode(state.encode().unwrap()).unwrap();
        assert_eq!(decoded.iteration, 2);
        assert_eq!(decoded.pending_tool_call.unwrap().tool_name, "ls");
        assert_eq!(decoded.phase, Phase::ExecutingTools);
    }

    #[test]
    fn write_then_read_through_checkpoint_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path()).unwrap();
        let codec = CheckpointCodec::new(&store);

        let task_id = Uuid::new_v4();
        let state = ExecutionState::new(task_id, "ctx-1", "hello");
        codec.write("sess-1", &state).unwrap();

        let (read_back, _) = codec.read("sess-1", task_id).unwrap().unwrap();
        assert_eq!(read_back.task_id, task_id);
    }

    #[test]
    fn remove_deletes_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path()).unwrap();
        let codec = CheckpointCodec::new(&store);
        let task_id = Uuid::new_v4();
        codec.write("sess-1", &ExecutionState::new(task_id, "ctx-1", "x")).unwrap();
        codec.remove("sess-1", task_id).unwrap();
        assert!(codec.read("sess-1", task_id).unwrap().is_none());
    }
}
