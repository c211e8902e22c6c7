//! Embedded checkpoint storage (C3's storage location).
//!
//! `spec.md` requires the `ExecutionState` checkpoint be stored "embedded
//! in the session store under a key derived from (session_id, task_id)",
//! with clearing a session removing its checkpoints transitively. This
//! crate doesn't need to know the shape of `ExecutionState` — it stores
//! whatever JSON blob `sa_runtime::checkpoint` hands it, keyed by the pair.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use sa_domain::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCheckpoint {
    session_id: String,
    task_id: String,
    written_at: DateTime<Utc>,
    state: serde_json::Value,
}

/// Durable, JSON-file-backed checkpoint store keyed by `(session_id, task_id)`.
pub struct CheckpointStore {
    path: PathBuf,
    entries: RwLock<HashMap<(String, String), StoredCheckpoint>>,
}

impl CheckpointStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("checkpoints");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;
        let path = dir.join("checkpoints.json");

        let raw: Vec<StoredCheckpoint> = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&text).unwrap_or_default()
        } else {
            Vec::new()
        };

        let entries = raw
            .into_iter()
            .map(|c| ((c.session_id.clone(), c.task_id.clone()), c))
            .collect();

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Persist a checkpoint, overwriting any existing one for this key.
    pub fn store(&self, session_id: &str, task_id: &str, state: serde_json::Value) -> Result<()> {
        let entry = StoredCheckpoint {
            session_id: session_id.to_owned(),
            task_id: task_id.to_owned(),
            written_at: Utc::now(),
            state,
        };
        self.entries
            .write()
            .insert((session_id.to_owned(), task_id.to_owned()), entry);
        self.flush()
    }

    /// Load a checkpoint's raw JSON and the time it was written, if present.
    pub fn load(&self, session_id: &str, task_id: &str) -> Option<(serde_json::Value, DateTime<Utc>)> {
        self.entries
            .read()
            .get(&(session_id.to_owned(), task_id.to_owned()))
            .map(|c| (c.state.clone(), c.written_at))
    }

    /// Drop a checkpoint once its task reaches a terminal state or resumes
    /// past the point it was taken for.
    pub fn remove(&self, session_id: &str, task_id: &str) -> Result<()> {
        self.entries
            .write()
            .remove(&(session_id.to_owned(), task_id.to_owned()));
        self.flush()
    }

    /// Remove every checkpoint for a session — clearing a session removes
    /// its checkpoints transitively (§6).
    pub fn clear_session(&self, session_id: &str) -> Result<()> {
        self.entries.write().retain(|(sid, _), _| sid != session_id);
        self.flush()
    }

    /// All checkpoints, for the startup recovery scan (C9).
    pub fn list_all(&self) -> Vec<(String, String, serde_json::Value, DateTime<Utc>)> {
        self.entries
            .read()
            .values()
            .map(|c| {
                (
                    c.session_id.clone(),
                    c.task_id.clone(),
                    c.state.clone(),
                    c.written_at,
                )
            })
            .collect()
    }

    fn flush(&self) -> Result<()> {
        let entries = self.entries.read();
        let values: Vec<&StoredCheckpoint> = entries.values().collect();
        let json = serde_json::to_string_pretty(&values)
            .map_err(|e| Error::Other(format!("serializing checkpoints: {e}")))?;
        std::fs::write(&self.path, json).map_err(Error::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_load_roundtrips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path()).unwrap();
        store
            .store("sess-1", "task-1", serde_json::json!({"iteration": 3}))
            .unwrap();
        let (state, _) = store.load("sess-1", "task-1").unwrap();
        assert_eq!(state["iteration"], 3);
    }

    #[test]
    fn missing_checkpoint_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path()).unwrap();
        assert!(store.load("sess-1", "task-1").is_none());
    }

    #[test]
    fn clearing_session_removes_all_its_checkpoints() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path()).unwrap();
        store.store("sess-1", "task-1", serde_json::json!({})).unwrap();
        store.store("sess-1", "task-2", serde_json::json!({})).unwrap();
        store.store("sess-2", "task-3", serde_json::json!({})).unwrap();

        store.clear_session("sess-1").unwrap();

        assert!(store.load("sess-1", "task-1").is_none());
        assert!(store.load("sess-1", "task-2").is_none());
        assert!(store.load("sess-2", "task-3").is_some());
    }

    #[test]
    fn persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = CheckpointStore::new(tmp.path()).unwrap();
            store.store("sess-1", "task-1", serde_json::json!({"x": 1})).unwrap();
        }
        let reopened = CheckpointStore::new(tmp.path()).unwrap();
        assert!(reopened.load("sess-1", "task-1").is_some());
    }

    #[test]
    fn list_all_returns_every_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path()).unwrap();
        store.store("a", "1", serde_json::json!({})).unwrap();
        store.store("b", "2", serde_json::json!({})).unwrap();
        assert_eq!(store.list_all().len(), 2);
    }
}
