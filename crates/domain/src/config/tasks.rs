use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task queue / runtime configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Task store and reasoning-loop concurrency settings.
///
/// Tasks bypass the existing `SessionLockMap` and use their own
/// semaphore-based concurrency control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Whether the task runtime is active at all.
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Storage backend for the Task Store.
    #[serde(default)]
    pub backend: TaskBackend,
    /// Maximum number of reasoning loops that may execute concurrently
    /// within a single agent. `0` means unbounded.
    #[serde(default = "default_worker_pool")]
    pub worker_pool: usize,
    /// Checkpoint/recovery settings.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: TaskBackend::default(),
            worker_pool: default_worker_pool(),
            checkpoint: CheckpointConfig::default(),
        }
    }
}

impl TaskConfig {
    /// Clamp `worker_pool` to a sane range, treating `0` as unbounded.
    pub fn clamped(&self) -> Self {
        Self {
            worker_pool: if self.worker_pool == 0 {
                0
            } else {
                self.worker_pool.clamp(1, 256)
            },
            ..self.clone()
        }
    }
}

fn default_worker_pool() -> usize {
    0
}

fn d_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskBackend {
    #[default]
    Memory,
    Sql,
}

/// Checkpoint persistence and crash-recovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Persist an `ExecutionState` checkpoint before each suspension point.
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            recovery: RecoveryConfig::default(),
        }
    }
}

/// Startup recovery behavior for tasks left WORKING/INPUT_REQUIRED by a
/// prior crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Resume reasoning loops from their last checkpoint on startup.
    #[serde(default = "d_true")]
    pub auto_resume: bool,
    /// Also resume tasks paused in INPUT_REQUIRED awaiting a HITL decision.
    #[serde(default)]
    pub auto_resume_hitl: bool,
    /// Checkpoints older than this many seconds are considered stale;
    /// the task fails instead of resuming.
    #[serde(default = "d_600")]
    pub resume_timeout_seconds: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            auto_resume: true,
            auto_resume_hitl: false,
            resume_timeout_seconds: d_600(),
        }
    }
}

fn d_600() -> u64 {
    600
}
