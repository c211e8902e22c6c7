//! Task Lifecycle Manager (C8).
//!
//! Owns the two pieces of in-memory coordination state the reasoning
//! loop cannot own itself: the active-executions map (I3 — at most one
//! loop per task id) and the per-task "awaiter" that a paused loop
//! blocks on while a task sits in `InputRequired`. Transition legality
//! is delegated to `TaskState::can_transition_to`; this module adds the
//! pause/resume/timeout choreography around it (§4.8).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use sa_domain::error::{Error, Result};
use sa_domain::task::TaskState;
use sa_domain::tool::Message;

use crate::task_store::TaskStore;

const DEFAULT_RESUME_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Per-task-id registry of cancel handles. Enforces I3: `try_start`
/// refuses a second concurrent loop for a task already present.
#[derive(Default)]
pub struct ActiveExecutions {
    inner: RwLock<HashMap<Uuid, CancellationToken>>,
}

impl ActiveExecutions {
    pub fn try_start(&self, task_id: Uuid) -> Option<CancellationToken> {
        let mut map = self.inner.write();
        if map.contains_key(&task_id) {
            return None;
        }
        let token = CancellationToken::new();
        map.insert(task_id, token.clone());
        Some(token)
    }

    pub fn finish(&self, task_id: Uuid) {
        self.inner.write().remove(&task_id);
    }

    /// Cancel a running loop; `false` if no loop is active for this task.
    pub fn cancel(&self, task_id: Uuid) -> bool {
        match self.inner.read().get(&task_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, task_id: Uuid) -> bool {
        self.inner.read().contains_key(&task_id)
    }

    pub fn count(&self) -> usize {
        self.inner.read().len()
    }
}

/// Per-task one-shot handoff for the message that resolves a pending
/// `InputRequired` pause.
#[derive(Default)]
pub struct AwaiterRegistry {
    inner: RwLock<HashMap<Uuid, oneshot::Sender<Message>>>,
}

impl AwaiterRegistry {
    fn open(&self, task_id: Uuid) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        self.inner.write().insert(task_id, tx);
        rx
    }

    /// Deliver the resume message. `false` if no awaiter is open (task
    /// isn't paused, or already timed out).
    fn resolve(&self, task_id: Uuid, message: Message) -> bool {
        match self.inner.write().remove(&task_id) {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    fn close(&self, task_id: Uuid) {
        self.inner.write().remove(&task_id);
    }

    fn is_open(&self, task_id: Uuid) -> bool {
        self.inner.read().contains_key(&task_id)
    }
}

/// Coordinates pause/resume/timeout around the Task Store's transition
/// table (§4.8).
pub struct LifecycleManager {
    pub task_store: Arc<TaskStore>,
    pub active: Arc<ActiveExecutions>,
    awaiters: Arc<AwaiterRegistry>,
    resume_timeout: Duration,
}

impl LifecycleManager {
    pub fn new(task_store: Arc<TaskStore>) -> Self {
        Self {
            task_store,
            active: Arc::new(ActiveExecutions::default()),
            awaiters: Arc::new(AwaiterRegistry::default()),
            resume_timeout: DEFAULT_RESUME_TIMEOUT,
        }
    }

    pub fn with_resume_timeout(mut self, timeout: Duration) -> Self {
        self.resume_timeout = timeout;
        self
    }

    /// Claim the active-execution slot for `task_id` (I3). `None` means a
    /// loop is already running — starting a resume on it is a no-op.
    pub fn claim(&self, task_id: Uuid) -> Option<CancellationToken> {
        self.active.try_start(task_id)
    }

    /// Release the active-execution slot and any still-open awaiter once
    /// a loop invocation has ended (terminal state or suspended cleanly).
    pub fn release(&self, task_id: Uuid) {
        self.active.finish(task_id);
    }

    /// Pause: persist the INPUT_REQUIRED transition with the gate's
    /// interaction message as `update`, open an awaiter, and arm a
    /// timeout that fails the task if nothing arrives in time.
    pub fn pause(&self, task_id: Uuid, message: Message) -> Result<oneshot::Receiver<Message>> {
        self.task_store.update_status(task_id, TaskState::InputRequired, Some(message))?;
        let rx = self.awaiters.open(task_id);

        let awaiters = self.awaiters.clone();
        let task_store = self.task_store.clone();
        let timeout = self.resume_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if awaiters.is_open(task_id) {
                awaiters.close(task_id);
                let _ = task_store.update_status(
                    task_id,
                    TaskState::Failed,
                    Some(Message::system("timed out waiting for user input")),
                );
            }
        });

        Ok(rx)
    }

    /// Resume: deliver the inbound message to the paused loop and move
    /// the task back to WORKING. Errors if no awaiter is open (task
    /// isn't paused, or the resume window already expired).
    pub fn resume(&self, task_id: Uuid, message: Message) -> Result<()> {
        if !self.awaiters.resolve(task_id, message) {
            return Err(Error::AwaiterTimeout { task_id });
        }
        self.task_store.update_status(task_id, TaskState::Working, None)?;
        Ok(())
    }

    pub fn cancel(&self, task_id: Uuid) -> bool {
        self.awaiters.close(task_id);
        self.active.cancel(task_id)
    }
}
