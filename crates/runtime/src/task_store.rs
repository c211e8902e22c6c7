//! Task Store (C1).
//!
//! In-memory backend: tasks guarded by a single read-write lock, and a
//! separate read-write lock over per-task subscriber lists so publishing
//! events never contends with the tasks map itself (§5 "Shared-resource
//! policy"). The relational backend named in §4.1 is out of scope for
//! this core — a SQL-backed `TaskStore` is a separate adapter that
//! satisfies the same contract against the same `Task`/`TaskEvent` types.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use sa_domain::error::{Error, Result};
use sa_domain::task::{Artifact, Task, TaskEvent, TaskState, TaskStatus};
use sa_domain::tool::Message;

/// Subscriptions live until the task reaches a terminal state, the
/// receiver is dropped, or this long has elapsed — whichever comes
/// first (§4.1 "preventing unbounded subscriber accumulation").
const SUBSCRIBER_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// Page size defaults per §4.1's relational-backend note, applied
/// uniformly so the in-memory and relational backends agree.
const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 100;

struct Subscriber {
    tx: mpsc::Sender<TaskEvent>,
    created_at: Instant,
}

/// In-memory Task Store: durable (for the process lifetime) mapping of
/// task id to task record, publishing `TaskEvent`s to subscribers.
pub struct TaskStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
    subscribers: RwLock<HashMap<Uuid, Vec<Subscriber>>>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Create a task for `context_id`, optionally seeded with the
    /// triggering user message. Assigns a fresh id, state SUBMITTED,
    /// and publishes `TaskCreated`.
    pub fn create(&self, context_id: impl Into<String>, initial_message: Option<Message>) -> Task {
        let mut task = Task::new(context_id);
        if let Some(msg) = initial_message {
            task.history.push(msg);
        }
        self.tasks.write().insert(task.id, task.clone());
        self.publish(task.id, TaskEvent::TaskCreated { task: task.clone() });
        task
    }

    pub fn get(&self, id: Uuid) -> Option<Task> {
        self.tasks.read().get(&id).cloned()
    }

    pub fn list_by_context(&self, context_id: &str) -> Vec<Task> {
        self.tasks
            .read()
            .values()
            .filter(|t| t.context_id == context_id)
            .cloned()
            .collect()
    }

    /// Validate and apply a state transition (I2/P2), bump the status
    /// timestamp, and publish a `StatusUpdate`. `final` is true iff the
    /// new state is terminal, at which point all subscribers for this
    /// task are dropped (B4, §4.1).
    pub fn update_status(
        &self,
        id: Uuid,
        new_state: TaskState,
        update_message: Option<Message>,
    ) -> Result<Task> {
        let updated = {
            let mut tasks = self.tasks.write();
            let task = tasks.get_mut(&id).ok_or_else(|| Error::Other(format!("no such task {id}")))?;

            let from = task.status.state;
            if !from.can_transition_to(new_state) {
                return Err(Error::TransitionIllegal { task_id: id, from, to: new_state });
            }

            task.status = match update_message.clone() {
                Some(msg) => TaskStatus::with_message(new_state, msg),
                None => TaskStatus::new(new_state),
            };
            task.clone()
        };

        let is_final = updated.status.state.is_terminal();
        self.publish(
            id,
            TaskEvent::StatusUpdate {
                task_id: id,
                status: updated.status.clone(),
                is_final,
            },
        );
        if is_final {
            self.subscribers.write().remove(&id);
        }
        Ok(updated)
    }

    /// Append a message to a task's history (I1: rejected on terminal tasks).
    pub fn add_message(&self, id: Uuid, msg: Message) -> Result<()> {
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(&id).ok_or_else(|| Error::Other(format!("no such task {id}")))?;
        if task.status.state.is_terminal() {
            return Err(Error::TransitionIllegal {
                task_id: id,
                from: task.status.state,
                to: task.status.state,
            });
        }
        task.history.push(msg);
        Ok(())
    }

    /// Append or update an artifact and publish an `ArtifactUpdate`.
    pub fn add_artifact(&self, id: Uuid, artifact: Artifact, append: bool, last_chunk: bool) -> Result<()> {
        {
            let mut tasks = self.tasks.write();
            let task = tasks.get_mut(&id).ok_or_else(|| Error::Other(format!("no such task {id}")))?;
            if task.status.state.is_terminal() {
                return Err(Error::TransitionIllegal {
                    task_id: id,
                    from: task.status.state,
                    to: task.status.state,
                });
            }
            match task.artifacts.iter_mut().find(|a| a.id == artifact.id) {
                Some(existing) if append => existing.parts.extend(artifact.parts.clone()),
                Some(existing) => *existing = artifact.clone(),
                None => task.artifacts.push(artifact.clone()),
            }
        }
        self.publish(id, TaskEvent::ArtifactUpdate { task_id: id, artifact, append, last_chunk });
        Ok(())
    }

    /// Cancel a task. A no-op (returns the task unchanged) if it's
    /// already terminal; otherwise transitions to CANCELLED.
    pub fn cancel(&self, id: Uuid) -> Result<Task> {
        let current = self.get(id).ok_or_else(|| Error::Other(format!("no such task {id}")))?;
        if current.status.state.is_terminal() {
            return Ok(current);
        }
        self.update_status(id, TaskState::Cancelled, None)
    }

    /// List tasks, optionally filtered by state, paginated.
    ///
    /// Page tokens are decimal string offsets (matching the source's
    /// relational-backend convention, §9 Open Questions) rather than
    /// opaque/cryptographic tokens — an implementer preference kept
    /// here rather than extended, since nothing in the spec calls for
    /// tamper-resistance of the token itself.
    pub fn list(
        &self,
        state_filter: Option<TaskState>,
        page_size: usize,
        page_token: Option<&str>,
    ) -> (Vec<Task>, Option<String>, usize) {
        let page_size = if page_size == 0 { DEFAULT_PAGE_SIZE } else { page_size.min(MAX_PAGE_SIZE) };
        let offset: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);

        let mut all: Vec<Task> = self
            .tasks
            .read()
            .values()
            .filter(|t| state_filter.map_or(true, |s| t.status.state == s))
            .cloned()
            .collect();
        all.sort_by_key(|t| t.status.timestamp);

        let total = all.len();
        let page: Vec<Task> = all.into_iter().skip(offset).take(page_size).collect();
        let next = if offset + page.len() < total {
            Some((offset + page.len()).to_string())
        } else {
            None
        };
        (page, next, total)
    }

    /// Subscribe to a task's event stream. If the task is already
    /// terminal, the channel receives one snapshot event and is
    /// immediately closed (B4).
    pub fn subscribe(&self, id: Uuid) -> mpsc::Receiver<TaskEvent> {
        let (tx, rx) = mpsc::channel(100);
        match self.get(id) {
            Some(task) if task.status.state.is_terminal() => {
                let _ = tx.try_send(TaskEvent::StatusUpdate {
                    task_id: id,
                    status: task.status.clone(),
                    is_final: true,
                });
            }
            Some(_) => {
                self.subscribers
                    .write()
                    .entry(id)
                    .or_default()
                    .push(Subscriber { tx, created_at: Instant::now() });
            }
            None => {}
        }
        rx
    }

    /// Drop every subscriber across every task (shutdown).
    pub fn close(&self) {
        self.subscribers.write().clear();
    }

    /// Best-effort, non-blocking publish: slow subscribers may miss
    /// events (§5); subscribers past their max age are pruned first.
    fn publish(&self, id: Uuid, event: TaskEvent) {
        let mut subs = self.subscribers.write();
        if let Some(list) = subs.get_mut(&id) {
            list.retain(|s| s.created_at.elapsed() < SUBSCRIBER_MAX_AGE);
            for sub in list.iter() {
                let _ = sub.tx.try_send(event.clone());
            }
        }
    }
}
