//! Recovery (C9).
//!
//! Run once at startup: scan every task left in WORKING or
//! INPUT_REQUIRED by a prior crash and either resume its reasoning loop
//! from the last checkpoint or mark it FAILED (§4.9). Resumption
//! reuses the same `spawn_resume` entrypoint the inline HITL resume
//! path uses, so I3 (at most one loop per task id) holds uniformly.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use sa_domain::task::{Task, TaskState};
use sa_domain::tool::Message;

use crate::checkpoint::CheckpointCodec;
use crate::lifecycle::LifecycleManager;
use crate::reasoning_loop::{spawn_resume, RuntimeServices, Strategy};
use crate::task_store::TaskStore;

/// What happened to one task during a recovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Resumed,
    Failed(String),
    LeftUntouched,
}

/// Scan all WORKING/INPUT_REQUIRED tasks and resume or fail each per
/// §4.9. `auto_resume_hitl` controls whether INPUT_REQUIRED tasks are
/// resumed (re-pausing immediately since no decision is stored) or
/// left alone; `recovery_timeout` bounds checkpoint staleness.
pub async fn recover_all(
    task_store: Arc<TaskStore>,
    lifecycle: Arc<LifecycleManager>,
    services: Arc<RuntimeServices>,
    strategy_factory: impl Fn() -> Arc<dyn Strategy>,
    auto_resume_hitl: bool,
    recovery_timeout: Duration,
) -> Vec<(Uuid, RecoveryOutcome)> {
    let mut candidates = Vec::new();
    let mut page_token: Option<String> = None;
    loop {
        let (page, next, _total) = task_store.list(None, 100, page_token.as_deref());
        candidates.extend(page.into_iter().filter(|t| matches!(t.status.state, TaskState::Working | TaskState::InputRequired)));
        match next {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    let codec = CheckpointCodec::new(&services.checkpoints);
    let mut results = Vec::with_capacity(candidates.len());

    for task in candidates {
        let outcome = recover_one(&task, &codec, &task_store, &lifecycle, &services, &strategy_factory, auto_resume_hitl, recovery_timeout).await;
        results.push((task.id, outcome));
    }

    results
}

async fn recover_one(
    task: &Task,
    codec: &CheckpointCodec<'_>,
    task_store: &Arc<TaskStore>,
    lifecycle: &Arc<LifecycleManager>,
    services: &Arc<RuntimeServices>,
    strategy_factory: &impl Fn() -> Arc<dyn Strategy>,
    auto_resume_hitl: bool,
    recovery_timeout: Duration,
) -> RecoveryOutcome {
    if task.status.state == TaskState::InputRequired && !auto_resume_hitl {
        return RecoveryOutcome::LeftUntouched;
    }

    let checkpoint = match codec.read(&task.context_id, task.id) {
        Ok(cp) => cp,
        Err(e) => {
            let _ = task_store.update_status(task.id, TaskState::Failed, Some(Message::system(format!("checkpoint corrupt: {e}"))));
            return RecoveryOutcome::Failed(format!("checkpoint corrupt: {e}"));
        }
    };

    let Some((state, written_at)) = checkpoint else {
        // WORKING with no checkpoint at all means the crash happened
        // before the first checkpoint write — no state to resume from.
        let _ = task_store.update_status(task.id, TaskState::Failed, Some(Message::system("no checkpoint found after restart")));
        return RecoveryOutcome::Failed("no checkpoint".to_string());
    };

    let age = Utc::now().signed_duration_since(written_at).to_std().unwrap_or(Duration::ZERO);
    if age > recovery_timeout {
        let _ = task_store.update_status(task.id, TaskState::Failed, Some(Message::system("checkpoint expired before recovery")));
        return RecoveryOutcome::Failed("checkpoint expired".to_string());
    }

    match spawn_resume(lifecycle.clone(), services.clone(), strategy_factory(), state, None).await {
        Some(_) => RecoveryOutcome::Resumed,
        None => RecoveryOutcome::LeftUntouched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};

    use async_trait::async_trait;
    use sa_domain::capability::LlmCapabilities;
    use sa_domain::config::RetrievalConfig;
    use sa_domain::error::{Error, Result};
    use sa_providers::traits::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};
    use sa_sessions::{CheckpointStore, HistoryStore};
    use tokio::sync::Mutex as AsyncMutex;

    use crate::checkpoint::ExecutionState;
    use crate::reasoning_loop::DefaultStrategy;
    use crate::tool_executor::{ToolExecutor, ToolRegistry};

    struct StubProvider {
        responses: AsyncMutex<VecDeque<Result<ChatResponse>>>,
        caps: LlmCapabilities,
    }
    impl StubProvider {
        fn new(responses: Vec<Result<ChatResponse>>) -> Self {
            Self { responses: AsyncMutex::new(responses.into_iter().collect()), caps: LlmCapabilities::default() }
        }
    }
    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            self.responses.lock().await.pop_front().expect("no more scripted responses")
        }
        async fn chat_stream(&self, _req: ChatRequest) -> Result<sa_domain::stream::BoxStream<'static, Result<sa_domain::stream::StreamEvent>>> {
            Err(Error::Other("unused".into()))
        }
        async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
            Err(Error::Other("unused".into()))
        }
        fn capabilities(&self) -> &LlmCapabilities {
            &self.caps
        }
        fn provider_id(&self) -> &str {
            "stub"
        }
    }

    fn services(model: Arc<dyn LlmProvider>, dir: &std::path::Path) -> Arc<RuntimeServices> {
        Arc::new(RuntimeServices {
            task_store: Arc::new(TaskStore::new()),
            history: Arc::new(HistoryStore::new(dir)),
            checkpoints: Arc::new(CheckpointStore::new(dir).unwrap()),
            tool_executor: Arc::new(ToolExecutor::new(ToolRegistry::new())),
            tool_policy: HashMap::new(),
            model,
            retrieval: RetrievalConfig::default(),
        })
    }

    #[tokio::test]
    async fn working_task_with_no_checkpoint_is_marked_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let services = services(Arc::new(StubProvider::new(vec![])), tmp.path());
        let task = services.task_store.create("ctx-1", None);
        services.task_store.update_status(task.id, TaskState::Working, None).unwrap();

        let lifecycle = Arc::new(LifecycleManager::new(services.task_store.clone()));
        let results = recover_all(
            services.task_store.clone(),
            lifecycle,
            services.clone(),
            || Arc::new(DefaultStrategy) as Arc<dyn Strategy>,
            false,
            Duration::from_secs(600),
        )
        .await;

        assert_eq!(results, vec![(task.id, RecoveryOutcome::Failed("no checkpoint".to_string()))]);
        assert_eq!(services.task_store.get(task.id).unwrap().status.state, TaskState::Failed);
    }

    #[tokio::test]
    async fn working_task_with_fresh_checkpoint_resumes_and_completes() {
        let tmp = tempfile::tempdir().unwrap();
        let services = services(Arc::new(StubProvider::new(vec![Ok(ChatResponse {
            content: "done".into(),
            tool_calls: vec![],
            usage: None,
            model: "stub".into(),
            finish_reason: Some("stop".into()),
        })])), tmp.path());

        let task = services.task_store.create("ctx-1", Some(Message::user("hello")));
        services.task_store.update_status(task.id, TaskState::Working, None).unwrap();
        let state = ExecutionState::new(task.id, "ctx-1", "hello");
        let codec = CheckpointCodec::new(&services.checkpoints);
        codec.write("ctx-1", &state).unwrap();

        let lifecycle = Arc::new(LifecycleManager::new(services.task_store.clone()));
        let results = recover_all(
            services.task_store.clone(),
            lifecycle,
            services.clone(),
            || Arc::new(DefaultStrategy) as Arc<dyn Strategy>,
            false,
            Duration::from_secs(600),
        )
        .await;

        assert_eq!(results, vec![(task.id, RecoveryOutcome::Resumed)]);
        // Give the spawned resume loop a chance to run to completion.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(services.task_store.get(task.id).unwrap().status.state, TaskState::Completed);
    }

    #[tokio::test]
    async fn input_required_is_left_untouched_when_auto_resume_hitl_disabled() {
        let tmp = tempfile::tempdir().unwrap();
        let services = services(Arc::new(StubProvider::new(vec![])), tmp.path());
        let task = services.task_store.create("ctx-1", None);
        services.task_store.update_status(task.id, TaskState::Working, None).unwrap();
        services.task_store.update_status(task.id, TaskState::InputRequired, None).unwrap();

        let lifecycle = Arc::new(LifecycleManager::new(services.task_store.clone()));
        let results = recover_all(
            services.task_store.clone(),
            lifecycle,
            services.clone(),
            || Arc::new(DefaultStrategy) as Arc<dyn Strategy>,
            false,
            Duration::from_secs(600),
        )
        .await;

        assert_eq!(results, vec![(task.id, RecoveryOutcome::LeftUntouched)]);
        assert_eq!(services.task_store.get(task.id).unwrap().status.state, TaskState::InputRequired);
    }

    #[tokio::test]
    async fn stale_checkpoint_beyond_timeout_is_marked_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let services = services(Arc::new(StubProvider::new(vec![])), tmp.path());
        let task = services.task_store.create("ctx-1", None);
        services.task_store.update_status(task.id, TaskState::Working, None).unwrap();
        let state = ExecutionState::new(task.id, "ctx-1", "hello");
        let codec = CheckpointCodec::new(&services.checkpoints);
        codec.write("ctx-1", &state).unwrap();

        let lifecycle = Arc::new(LifecycleManager::new(services.task_store.clone()));
        let results = recover_all(
            services.task_store.clone(),
            lifecycle,
            services.clone(),
            || Arc::new(DefaultStrategy) as Arc<dyn Strategy>,
            false,
            Duration::ZERO,
        )
        .await;

        assert_eq!(results, vec![(task.id, RecoveryOutcome::Failed("checkpoint expired".to_string()))]);
    }
}
