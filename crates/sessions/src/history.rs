//! History Store (C2).
//!
//! Backs the reasoning loop's prior-turn context with three retrieval
//! modes (count-based, token-based, summarization-augmented) over an
//! append-only JSONL transcript per context, mirroring the write-path
//! trimming and summarization fallback the gateway's compaction pass used
//! on flat transcript lines, generalized here to operate on `Message`.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use parking_lot::RwLock;

use sa_domain::config::{RetrievalConfig, RetrievalStrategy};
use sa_domain::error::Result;
use sa_domain::tool::{Message, Role};

use crate::transcript::{TranscriptLine, TranscriptWriter};

/// Generates a condensed summary of a message span. Implemented by
/// whatever LLM provider the caller has resolved for the "summarizer"
/// role; kept as a trait so this crate has no direct dependency on
/// `sa-providers`.
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String>;
}

fn estimate_tokens(text: &str) -> u32 {
    ((text.chars().count() as u32) + 3) / 4
}

fn message_text(msg: &Message) -> String {
    msg.content.extract_all_text()
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "agent",
        Role::Tool => "tool",
    }
}

fn to_transcript_line(msg: &Message) -> TranscriptLine {
    let mut line = TranscriptWriter::line(role_str(msg.role), &message_text(msg));
    line.metadata = Some(serde_json::to_value(msg).unwrap_or(serde_json::Value::Null));
    line
}

fn from_transcript_line(line: &TranscriptLine) -> Option<Message> {
    line.metadata
        .as_ref()
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// The History Store: append-only per-context message log with bounded
/// in-memory indexing and three `recent()` retrieval modes.
pub struct HistoryStore {
    writer: TranscriptWriter,
    index: RwLock<HashMap<String, VecDeque<Message>>>,
}

impl HistoryStore {
    pub fn new(base_dir: &Path) -> Self {
        std::fs::create_dir_all(base_dir).ok();
        Self {
            writer: TranscriptWriter::new(base_dir),
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Load whatever transcript already exists for `context_id` into the
    /// in-memory index (used on first touch after a restart).
    fn ensure_loaded(&self, context_id: &str) {
        if self.index.read().contains_key(context_id) {
            return;
        }
        let lines = self.writer.read(context_id).unwrap_or_default();
        let messages: VecDeque<Message> = lines.iter().filter_map(from_transcript_line).collect();
        self.index
            .write()
            .entry(context_id.to_string())
            .or_insert(messages);
    }

    /// Append a message, persist it, and trim the in-memory index once its
    /// total estimated size exceeds `2 * token_budget` (write path, §4.2).
    pub fn add(&self, context_id: &str, message: Message, token_budget: u32) -> Result<()> {
        self.ensure_loaded(context_id);
        self.writer
            .append(context_id, &[to_transcript_line(&message)])?;

        let mut index = self.index.write();
        let entry = index.entry(context_id.to_string()).or_default();
        entry.push_back(message);

        let cap = token_budget.saturating_mul(2).max(1);
        loop {
            let total: u32 = entry.iter().map(|m| estimate_tokens(&message_text(m))).sum();
            if total <= cap || entry.len() <= 1 {
                break;
            }
            entry.pop_front();
        }
        Ok(())
    }

    /// Retrieve history for building the next context, per `cfg.strategy`.
    /// `SummaryBuffer` without a summarizer degrades to pure token-based
    /// selection (same fallback behavior as a failed summarization call).
    pub fn recent(&self, context_id: &str, cfg: &RetrievalConfig) -> Vec<Message> {
        self.ensure_loaded(context_id);
        let index = self.index.read();
        let Some(all) = index.get(context_id) else {
            return Vec::new();
        };

        match cfg.strategy {
            RetrievalStrategy::CountBuffer => {
                Self::tail(all, cfg.window_size)
            }
            RetrievalStrategy::TokenBudget | RetrievalStrategy::SummaryBuffer => {
                Self::token_budget_tail(all, cfg.budget, cfg.count_hint)
            }
        }
    }

    /// Summarization-augmented retrieval (§4.2): when a pure token-based
    /// cut would drop at least `summarize_threshold * budget` worth of
    /// history, summarize the dropped portion and prepend it as a single
    /// system message ahead of the retained recent messages.
    pub async fn recent_with_summarizer(
        &self,
        context_id: &str,
        cfg: &RetrievalConfig,
        summarizer: &dyn Summarizer,
    ) -> Vec<Message> {
        self.ensure_loaded(context_id);
        if cfg.strategy != RetrievalStrategy::SummaryBuffer {
            return self.recent(context_id, cfg);
        }

        let all: Vec<Message> = {
            let index = self.index.read();
            index.get(context_id).cloned().unwrap_or_default().into()
        };
        let kept = Self::token_budget_tail(&all.clone().into(), cfg.budget, cfg.count_hint);

        let dropped_tokens: u32 = all
            .iter()
            .take(all.len().saturating_sub(kept.len()))
            .map(|m| estimate_tokens(&message_text(m)))
            .sum();
        let threshold = (cfg.budget as f32 * cfg.summarize_threshold) as u32;
        if dropped_tokens < threshold {
            return kept;
        }

        let to_summarize = &all[..all.len().saturating_sub(kept.len())];
        match summarizer.summarize(to_summarize).await {
            Ok(summary) => {
                let mut out = vec![Message::system(format!("[summary of earlier conversation]\n{summary}"))];
                out.extend(kept);
                out
            }
            Err(_) => kept,
        }
    }

    fn tail(all: &VecDeque<Message>, window_size: usize) -> Vec<Message> {
        let skip = all.len().saturating_sub(window_size);
        all.iter().skip(skip).cloned().collect()
    }

    fn token_budget_tail(
        all: &VecDeque<Message>,
        budget: u32,
        count_hint: Option<usize>,
    ) -> Vec<Message> {
        let mut kept: Vec<Message> = Vec::new();
        let mut total = 0u32;
        for msg in all.iter().rev() {
            let cost = estimate_tokens(&message_text(msg));
            if total + cost > budget && !kept.is_empty() {
                break;
            }
            if let Some(hint) = count_hint {
                if kept.len() >= hint {
                    break;
                }
            }
            total += cost;
            kept.push(msg.clone());
        }
        kept.reverse();
        kept
    }

    /// Drop `context_id` from the in-memory index and delete its on-disk
    /// transcript, so a later `recent()` does not resurrect it via
    /// `ensure_loaded`.
    pub fn clear(&self, context_id: &str) {
        self.index.write().remove(context_id);
        let _ = self.writer.delete(context_id);
    }

    pub fn clear_all(&self) {
        let contexts: Vec<String> = self.index.read().keys().cloned().collect();
        self.index.write().clear();
        for context_id in contexts {
            let _ = self.writer.delete(&context_id);
        }
    }

    pub fn session_count(&self) -> usize {
        self.index.read().len()
    }
}
