use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session/History Store configuration.
///
/// A context identifier is either a bare session id or `"{agent}:{session}"`
/// (§6) — this crate does not interpret it further; scoping by channel,
/// account, or peer is a transport-layer concern outside the runtime core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Unique ID for this agent instance, used as the default prefix when
    /// a bare session id is supplied.
    #[serde(default = "d_agent_id")]
    pub agent_id: String,
    /// How `recent()` selects history to include in the built context.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            agent_id: d_agent_id(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

/// History Store retrieval mode (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    CountBuffer,
    #[default]
    TokenBudget,
    SummaryBuffer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub strategy: RetrievalStrategy,
    /// Used by `count_buffer`: number of most recent messages to keep.
    #[serde(default = "d_window_size")]
    pub window_size: usize,
    /// Used by `token_budget`/`summary_buffer`: token budget for history.
    #[serde(default = "d_budget")]
    pub budget: u32,
    /// Fraction of `budget` that, if a pure token-based cut would drop,
    /// triggers summarization-augmented retrieval instead.
    #[serde(default = "d_threshold")]
    pub summarize_threshold: f32,
    /// Optional message-count hint intersected with the token budget.
    #[serde(default)]
    pub count_hint: Option<usize>,
    #[serde(default)]
    pub long_term_enabled: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: RetrievalStrategy::default(),
            window_size: d_window_size(),
            budget: d_budget(),
            summarize_threshold: d_threshold(),
            count_hint: None,
            long_term_enabled: false,
        }
    }
}

fn d_agent_id() -> String {
    "serial-agent".into()
}
fn d_window_size() -> usize {
    20
}
fn d_budget() -> u32 {
    8_000
}
fn d_threshold() -> f32 {
    0.8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_strategy_is_token_budget() {
        assert_eq!(RetrievalConfig::default().strategy, RetrievalStrategy::TokenBudget);
    }

    #[test]
    fn deserialize_missing_uses_defaults() {
        let cfg: SessionsConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.retrieval.budget, 8_000);
    }
}
