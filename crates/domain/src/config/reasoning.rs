use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reasoning loop configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How a tool call result is surfaced to the end user while the
/// reasoning loop is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolDisplayMode {
    #[default]
    Inline,
    Detailed,
    Thinking,
    Hidden,
}

/// Configuration for the reasoning loop (C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Upper bound on model-call iterations per task. `0` fails the task
    /// immediately with no model calls (see B1).
    #[serde(default = "d_max_iterations")]
    pub max_iterations: u32,
    /// Identifies which reasoning strategy implementation to resolve.
    #[serde(default = "d_engine_name")]
    pub engine_name: String,
    /// Stream partial text as it's produced instead of pushing the whole
    /// response on completion.
    #[serde(default)]
    pub enable_streaming: Option<bool>,
    #[serde(default)]
    pub enable_completion_verification: bool,
    #[serde(default)]
    pub enable_self_reflection: bool,
    #[serde(default)]
    pub show_debug_info: bool,
    #[serde(default = "d_true")]
    pub show_tool_execution: bool,
    #[serde(default)]
    pub tool_display_mode: ToolDisplayMode,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            max_iterations: d_max_iterations(),
            engine_name: d_engine_name(),
            enable_streaming: None,
            enable_completion_verification: false,
            enable_self_reflection: false,
            show_debug_info: false,
            show_tool_execution: true,
            tool_display_mode: ToolDisplayMode::default(),
        }
    }
}

fn d_max_iterations() -> u32 {
    5
}
fn d_engine_name() -> String {
    "default".into()
}
fn d_true() -> bool {
    true
}

/// Human-in-the-loop approval behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HitlMode {
    /// Approve anything not explicitly denied without pausing the loop.
    Auto,
    /// Pause into INPUT_REQUIRED and wait for a decision (default).
    #[default]
    Blocking,
    /// Pause, but allow the caller to poll asynchronously instead of
    /// blocking a worker slot on the awaiter.
    Async,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HitlConfig {
    #[serde(default)]
    pub mode: HitlMode,
}
