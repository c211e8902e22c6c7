//! Approval Gate (C6).
//!
//! Classifies each proposed tool call as approved, denied, or
//! needs-input, and produces the synthesized approval-request message
//! when the scan must pause. Decision storage is two-level (§9): a
//! durable, single-use `DecisionStore` keyed by task id for decisions
//! that arrive via a resumed INPUT_REQUIRED task, consulted by the
//! caller before invoking `evaluate`.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use sa_domain::config::ToolConfig;
use sa_domain::tool::{ContentPart, Message, MessageContent, ToolCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Deny,
}

#[derive(Debug, Clone)]
pub struct UserDecision {
    pub decision: Decision,
    pub tool_call_id: Option<String>,
    pub tool_name: Option<String>,
}

/// Parse a resume message into a decision (§6). A structured `data` part
/// with `type = "tool_approval"` is authoritative; otherwise a bare text
/// message is matched case-insensitively, defaulting to deny.
pub fn parse_decision(msg: &Message) -> UserDecision {
    if let MessageContent::Parts(parts) = &msg.content {
        for part in parts {
            if let ContentPart::Data { data } = part {
                if data.get("type").and_then(|v| v.as_str()) == Some("tool_approval") {
                    let decision = match data.get("decision").and_then(|v| v.as_str()) {
                        Some("approve") => Decision::Approve,
                        _ => Decision::Deny,
                    };
                    return UserDecision {
                        decision,
                        tool_call_id: data.get("tool_call_id").and_then(|v| v.as_str()).map(String::from),
                        tool_name: data.get("tool_name").and_then(|v| v.as_str()).map(String::from),
                    };
                }
            }
        }
    }
    let text = msg.content.extract_all_text().to_ascii_lowercase();
    let text = text.trim();
    let decision = match text {
        "approve" | "yes" | "y" => Decision::Approve,
        _ => Decision::Deny,
    };
    UserDecision { decision, tool_call_id: None, tool_name: None }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDecision {
    Approved,
    Denied,
}

pub struct GateOutcome {
    /// Calls resolved (approved or denied) during this scan, in order.
    pub resolved: Vec<(ToolCall, CallDecision)>,
    pub needs_user_input: bool,
    /// The synthesized approval-request message, present iff paused.
    pub approval_message: Option<Message>,
    /// Whether the supplied `user_decision` was consumed this scan.
    pub decision_consumed: bool,
}

/// Evaluate a batch of proposed tool calls against per-tool policy.
/// Stops at the first unresolved `requires_approval` tool and pauses
/// (§4.6 step 2) — only one pending approval is surfaced per cycle.
pub fn evaluate(
    calls: &[ToolCall],
    policy: &HashMap<String, ToolConfig>,
    user_decision: Option<&UserDecision>,
) -> GateOutcome {
    let mut resolved = Vec::new();
    let mut decision_consumed = false;

    for call in calls {
        let requires_approval = policy.get(&call.tool_name).map(|c| c.requires_approval).unwrap_or(false);
        if !requires_approval {
            resolved.push((call.clone(), CallDecision::Approved));
            continue;
        }

        let applies = user_decision.is_some_and(|ud| {
            if let Some(id) = &ud.tool_call_id {
                id == &call.call_id
            } else if let Some(name) = &ud.tool_name {
                name == &call.tool_name
            } else {
                false
            }
        });
        if applies {
            decision_consumed = true;
            let outcome = match user_decision.unwrap().decision {
                Decision::Approve => CallDecision::Approved,
                Decision::Deny => CallDecision::Denied,
            };
            resolved.push((call.clone(), outcome));
            continue;
        }

        let prompt = format!("Approve tool call `{}`?", call.tool_name);
        let message = Message::system_with_data(
            prompt.clone(),
            serde_json::json!({
                "interaction_type": "tool_approval",
                "tool_name": call.tool_name,
                "tool_input_rendered": call.arguments.to_string(),
                "prompt": prompt,
                "options": ["approve", "deny"],
            }),
        );
        return GateOutcome { resolved, needs_user_input: true, approval_message: Some(message), decision_consumed };
    }

    GateOutcome { resolved, needs_user_input: false, approval_message: None, decision_consumed }
}

/// Durable, session-scoped store for decisions that arrive before the
/// corresponding tool call is reached. Single-use: `take` removes the
/// entry unconditionally, even if the caller subsequently errors.
#[derive(Default)]
pub struct DecisionStore {
    inner: RwLock<HashMap<Uuid, UserDecision>>,
}

impl DecisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, task_id: Uuid, decision: UserDecision) {
        self.inner.write().insert(task_id, decision);
    }

    pub fn take(&self, task_id: Uuid) -> Option<UserDecision> {
        self.inner.write().remove(&task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall { call_id: id.into(), tool_name: name.into(), arguments: serde_json::json!({}) }
    }

    fn policy(requires_approval: bool) -> HashMap<String, ToolConfig> {
        let mut map = HashMap::new();
        map.insert(
            "rm".to_string(),
            ToolConfig { requires_approval, approval_prompt: None, allowed: vec![], timeout_seconds: None, resource_limits: Default::default() },
        );
        map
    }

    #[test]
    fn tool_not_in_policy_is_auto_approved() {
        let outcome = evaluate(&[call("c1", "ls")], &HashMap::new(), None);
        assert!(!outcome.needs_user_input);
        assert_eq!(outcome.resolved[0].1, CallDecision::Approved);
    }

    #[test]
    fn configured_no_approval_needed_is_auto_approved() {
        let outcome = evaluate(&[call("c1", "rm")], &policy(false), None);
        assert!(!outcome.needs_user_input);
        assert_eq!(outcome.resolved[0].1, CallDecision::Approved);
    }

    #[test]
    fn requires_approval_without_decision_pauses() {
        let outcome = evaluate(&[call("c1", "rm")], &policy(true), None);
        assert!(outcome.needs_user_input);
        assert!(outcome.approval_message.is_some());
        assert!(outcome.resolved.is_empty());
    }

    #[test]
    fn matching_decision_by_id_resolves_and_is_consumed() {
        let ud = UserDecision { decision: Decision::Approve, tool_call_id: Some("c1".into()), tool_name: None };
        let outcome = evaluate(&[call("c1", "rm")], &policy(true), Some(&ud));
        assert!(!outcome.needs_user_input);
        assert!(outcome.decision_consumed);
        assert_eq!(outcome.resolved[0].1, CallDecision::Approved);
    }

    #[test]
    fn matching_decision_by_name_denies() {
        let ud = UserDecision { decision: Decision::Deny, tool_call_id: None, tool_name: Some("rm".into()) };
        let outcome = evaluate(&[call("c1", "rm")], &policy(true), Some(&ud));
        assert_eq!(outcome.resolved[0].1, CallDecision::Denied);
    }

    #[test]
    fn non_matching_decision_still_pauses() {
        let ud = UserDecision { decision: Decision::Approve, tool_call_id: Some("other".into()), tool_name: None };
        let outcome = evaluate(&[call("c1", "rm")], &policy(true), Some(&ud));
        assert!(outcome.needs_user_input);
        assert!(!outcome.decision_consumed);
    }

    #[test]
    fn bare_text_parses_approve_deny_and_defaults_to_deny() {
        assert_eq!(parse_decision(&Message::user("approve")).decision, Decision::Approve);
        assert_eq!(parse_decision(&Message::user("Yes")).decision, Decision::Approve);
        assert_eq!(parse_decision(&Message::user("deny")).decision, Decision::Deny);
        assert_eq!(parse_decision(&Message::user("whatever")).decision, Decision::Deny);
    }

    #[test]
    fn structured_data_part_is_authoritative() {
        let msg = Message::system_with_data(
            "resume",
            serde_json::json!({"type": "tool_approval", "decision": "approve", "tool_name": "rm"}),
        );
        let ud = parse_decision(&msg);
        assert_eq!(ud.decision, Decision::Approve);
        assert_eq!(ud.tool_name.as_deref(), Some("rm"));
    }

    #[test]
    fn decision_store_is_single_use() {
        let store = DecisionStore::new();
        let task_id = Uuid::new_v4();
        store.put(task_id, UserDecision { decision: Decision::Approve, tool_call_id: None, tool_name: Some("rm".into()) });
        assert!(store.take(task_id).is_some());
        assert!(store.take(task_id).is_none());
    }
}
