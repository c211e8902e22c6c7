//! Context Builder (C4).
//!
//! Composes the ordered message list handed to the model for one
//! iteration, satisfying I6: system prompt/instructions, then retrieved
//! or summarized history, then the current-turn user message, then all
//! assistant/tool messages produced by earlier iterations of this task.

use sa_domain::tool::Message;

/// The fixed prompt-slot enumeration (§4.4). Any subset may be
/// overridden by user configuration; strategy defaults fill the rest.
#[derive(Debug, Clone, Default)]
pub struct PromptSlots {
    pub system_role: Option<String>,
    pub reasoning_instructions: Option<String>,
    pub tool_usage: Option<String>,
    pub output_format: Option<String>,
    pub communication_style: Option<String>,
    pub additional: Option<String>,
}

/// Strategy-supplied defaults for whichever slots the caller leaves unset.
pub trait PromptSlotDefaults: Send + Sync {
    fn system_role(&self) -> &str;
    fn reasoning_instructions(&self) -> &str;
    fn tool_usage(&self) -> &str;
    fn output_format(&self) -> &str;
    fn communication_style(&self) -> &str;
}

/// The default engine's baseline slot text — generic enough for a
/// general-purpose tool-using assistant.
pub struct DefaultPromptSlots;

impl PromptSlotDefaults for DefaultPromptSlots {
    fn system_role(&self) -> &str {
        "You are a helpful agent that completes tasks by reasoning step by step."
    }
    fn reasoning_instructions(&self) -> &str {
        "Think through what the user needs before acting. Use tools when they help; \
         otherwise answer directly."
    }
    fn tool_usage(&self) -> &str {
        "When a tool call would help, issue it with well-formed arguments. Wait for \
         its result before deciding the next step."
    }
    fn output_format(&self) -> &str {
        "Respond in plain text unless the user asks for a specific format."
    }
    fn communication_style(&self) -> &str {
        "Be direct and concise."
    }
}

/// Compose the system prompt from slots, or bypass slots entirely when a
/// fully-specified system prompt is supplied (§4.4).
pub fn compose_system_prompt(
    full_system_prompt: Option<&str>,
    slots: &PromptSlots,
    defaults: &dyn PromptSlotDefaults,
) -> String {
    if let Some(full) = full_system_prompt {
        return full.to_string();
    }
    let mut parts = vec![
        slots.system_role.clone().unwrap_or_else(|| defaults.system_role().to_string()),
        slots
            .reasoning_instructions
            .clone()
            .unwrap_or_else(|| defaults.reasoning_instructions().to_string()),
        slots.tool_usage.clone().unwrap_or_else(|| defaults.tool_usage().to_string()),
        slots.output_format.clone().unwrap_or_else(|| defaults.output_format().to_string()),
        slots
            .communication_style
            .clone()
            .unwrap_or_else(|| defaults.communication_style().to_string()),
    ];
    if let Some(additional) = &slots.additional {
        parts.push(additional.clone());
    }
    parts.join("\n\n")
}

/// Build the ordered message list for one iteration (I6).
pub fn build_messages(
    current_user_input: &str,
    full_system_prompt: Option<&str>,
    slots: &PromptSlots,
    defaults: &dyn PromptSlotDefaults,
    retrieved_history: &[Message],
    additional_context: Option<&str>,
    prior_turn_messages: &[Message],
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(4 + retrieved_history.len() + prior_turn_messages.len());

    messages.push(Message::system(compose_system_prompt(full_system_prompt, slots, defaults)));
    if let Some(ctx) = additional_context {
        messages.push(Message::system(ctx));
    }
    messages.extend(retrieved_history.iter().cloned());
    messages.push(Message::user(current_user_input));
    messages.extend(prior_turn_messages.iter().cloned());

    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_system_prompt_bypasses_slots() {
        let prompt = compose_system_prompt(Some("do exactly this"), &PromptSlots::default(), &DefaultPromptSlots);
        assert_eq!(prompt, "do exactly this");
    }

    #[test]
    fn slot_overrides_are_honored_and_defaults_fill_the_rest() {
        let slots = PromptSlots {
            system_role: Some("You are a pirate.".into()),
            ..Default::default()
        };
        let prompt = compose_system_prompt(None, &slots, &DefaultPromptSlots);
        assert!(prompt.starts_with("You are a pirate."));
        assert!(prompt.contains("Think through"));
    }

    #[test]
    fn message_order_matches_i6() {
        let history = vec![Message::user("earlier"), Message::assistant("ack")];
        let prior_turn = vec![Message::assistant("partial this turn")];
        let messages = build_messages(
            "2+2",
            None,
            &PromptSlots::default(),
            &DefaultPromptSlots,
            &history,
            Some("extra context"),
            &prior_turn,
        );

        // system, additional_context, history(2), current user, prior_turn(1)
        assert_eq!(messages.len(), 6);
        assert_eq!(messages[1].content.text(), Some("extra context"));
        assert_eq!(messages[2].content.text(), Some("earlier"));
        assert_eq!(messages[4].content.text(), Some("2+2"));
        assert_eq!(messages[5].content.text(), Some("partial this turn"));
    }

    #[test]
    fn additional_context_absent_is_skipped() {
        let messages = build_messages("hi", None, &PromptSlots::default(), &DefaultPromptSlots, &[], None, &[]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content.text(), Some("hi"));
    }
}
