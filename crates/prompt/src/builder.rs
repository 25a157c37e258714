//! Prompt builder: renders a policy into chat messages.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptPolicy, NO_CONTEXT};
use handlebars::Handlebars;
use ragline_core::{AppError, AppResult};
use ragline_llm::ChatMessage;
use serde_json::json;

/// Build the message list for one generation.
///
/// Order: policy system message, context system message (the passages, or
/// [`NO_CONTEXT`] when `context` is `None`), prior history, then the
/// question as the final user message.
///
/// # Example
/// ```no_run
/// use ragline_prompt::{build_messages, PromptPolicy};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let policy = PromptPolicy::default();
/// let built = build_messages(&policy, Some("Returns are accepted for 30 days."), &[], "What is your return window?")?;
/// assert_eq!(built.messages.len(), 3);
/// # Ok(())
/// # }
/// ```
pub fn build_messages(
    policy: &PromptPolicy,
    context: Option<&str>,
    history: &[ChatMessage],
    question: &str,
) -> AppResult<BuiltPrompt> {
    tracing::debug!(
        policy = %policy.id,
        has_context = context.is_some(),
        history = history.len(),
        "Building prompt"
    );

    let mut handlebars = Handlebars::new();

    // Plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("system", &policy.system)
        .map_err(|e| AppError::Prompt(format!("Failed to register system template: {}", e)))?;
    handlebars
        .register_template_string("context", &policy.context)
        .map_err(|e| AppError::Prompt(format!("Failed to register context template: {}", e)))?;

    let data = json!({
        "tone": policy.behavior.tone,
        "style": policy.behavior.style,
        "refusal": policy.refusal,
        "noContext": NO_CONTEXT,
        "context": context.unwrap_or(NO_CONTEXT),
    });

    let system = handlebars
        .render("system", &data)
        .map_err(|e| AppError::Prompt(format!("Failed to render system template: {}", e)))?;
    let context_message = handlebars
        .render("context", &data)
        .map_err(|e| AppError::Prompt(format!("Failed to render context template: {}", e)))?;

    let mut messages = Vec::with_capacity(history.len() + 3);
    messages.push(ChatMessage::system(system));
    messages.push(ChatMessage::system(context_message));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(question));

    Ok(BuiltPrompt {
        messages,
        metadata: BuiltPromptMetadata {
            policy_id: policy.id.clone(),
            no_context: context.is_none(),
            history_turns: history.len(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_REFUSAL;
    use ragline_llm::Role;

    #[test]
    fn test_message_order_with_history() {
        let policy = PromptPolicy::default();
        let history = vec![
            ChatMessage::user("What is your return window?"),
            ChatMessage::assistant("30 days."),
        ];

        let built = build_messages(
            &policy,
            Some("Returns are accepted within 30 days."),
            &history,
            "Do you ship abroad?",
        )
        .unwrap();

        let roles: Vec<Role> = built.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(
            built.messages[1].content,
            "Relevant context:\nReturns are accepted within 30 days."
        );
        assert_eq!(built.messages[4].content, "Do you ship abroad?");
        assert_eq!(built.metadata.history_turns, 2);
        assert!(!built.metadata.no_context);
    }

    #[test]
    fn test_missing_context_uses_sentinel() {
        let policy = PromptPolicy::default();
        let built = build_messages(&policy, None, &[], "Who won the match?").unwrap();

        assert_eq!(built.messages[1].content, "Relevant context:\nNO_CONTEXT");
        assert!(built.metadata.no_context);
        assert!(built.messages[0].content.contains(DEFAULT_REFUSAL));
        assert!(built.messages[0].content.contains(NO_CONTEXT));
    }

    #[test]
    fn test_context_is_not_html_escaped() {
        let policy = PromptPolicy::default();
        let built = build_messages(&policy, Some("a < b && \"c\""), &[], "q").unwrap();
        assert!(built.messages[1].content.ends_with("a < b && \"c\""));
    }

    #[test]
    fn test_broken_template_is_prompt_error() {
        let policy = PromptPolicy {
            system: "{{#if}}".to_string(),
            ..PromptPolicy::default()
        };
        let result = build_messages(&policy, None, &[], "q");
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }
}
