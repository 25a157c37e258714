//! Prompt policy for ragline.
//!
//! This crate provides:
//! - YAML-based prompt policies with a built-in default
//! - Handlebars rendering of the system and context messages
//! - The `NO_CONTEXT` sentinel that triggers the fixed refusal

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_messages;
pub use loader::{list_prompts, load_or_default, load_prompt};
pub use types::{
    BuiltPrompt, BuiltPromptMetadata, PromptBehavior, PromptPolicy, DEFAULT_GREETING,
    DEFAULT_POLICY_ID, DEFAULT_REFUSAL, NO_CONTEXT,
};
