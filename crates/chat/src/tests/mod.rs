//! Cross-component scenarios for the chat engine.
