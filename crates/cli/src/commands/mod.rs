//! Command handlers for the ragline CLI.

pub mod ask;
pub mod chat;
pub mod load;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use load::LoadCommand;
