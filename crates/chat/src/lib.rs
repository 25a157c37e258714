//! Conversational engine for ragline.
//!
//! Turns `{namespace, question}` into a stream of answer events:
//!
//! - [`gate`]: greeting fast path, topic drift, context sufficiency
//! - [`cache`]: answer cache with memory and SQLite stores
//! - [`history`]: per-namespace conversation turns
//! - [`delivery`]: event channel and incremental text delivery
//! - [`engine`]: the per-request state machine
//! - [`runtime`]: builds everything from `AppConfig`

pub mod cache;
pub mod delivery;
pub mod engine;
pub mod gate;
pub mod history;
pub mod runtime;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use cache::{cache_key, normalize_question, CacheStore, MemoryCacheStore, ResponseCache, SqliteCacheStore};
pub use delivery::{EventStream, StreamEvent};
pub use engine::{ChatEngine, ChatRequest, EngineComponents};
pub use gate::{jaccard_similarity, ContextVerdict, RelevanceGate};
pub use history::{ConversationStore, ConversationTurn};
pub use runtime::Runtime;
