//! Knowledge layer for ragline.
//!
//! Per-namespace embedding stores behind a session cache, and the
//! retrieval pipeline that turns a question into context passages.
//!
//! - [`store`]: backend traits (`EmbeddingStore`, `StoreConnection`)
//! - [`session`]: one live handle per namespace, idle eviction
//! - [`retrieval`]: top-k search with a relevance floor
//! - [`lancedb_store`]: LanceDB backend, one table per namespace
//! - [`embeddings`]: trigram (offline) and Ollama embedders
//! - [`passages`]: document splitting for loading

pub mod embeddings;
pub mod lancedb_store;
pub mod passages;
pub mod retrieval;
pub mod session;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use embeddings::{create_provider, EmbeddingProvider};
pub use lancedb_store::LanceDbStore;
pub use passages::{split_passages, DEFAULT_PASSAGE_CHARS};
pub use retrieval::Retriever;
pub use session::{SessionCache, SweeperHandle, VectorStoreHandle};
pub use store::{EmbeddingStore, StoreConnection};
pub use types::{LoadStats, RetrievalResult, RetrievedPassage};
