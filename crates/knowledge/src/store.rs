//! Embedding-store abstraction.
//!
//! The session cache only needs two capabilities from a backend: open a
//! connection scoped to one namespace, and run a top-k similarity search on
//! it. Keeping them behind traits lets tests substitute in-memory stores.

use crate::types::RetrievedPassage;
use ragline_core::AppResult;
use std::sync::Arc;

/// A backend that can open per-namespace connections.
#[async_trait::async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Backend name for logs (e.g., "lancedb").
    fn name(&self) -> &str;

    /// Open a connection scoped to `namespace`.
    ///
    /// Errors are reported as-is; callers map them to
    /// `AppError::RetrievalUnavailable`.
    async fn connect(&self, namespace: &str) -> AppResult<Arc<dyn StoreConnection>>;
}

/// A live, namespace-scoped connection.
#[async_trait::async_trait]
pub trait StoreConnection: Send + Sync {
    /// Return up to `k` passages, highest relevance first.
    async fn similarity_search(&self, query: &str, k: usize) -> AppResult<Vec<RetrievedPassage>>;
}
