//! Response cache over final answers.
//!
//! Keys are `response:{namespace}:{normalized question}`. Store failures
//! never reach the caller: a failed read is a miss and a failed write is
//! skipped.

mod memory;
mod sqlite;

pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;

use async_trait::async_trait;
use ragline_core::config::{CacheBackend, CacheConfig};
use ragline_core::AppResult;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Key/value store with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &str;

    /// The value for `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;
}

/// Trim, lowercase, and collapse whitespace runs to a single space.
pub fn normalize_question(question: &str) -> String {
    question
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn cache_key(namespace: &str, question: &str) -> String {
    format!("response:{}:{}", namespace, normalize_question(question))
}

/// Open the store selected by `config`. `Disabled` yields `None`.
///
/// `sqlite_path` is the already-resolved database file.
pub fn open_store(config: &CacheConfig, sqlite_path: &Path) -> AppResult<Option<Arc<dyn CacheStore>>> {
    let store: Arc<dyn CacheStore> = match config.backend {
        CacheBackend::Disabled => return Ok(None),
        CacheBackend::Memory => Arc::new(MemoryCacheStore::new(config.max_entries, config.ttl())),
        CacheBackend::Sqlite => Arc::new(SqliteCacheStore::open(sqlite_path)?),
    };

    tracing::debug!(backend = store.name(), ttl_secs = config.ttl_secs, "Response cache ready");
    Ok(Some(store))
}

/// Answer cache used by the engine.
#[derive(Clone)]
pub struct ResponseCache {
    store: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Option<Arc<dyn CacheStore>>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn disabled() -> Self {
        Self::new(None, Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub async fn get(&self, namespace: &str, question: &str) -> Option<String> {
        let store = self.store.as_ref()?;
        let key = cache_key(namespace, question);

        match store.get(&key).await {
            Ok(Some(value)) => {
                tracing::debug!(%key, "Response cache hit");
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(%key, error = %e, "Response cache read failed, treating as miss");
                None
            }
        }
    }

    pub async fn put(&self, namespace: &str, question: &str, answer: &str) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let key = cache_key(namespace, question);

        match store.set_with_expiry(&key, answer, self.ttl).await {
            Ok(()) => tracing::debug!(%key, "Cached response"),
            Err(e) => tracing::warn!(%key, error = %e, "Response cache write failed, skipping"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::AppError;

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }

        async fn get(&self, _key: &str) -> AppResult<Option<String>> {
            Err(AppError::CacheUnavailable("connection refused".to_string()))
        }

        async fn set_with_expiry(&self, _key: &str, _value: &str, _ttl: Duration) -> AppResult<()> {
            Err(AppError::CacheUnavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn test_normalize_question() {
        assert_eq!(
            normalize_question("  What IS your\t return \n window?  "),
            "what is your return window?"
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for input in ["  Mixed   CASE\tinput ", "", "already normal", "\n\n  a  \r\n b"] {
            let once = normalize_question(input);
            assert_eq!(normalize_question(&once), once);
        }
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(
            cache_key("docs", "What is your return window?"),
            "response:docs:what is your return window?"
        );
        assert_eq!(
            cache_key("docs", "what  is your RETURN window?"),
            cache_key("docs", "What is your return window?")
        );
    }

    #[tokio::test]
    async fn test_round_trip_through_memory_store() {
        let store = Arc::new(MemoryCacheStore::new(100, Duration::from_secs(60)));
        let cache = ResponseCache::new(Some(store), Duration::from_secs(60));

        assert_eq!(cache.get("docs", "q").await, None);
        cache.put("docs", "Q ", "answer").await;
        assert_eq!(cache.get("docs", "q").await, Some("answer".to_string()));
        assert_eq!(cache.get("other", "q").await, None);
    }

    #[tokio::test]
    async fn test_store_failures_are_swallowed() {
        let cache = ResponseCache::new(Some(Arc::new(BrokenStore)), Duration::from_secs(60));

        cache.put("docs", "q", "answer").await;
        assert_eq!(cache.get("docs", "q").await, None);
    }

    #[tokio::test]
    async fn test_disabled_cache() {
        let cache = ResponseCache::disabled();
        assert!(!cache.is_enabled());

        cache.put("docs", "q", "answer").await;
        assert_eq!(cache.get("docs", "q").await, None);
    }

    #[test]
    fn test_open_store_disabled() {
        let config = CacheConfig {
            backend: CacheBackend::Disabled,
            ..CacheConfig::default()
        };
        let store = open_store(&config, Path::new("unused.sqlite3")).unwrap();
        assert!(store.is_none());
    }
}
