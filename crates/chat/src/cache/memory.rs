//! In-process cache store backed by moka.

use super::CacheStore;
use async_trait::async_trait;
use moka::future::Cache;
use ragline_core::AppResult;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Bounded concurrent store. Each entry carries its own expiry, checked on
/// read; `max_ttl` bounds how long moka keeps anything around.
pub struct MemoryCacheStore {
    entries: Cache<String, Entry>,
}

impl MemoryCacheStore {
    pub fn new(max_entries: u64, max_ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(max_ttl.max(Duration::from_secs(1)))
            .build();

        Self { entries }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        match self.entries.get(key).await {
            Some(entry) if Instant::now() < entry.expires_at => Ok(Some(entry.value)),
            Some(_) => {
                self.entries.invalidate(key).await;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_and_overwrite() {
        let store = MemoryCacheStore::new(10, Duration::from_secs(60));

        store.set_with_expiry("k", "v1", Duration::from_secs(60)).await.unwrap();
        store.set_with_expiry("k", "v2", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entry_not_returned_after_expiry() {
        let store = MemoryCacheStore::new(10, Duration::from_secs(3600));
        store.set_with_expiry("short", "v", Duration::from_millis(50)).await.unwrap();
        store.set_with_expiry("long", "v", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.get("short").await.unwrap(), Some("v".to_string()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.get("long").await.unwrap(), Some("v".to_string()));
    }
}
