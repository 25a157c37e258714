//! Vector-store session cache.
//!
//! Keeps at most one live store connection per namespace and drops
//! connections that sit idle longer than the configured TTL. Acquire is
//! serialized per namespace, so concurrent first requests share one connect.

use crate::store::{EmbeddingStore, StoreConnection};
use crate::types::RetrievedPassage;
use dashmap::DashMap;
use ragline_core::{AppError, AppResult};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A live connection to one namespace's embedding store.
pub struct VectorStoreHandle {
    namespace: String,
    connection: Arc<dyn StoreConnection>,
    last_access: std::sync::Mutex<Instant>,
}

impl VectorStoreHandle {
    fn new(namespace: &str, connection: Arc<dyn StoreConnection>) -> Self {
        Self {
            namespace: namespace.to_string(),
            connection,
            last_access: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Mark the handle as used now.
    pub fn touch(&self) {
        let mut last = self.last_access.lock().unwrap_or_else(|e| e.into_inner());
        *last = Instant::now();
    }

    /// Time since the last use.
    pub fn idle_for(&self) -> Duration {
        let last = self.last_access.lock().unwrap_or_else(|e| e.into_inner());
        last.elapsed()
    }

    /// Top-`k` similarity search; refreshes last access first.
    pub async fn similarity_search(&self, query: &str, k: usize) -> AppResult<Vec<RetrievedPassage>> {
        self.touch();
        self.connection.similarity_search(query, k).await
    }
}

impl std::fmt::Debug for VectorStoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreHandle")
            .field("namespace", &self.namespace)
            .field("idle_for", &self.idle_for())
            .finish()
    }
}

#[derive(Default)]
struct Slot {
    handle: Option<Arc<VectorStoreHandle>>,
    /// Set when the slot has been removed from the map; holders must retry.
    retired: bool,
}

/// Per-namespace cache of vector-store handles.
pub struct SessionCache {
    store: Arc<dyn EmbeddingStore>,
    idle_ttl: Duration,
    slots: DashMap<String, Arc<Mutex<Slot>>>,
}

impl SessionCache {
    pub fn new(store: Arc<dyn EmbeddingStore>, idle_ttl: Duration) -> Self {
        Self {
            store,
            idle_ttl,
            slots: DashMap::new(),
        }
    }

    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    /// Number of namespaces with a slot (live or being connected).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether `namespace` currently has a slot.
    pub fn contains(&self, namespace: &str) -> bool {
        self.slots.contains_key(namespace)
    }

    /// Return the live handle for `namespace`, connecting if needed.
    ///
    /// # Errors
    /// `AppError::RetrievalUnavailable` when the store cannot be reached.
    pub async fn acquire(&self, namespace: &str) -> AppResult<Arc<VectorStoreHandle>> {
        loop {
            let slot = {
                let entry = self
                    .slots
                    .entry(namespace.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(Slot::default())));
                Arc::clone(entry.value())
            };

            let mut guard = slot.lock().await;
            if guard.retired {
                continue;
            }

            if let Some(handle) = &guard.handle {
                if handle.idle_for() <= self.idle_ttl {
                    handle.touch();
                    return Ok(Arc::clone(handle));
                }
                tracing::debug!(namespace, "Cached store handle expired, reconnecting");
            }

            tracing::debug!(namespace, store = self.store.name(), "Connecting to embedding store");
            let connection = self.store.connect(namespace).await.map_err(|e| {
                tracing::warn!(namespace, error = %e, "Embedding store connect failed");
                AppError::RetrievalUnavailable(format!(
                    "Failed to connect to {} for '{}': {}",
                    self.store.name(),
                    namespace,
                    e
                ))
            })?;

            let handle = Arc::new(VectorStoreHandle::new(namespace, connection));
            guard.handle = Some(Arc::clone(&handle));
            tracing::info!(namespace, "Connected to embedding store");
            return Ok(handle);
        }
    }

    /// Drop handles idle longer than the TTL. Returns how many were evicted.
    ///
    /// Slots with an acquire in progress and handles still borrowed by a
    /// request are left alone.
    pub fn evict_idle(&self) -> usize {
        let mut evicted = 0;

        self.slots.retain(|namespace, slot| {
            let Ok(mut guard) = slot.try_lock() else {
                return true;
            };

            let expired = match &guard.handle {
                None => true,
                Some(handle) => {
                    Arc::strong_count(handle) == 1 && handle.idle_for() > self.idle_ttl
                }
            };

            if expired {
                guard.retired = true;
                guard.handle = None;
                evicted += 1;
                tracing::debug!(namespace = %namespace, "Evicted idle store handle");
            }
            !expired
        });

        evicted
    }

    /// Run [`evict_idle`](Self::evict_idle) every `interval` until shut down.
    ///
    /// The task holds only a weak reference and exits on its own once the
    /// cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let cache: Weak<Self> = Arc::downgrade(self);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let period = interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(cache) = cache.upgrade() else {
                            break;
                        };
                        let evicted = cache.evict_idle();
                        if evicted > 0 {
                            tracing::info!(evicted, remaining = cache.len(), "Swept idle store handles");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("Session sweeper stopped");
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Owner of the background sweep task.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Session sweeper ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        connects: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                connects: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: false,
            }
        }

        fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    struct NullConnection;

    #[async_trait::async_trait]
    impl StoreConnection for NullConnection {
        async fn similarity_search(&self, _query: &str, _k: usize) -> AppResult<Vec<RetrievedPassage>> {
            Ok(Vec::new())
        }
    }

    #[async_trait::async_trait]
    impl EmbeddingStore for CountingStore {
        fn name(&self) -> &str {
            "counting"
        }

        async fn connect(&self, _namespace: &str) -> AppResult<Arc<dyn StoreConnection>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(AppError::Knowledge("connection refused".to_string()));
            }
            Ok(Arc::new(NullConnection))
        }
    }

    #[tokio::test]
    async fn test_acquire_reuses_live_handle() {
        let store = Arc::new(CountingStore::new());
        let cache = SessionCache::new(store.clone(), Duration::from_secs(60));

        let first = cache.acquire("docs").await.unwrap();
        let second = cache.acquire("docs").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.namespace(), "docs");
        assert_eq!(store.connects(), 1);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = Arc::new(CountingStore::new());
        let cache = SessionCache::new(store.clone(), Duration::from_secs(60));

        let a = cache.acquire("alpha").await.unwrap();
        let b = cache.acquire("beta").await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(store.connects(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_acquire_connects_once() {
        let store = Arc::new(CountingStore {
            delay: Duration::from_millis(30),
            ..CountingStore::new()
        });
        let cache = Arc::new(SessionCache::new(store.clone(), Duration::from_secs(60)));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.acquire("docs").await.unwrap() })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }

        assert_eq!(store.connects(), 1);
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_idle_handle_evicted_then_recreated() {
        let store = Arc::new(CountingStore::new());
        let cache = SessionCache::new(store.clone(), Duration::from_millis(20));

        drop(cache.acquire("docs").await.unwrap());
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(cache.evict_idle(), 1);
        assert!(cache.is_empty());

        cache.acquire("docs").await.unwrap();
        assert_eq!(store.connects(), 2);
    }

    #[tokio::test]
    async fn test_borrowed_handle_not_evicted() {
        let store = Arc::new(CountingStore::new());
        let cache = SessionCache::new(store.clone(), Duration::from_millis(20));

        let held = cache.acquire("docs").await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(cache.evict_idle(), 0);
        assert_eq!(cache.len(), 1);
        drop(held);
        assert_eq!(cache.evict_idle(), 1);
    }

    #[tokio::test]
    async fn test_fresh_handle_survives_sweep() {
        let store = Arc::new(CountingStore::new());
        let cache = SessionCache::new(store.clone(), Duration::from_secs(60));

        drop(cache.acquire("docs").await.unwrap());
        assert_eq!(cache.evict_idle(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_handle_replaced_on_acquire() {
        let store = Arc::new(CountingStore::new());
        let cache = SessionCache::new(store.clone(), Duration::from_millis(20));

        let first = cache.acquire("docs").await.unwrap();
        drop(first);
        tokio::time::sleep(Duration::from_millis(60)).await;

        cache.acquire("docs").await.unwrap();
        assert_eq!(store.connects(), 2);
    }

    #[tokio::test]
    async fn test_search_refreshes_last_access() {
        let store = Arc::new(CountingStore::new());
        let cache = SessionCache::new(store.clone(), Duration::from_secs(60));

        let handle = cache.acquire("docs").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(handle.idle_for() >= Duration::from_millis(30));

        handle.similarity_search("anything", 5).await.unwrap();
        assert!(handle.idle_for() < Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_connect_failure_is_retrieval_unavailable() {
        let store = Arc::new(CountingStore {
            fail: true,
            ..CountingStore::new()
        });
        let cache = SessionCache::new(store.clone(), Duration::from_secs(60));

        let err = cache.acquire("docs").await.unwrap_err();
        assert!(matches!(err, AppError::RetrievalUnavailable(_)));
        assert!(err.is_recoverable());

        // the empty slot left behind is swept right away
        assert_eq!(cache.evict_idle(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_evicts_and_shuts_down() {
        let store = Arc::new(CountingStore::new());
        let cache = Arc::new(SessionCache::new(store.clone(), Duration::from_millis(10)));
        let sweeper = cache.spawn_sweeper(Duration::from_millis(10));

        drop(cache.acquire("docs").await.unwrap());
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cache.is_empty());
        sweeper.shutdown().await;
    }
}
