//! Startup wiring: builds every service from configuration.

use crate::cache::{open_store, ResponseCache};
use crate::engine::{ChatEngine, EngineComponents};
use ragline_core::config::AppConfig;
use ragline_core::{AppError, AppResult};
use ragline_knowledge::{
    create_provider, EmbeddingStore, LanceDbStore, Retriever, SessionCache, SweeperHandle,
};
use ragline_llm::create_client;
use ragline_prompt::load_or_default;
use std::sync::Arc;

/// Running services for one process.
pub struct Runtime {
    engine: ChatEngine,
    store: Arc<LanceDbStore>,
    sessions: Arc<SessionCache>,
    sweeper: Option<SweeperHandle>,
}

impl Runtime {
    /// Build the engine and its dependencies and start the session sweeper.
    ///
    /// # Errors
    /// Fails on invalid provider settings, an unusable cache backend, or a
    /// malformed prompt policy.
    pub async fn start(config: &AppConfig) -> AppResult<Self> {
        let store = Self::open_store(config).await?;

        let api_key = config.resolve_api_key(&config.provider);
        let provider_config = config.get_provider_config(&config.provider);
        let endpoint = provider_config.as_ref().and_then(|p| p.endpoint());
        let llm = create_client(&config.provider, endpoint, api_key.as_deref())
            .map_err(AppError::Config)?;

        let engine_config = config.engine.clone();
        let sessions = Arc::new(SessionCache::new(
            Arc::clone(&store) as Arc<dyn EmbeddingStore>,
            engine_config.sessions.idle_ttl(),
        ));
        let sweeper = sessions.spawn_sweeper(engine_config.sessions.sweep_interval());
        let retriever = Arc::new(Retriever::new(
            Arc::clone(&sessions),
            engine_config.retrieval.clone(),
        ));

        let cache_path = config.resolve_path(&config.cache.path);
        let cache_store = match open_store(&config.cache, &cache_path) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(error = %e, path = ?cache_path, "Response cache unavailable, caching disabled");
                None
            }
        };
        let cache = ResponseCache::new(cache_store, config.cache.ttl());

        let policy = load_or_default(&config.workspace, &engine_config.prompt_id)?;

        tracing::info!(
            provider = %config.provider,
            model = %config.model,
            policy = %policy.id,
            cache = cache.is_enabled(),
            "Runtime started"
        );

        let engine = ChatEngine::new(
            engine_config,
            EngineComponents {
                llm,
                model: config.model.clone(),
                retriever,
                cache,
                policy,
            },
        );

        Ok(Self {
            engine,
            store,
            sessions,
            sweeper: Some(sweeper),
        })
    }

    /// Open only the embedding store, for loading passages.
    pub async fn open_store(config: &AppConfig) -> AppResult<Arc<LanceDbStore>> {
        let embedder = create_provider(&config.store.embedding).await?;
        let path = config.resolve_path(&config.store.path);
        tracing::debug!(path = ?path, embedder = embedder.provider_name(), "Opening embedding store");
        Ok(Arc::new(LanceDbStore::new(path, embedder)))
    }

    pub fn engine(&self) -> &ChatEngine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<LanceDbStore> {
        &self.store
    }

    pub fn sessions(&self) -> &Arc<SessionCache> {
        &self.sessions
    }

    /// Stop background work.
    pub async fn shutdown(mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.shutdown().await;
        }
        tracing::debug!("Runtime stopped");
    }
}
