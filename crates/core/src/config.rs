//! Configuration management for ragline.
//!
//! Configuration is merged from several sources, later ones winning:
//! - Built-in defaults
//! - Config file (`.ragline/config.yaml` or `RAGLINE_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! Every threshold the engine applies (relevance cut-offs, TTLs, pacing,
//! timeouts) lives in [`EngineConfig`] so it can be tuned without a rebuild.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Name of the per-workspace state directory.
pub const STATE_DIR: &str = ".ragline";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .ragline/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Active LLM provider ("ollama", "openai", "groq")
    pub provider: String,

    /// Model identifier for answer generation
    pub model: String,

    /// API key for the LLM provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Request pipeline tuning
    pub engine: EngineConfig,

    /// Response cache backend
    pub cache: CacheConfig,

    /// Embedding store location and query embedder
    pub store: StoreConfig,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
///
/// Groq is configured with the OpenAI shape since it speaks the same API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    OpenAI {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        endpoint: Option<String>,
        #[serde(rename = "organizationEnv")]
        organization_env: Option<String>,
    },
    Ollama {
        endpoint: String,
        model: String,
        #[serde(rename = "embeddingModel")]
        embedding_model: Option<String>,
        timeout: Option<u64>,
    },
}

impl ProviderConfig {
    /// Model configured for this provider.
    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::OpenAI { model, .. } => model,
            ProviderConfig::Ollama { model, .. } => model,
        }
    }

    /// Endpoint override, if any.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ProviderConfig::OpenAI { endpoint, .. } => endpoint.as_deref(),
            ProviderConfig::Ollama { endpoint, .. } => Some(endpoint.as_str()),
        }
    }
}

/// Tuning for the request pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Sampling temperature for answer generation
    pub temperature: f32,

    /// Upper bound on generated tokens
    pub max_tokens: u32,

    /// Number of history turns (not exchanges) fed into the prompt
    pub history_turns: usize,

    /// Passages requested from the embedding store
    pub top_k: usize,

    /// Buffered events per request before the producer waits on the consumer
    pub channel_capacity: usize,

    /// Prompt policy id looked up under `.ragline/prompts/`
    pub prompt_id: String,

    pub retrieval: RetrievalConfig,
    pub relevance: RelevanceConfig,
    pub sessions: SessionConfig,
    pub history: HistoryConfig,
    pub delivery: DeliveryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1024,
            history_turns: 6,
            top_k: 5,
            channel_capacity: 64,
            prompt_id: "chat.rag.default".to_string(),
            retrieval: RetrievalConfig::default(),
            relevance: RelevanceConfig::default(),
            sessions: SessionConfig::default(),
            history: HistoryConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

/// Retrieval pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalConfig {
    /// Passages with a score at or below this value are discarded
    pub min_score: f32,

    /// Upper bound on acquire + search
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            min_score: 0.7,
            timeout_secs: 10,
        }
    }
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Relevance gate thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelevanceConfig {
    /// Jaccard similarity below which the cache is bypassed
    pub drift_threshold: f64,

    /// Joined context shorter than this (in chars) is insufficient
    pub min_context_chars: usize,

    /// Context is insufficient when every passage scores below this
    pub min_passage_score: f32,

    /// Short all-alphabetic inputs up to this length count as greetings
    pub greeting_max_chars: usize,

    /// Normalized inputs that are always greetings
    pub greetings: Vec<String>,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        let greetings = [
            "hi",
            "hello",
            "hey",
            "hiya",
            "howdy",
            "greetings",
            "good morning",
            "good afternoon",
            "good evening",
            "hi there",
            "hello there",
            "hey there",
        ];

        Self {
            drift_threshold: 0.3,
            min_context_chars: 50,
            min_passage_score: 0.5,
            greeting_max_chars: 10,
            greetings: greetings.iter().map(|g| g.to_string()).collect(),
        }
    }
}

/// Vector-store session cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Handles idle for longer than this are evicted
    pub idle_ttl_secs: u64,

    /// How often the eviction sweep runs
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 30 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Conversation history retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryConfig {
    /// Turns retained per namespace; 0 keeps everything
    pub max_turns: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_turns: 200 }
    }
}

/// Incremental delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliveryConfig {
    /// Characters per replayed record
    pub chunk_chars: usize,

    /// Delay between replayed records
    pub pacing_millis: u64,

    /// Upper bound on opening the upstream model stream
    pub model_timeout_secs: u64,

    /// Upper bound on the gap between two upstream deltas
    pub idle_timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            chunk_chars: 50,
            pacing_millis: 30,
            model_timeout_secs: 60,
            idle_timeout_secs: 30,
        }
    }
}

impl DeliveryConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_millis)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Response cache backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Sqlite,
    Disabled,
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    pub backend: CacheBackend,

    /// Lifetime of a cached answer
    pub ttl_secs: u64,

    /// Capacity bound for the in-memory backend
    pub max_entries: u64,

    /// SQLite file, relative to the workspace unless absolute
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            ttl_secs: 3600,
            max_entries: 10_000,
            path: PathBuf::from(STATE_DIR).join("cache.sqlite3"),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Embedding store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// LanceDB directory, relative to the workspace unless absolute
    pub path: PathBuf,

    pub embedding: EmbeddingSettings,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(STATE_DIR).join("store"),
            embedding: EmbeddingSettings::default(),
        }
    }
}

/// Query/passage embedder used by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSettings {
    /// "trigram" (offline, deterministic) or "ollama"
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub endpoint: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    engine: Option<EngineConfig>,
    cache: Option<CacheConfig>,
    store: Option<StoreConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    format: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            log_level: None,
            log_json: false,
            verbose: false,
            no_color: false,
            llm: None,
            engine: EngineConfig::default(),
            cache: CacheConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `RAGLINE_WORKSPACE`: Override workspace path
    /// - `RAGLINE_CONFIG`: Path to config file
    /// - `RAGLINE_PROVIDER`: LLM provider
    /// - `RAGLINE_MODEL`: Model identifier
    /// - `RAGLINE_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use ragline_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("RAGLINE_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("RAGLINE_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.state_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("RAGLINE_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("RAGLINE_MODEL") {
            config.model = model;
        }

        config.api_key = std::env::var("RAGLINE_API_KEY").ok();
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge an explicitly named config file (e.g. `--config`) over this one.
    pub fn with_config_file(self, path: &Path) -> AppResult<Self> {
        let mut merged = self.merge_yaml(path)?;
        merged.config_file = Some(path.to_path_buf());
        Ok(merged)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> AppResult<Self> {
        let config_file: ConfigFile = serde_yaml::from_str(contents)?;

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(format) = logging.format {
                result.log_json = format.eq_ignore_ascii_case("json");
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();

            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model().to_string();
            }

            result.llm = Some(llm);
        }

        if let Some(engine) = config_file.engine {
            result.engine = engine;
        }

        if let Some(cache) = config_file.cache {
            result.cache = cache;
        }

        if let Some(store) = config_file.store {
            result.store = store;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .ragline directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Ensure the .ragline directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let state_dir = self.state_dir();
        if !state_dir.exists() {
            std::fs::create_dir_all(&state_dir).map_err(|e| {
                AppError::Config(format!("Failed to create {} directory: {}", STATE_DIR, e))
            })?;
        }
        Ok(())
    }

    /// Resolve a configured path against the workspace.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Get a provider configuration by name.
    pub fn get_provider_config(&self, provider: &str) -> Option<ProviderConfig> {
        self.llm
            .as_ref()
            .and_then(|llm| llm.providers.get(provider).cloned())
    }

    /// Resolve the API key for a provider.
    ///
    /// `RAGLINE_API_KEY` wins; otherwise the provider's `apiKeyEnv` is read,
    /// falling back to the conventional `<PROVIDER>_API_KEY` variable.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        if let Some(ProviderConfig::OpenAI { api_key_env, .. }) = self.get_provider_config(provider)
        {
            if let Ok(key) = std::env::var(&api_key_env) {
                return Some(key);
            }
        }

        std::env::var(format!("{}_API_KEY", provider.to_uppercase())).ok()
    }

    /// Validate configuration for the active provider.
    pub fn validate(&self) -> AppResult<()> {
        let provider = &self.provider;
        let known_providers = ["ollama", "openai", "groq"];

        if !known_providers.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                provider,
                known_providers.join(", ")
            )));
        }

        if provider != "ollama" && self.resolve_api_key(provider).is_none() {
            return Err(AppError::Config(format!(
                "No API key found for provider '{}'. Set RAGLINE_API_KEY or {}_API_KEY",
                provider,
                provider.to_uppercase()
            )));
        }

        if self.engine.delivery.chunk_chars == 0 {
            return Err(AppError::Config(
                "engine.delivery.chunkChars must be greater than zero".to_string(),
            ));
        }

        if self.engine.channel_capacity == 0 {
            return Err(AppError::Config(
                "engine.channelCapacity must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert!(!config.verbose);
        assert!(!config.no_color);
        assert_eq!(config.cache.backend, CacheBackend::Memory);
    }

    #[test]
    fn test_engine_defaults_match_policy() {
        let engine = EngineConfig::default();
        assert_eq!(engine.history_turns, 6);
        assert_eq!(engine.top_k, 5);
        assert_eq!(engine.retrieval.min_score, 0.7);
        assert_eq!(engine.relevance.drift_threshold, 0.3);
        assert_eq!(engine.relevance.min_context_chars, 50);
        assert_eq!(engine.relevance.min_passage_score, 0.5);
        assert_eq!(engine.relevance.greeting_max_chars, 10);
        assert_eq!(engine.sessions.idle_ttl(), Duration::from_secs(1800));
        assert_eq!(engine.sessions.sweep_interval(), Duration::from_secs(60));
        assert_eq!(engine.delivery.chunk_chars, 50);
        assert_eq!(CacheConfig::default().ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_state_dir() {
        let config = AppConfig::default();
        assert!(config.state_dir().ends_with(".ragline"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(
            None,
            None,
            Some("groq".to_string()),
            Some("llama-3.3-70b-versatile".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.provider, "groq");
        assert_eq!(overridden.model, "llama-3.3-70b-versatile");
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml_sections() {
        let yaml = r#"
llm:
  activeProvider: groq
  providers:
    groq:
      apiKeyEnv: GROQ_API_KEY
      model: llama-3.3-70b-versatile
logging:
  level: debug
  format: json
engine:
  topK: 8
  relevance:
    driftThreshold: 0.25
  delivery:
    pacingMillis: 0
cache:
  backend: sqlite
  ttlSecs: 60
"#;
        let merged = AppConfig::default().merge_yaml_str(yaml).unwrap();

        assert_eq!(merged.provider, "groq");
        assert_eq!(merged.model, "llama-3.3-70b-versatile");
        assert_eq!(merged.log_level.as_deref(), Some("debug"));
        assert!(merged.log_json);
        assert_eq!(merged.engine.top_k, 8);
        assert_eq!(merged.engine.relevance.drift_threshold, 0.25);
        // untouched keys keep their defaults
        assert_eq!(merged.engine.relevance.min_context_chars, 50);
        assert_eq!(merged.engine.delivery.pacing_millis, 0);
        assert_eq!(merged.engine.delivery.chunk_chars, 50);
        assert_eq!(merged.cache.backend, CacheBackend::Sqlite);
        assert_eq!(merged.cache.ttl_secs, 60);
        assert!(matches!(
            merged.get_provider_config("groq"),
            Some(ProviderConfig::OpenAI { .. })
        ));
    }

    #[test]
    fn test_with_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bots.yaml");
        std::fs::write(&path, "cache:\n  backend: disabled\n").unwrap();

        let config = AppConfig::default().with_config_file(&path).unwrap();
        assert_eq!(config.cache.backend, CacheBackend::Disabled);
        assert_eq!(config.config_file.as_deref(), Some(path.as_path()));

        assert!(AppConfig::default()
            .with_config_file(&dir.path().join("missing.yaml"))
            .is_err());
    }

    #[test]
    fn test_resolve_path() {
        let mut config = AppConfig::default();
        config.workspace = PathBuf::from("/srv/bots");
        assert_eq!(
            config.resolve_path(Path::new(".ragline/store")),
            PathBuf::from("/srv/bots/.ragline/store")
        );
        assert_eq!(
            config.resolve_path(Path::new("/var/cache.db")),
            PathBuf::from("/var/cache.db")
        );
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ollama() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_chunk() {
        let mut config = AppConfig::default();
        config.engine.delivery.chunk_chars = 0;
        assert!(config.validate().is_err());
    }
}
