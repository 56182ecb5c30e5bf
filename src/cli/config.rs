//! Configuration management for Lexi
//!
//! Layered configuration: built-in defaults, then a TOML file
//! (`--config` or `~/.lexi/config.toml`), then `.env`, then the process
//! environment. Environment names follow the deployment's `.env.example`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::auth::TlsPolicy;
use crate::errors::{LexiError, Result};
use crate::rag::reranking::RankingStrategy;

/// Complete configuration for Lexi
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub redis: RedisConfig,
    pub cache: CacheConfig,
    pub postgres: PostgresConfig,
    pub auth: AuthConfig,
    pub vector: VectorConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub sync: SyncConfig,
    pub tracing: TracingConfig,
}

/// Chat completion API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub router_model: String,
    pub agent_model: String,
    pub general_model: String,
    pub filter_model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Redis connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// TTL applied to every cached entry
    pub expiration_secs: u64,
    pub memory_threshold_mb: u64,
}

/// Which cache backend fronts retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

/// Cache policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Entries with less remaining TTL than this are evicted under memory pressure
    pub evict_below_secs: u64,
    /// Capacity of the in-process backend
    pub max_entries: u64,
}

/// PostgreSQL connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub port: u16,
    pub sslmode: String,
}

/// Which user store backs authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthBackend {
    Postgres,
    Memory,
}

/// Authentication policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub backend: AuthBackend,
    pub session_hours: i64,
    pub min_password_len: usize,
}

/// Vector service kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Chroma,
    Qdrant,
}

/// Vector index endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub backend: VectorBackend,
    pub laws_url: String,
    pub procedures_url: String,
    pub laws_collection: String,
    pub procedures_collection: String,
    pub tenant: String,
    pub database: String,
}

/// Retrieval, rerank and attachment chunking parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k: usize,
    pub top_n: usize,
    pub llm_filter: bool,
    pub rerank_strategy: RankingStrategy,
    pub keyword_boost: f32,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub context_chunks: usize,
}

/// Embedding model selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model_id: String,
    pub revision: String,
}

/// Agent behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum model calls in one specialist run
    pub recursion_limit: usize,
    /// Turns retained per conversation thread
    pub max_history_turns: usize,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
}

/// File system paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub download_cache_dir: String,
    pub laws_dir: String,
    pub procedures_dir: String,
    pub forms_dir: String,
    pub state_dir: String,
}

/// Remote index mirror configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub laws_mount: Option<String>,
    pub procedures_mount: Option<String>,
    pub laws_sas_url: Option<String>,
    pub procedures_sas_url: Option<String>,
    pub cache_root: Option<String>,
    pub force: bool,
    pub overwrite: bool,
}

/// Trace export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    pub arize_key: Option<String>,
    pub project_name: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            router_model: "gpt-4.1-nano".to_string(),
            agent_model: "gpt-4o-mini".to_string(),
            general_model: "gpt-4.1-nano".to_string(),
            filter_model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            expiration_secs: 3600,
            memory_threshold_mb: 25,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            evict_below_secs: 86_400,
            max_entries: 10_000,
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: None,
            port: 5432,
            sslmode: "require".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            backend: AuthBackend::Postgres,
            session_hours: 24,
            min_password_len: 6,
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Chroma,
            laws_url: "http://localhost:8000".to_string(),
            procedures_url: "http://localhost:8001".to_string(),
            laws_collection: "laws_db".to_string(),
            procedures_collection: "procedures_db".to_string(),
            tenant: "default_tenant".to_string(),
            database: "default_database".to_string(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 7,
            top_n: 3,
            llm_filter: true,
            rerank_strategy: RankingStrategy::Hybrid,
            keyword_boost: 0.1,
            chunk_size: 1000,
            chunk_overlap: 100,
            context_chunks: 3,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: "nlpaueb/legal-bert-base-uncased".to_string(),
            revision: "main".to_string(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            recursion_limit: 20,
            max_history_turns: 100,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8501,
            max_body_bytes: 25 * 1024 * 1024,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            download_cache_dir: "~/.cache/huggingface".to_string(),
            laws_dir: "laws_db_chroma".to_string(),
            procedures_dir: "procedures_db_chroma".to_string(),
            forms_dir: "forms".to_string(),
            state_dir: "~/.lexi".to_string(),
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            arize_key: None,
            project_name: "lexilaw_agent".to_string(),
        }
    }
}

impl Config {
    /// Load configuration: file (or defaults), `.env`, environment, then validate
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = match path {
            Some(config_path) => Self::load_from_file(&config_path)?,
            None => Self::load_default()?,
        };

        // A missing .env is normal in containers where variables are injected
        let _ = dotenvy::dotenv();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LexiError::ConfigError(format!("Failed to read config: {}", e)))?;

        toml::from_str(&contents)
            .map_err(|e| LexiError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load `~/.lexi/config.toml` if present, otherwise built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".lexi").join("config.toml");
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    /// Overlay values from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OPENAI_API_KEY") {
            self.openai.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.openai.base_url = v;
        }

        if let Some(v) = get("REDIS_HOST") {
            self.redis.host = v;
        }
        if let Some(v) = get("REDIS_PORT") {
            self.redis.port = parse_var("REDIS_PORT", &v)?;
        }
        if let Some(v) = get("REDIS_PASSWORD") {
            self.redis.password = Some(v);
        }
        if let Some(v) = get("REDIS_EXPIRATION") {
            self.redis.expiration_secs = parse_var("REDIS_EXPIRATION", &v)?;
        }
        if let Some(v) = get("REDIS_MEMORY_THRESHOLD_MB") {
            self.redis.memory_threshold_mb = parse_var("REDIS_MEMORY_THRESHOLD_MB", &v)?;
        }
        if let Some(v) = get("LEXI_CACHE_BACKEND") {
            self.cache.backend = match v.to_lowercase().as_str() {
                "redis" => CacheBackend::Redis,
                "memory" => CacheBackend::Memory,
                other => {
                    return Err(LexiError::ConfigError(format!(
                        "Unknown cache backend: {}",
                        other
                    )))
                }
            };
        }

        if let Some(v) = get("AZURE_POSTGRES_HOST") {
            self.postgres.host = v;
        }
        if let Some(v) = get("AZURE_POSTGRES_DB") {
            self.postgres.database = v;
        }
        if let Some(v) = get("AZURE_POSTGRES_USER") {
            self.postgres.user = v;
        }
        if let Some(v) = get("AZURE_POSTGRES_PASSWORD") {
            self.postgres.password = Some(v);
        }
        if let Some(v) = get("AZURE_POSTGRES_PORT") {
            self.postgres.port = parse_var("AZURE_POSTGRES_PORT", &v)?;
        }
        if let Some(v) = get("AZURE_POSTGRES_SSLMODE") {
            self.postgres.sslmode = v;
        }
        if let Some(v) = get("LEXI_AUTH_BACKEND") {
            self.auth.backend = match v.to_lowercase().as_str() {
                "postgres" => AuthBackend::Postgres,
                "memory" => AuthBackend::Memory,
                other => {
                    return Err(LexiError::ConfigError(format!(
                        "Unknown auth backend: {}",
                        other
                    )))
                }
            };
        }

        if let Some(v) = get("LAWS_CHROMA_URL") {
            self.vector.laws_url = v;
        }
        if let Some(v) = get("PROCS_CHROMA_URL") {
            self.vector.procedures_url = v;
        }

        if let Some(v) = get("LAWS_CHROMA_DIR") {
            self.sync.laws_mount = Some(v);
        }
        if let Some(v) = get("PROCS_CHROMA_DIR") {
            self.sync.procedures_mount = Some(v);
        }
        if let Some(v) = get("LAWS_CHROMA_SAS_URL") {
            self.sync.laws_sas_url = Some(v);
        }
        if let Some(v) = get("PROCS_CHROMA_SAS_URL") {
            self.sync.procedures_sas_url = Some(v);
        }
        if let Some(v) = get("CHROMA_CACHE_DIR") {
            self.sync.cache_root = Some(v);
        }
        if let Some(v) = get("CHROMA_FORCE_SYNC") {
            self.sync.force = v == "1";
        }
        if let Some(v) = get("CHROMA_OVERWRITE") {
            self.sync.overwrite = v == "1";
        }

        if let Some(v) = get("HF_HOME") {
            self.paths.download_cache_dir = v;
        }
        if let Some(v) = get("LEXI_FORMS_DIR") {
            self.paths.forms_dir = v;
        }
        if let Some(v) = get("LEXI_PORT") {
            self.server.port = parse_var("LEXI_PORT", &v)?;
        }

        if let Some(v) = get("ARIZE_PHNX") {
            self.tracing.arize_key = Some(v);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.redis.expiration_secs == 0 {
            return Err(LexiError::ConfigError(
                "REDIS_EXPIRATION must be greater than 0".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(LexiError::ConfigError(
                "server port must be greater than 0".to_string(),
            ));
        }

        if self.retrieval.k == 0 {
            return Err(LexiError::ConfigError(
                "retrieval.k must be greater than 0".to_string(),
            ));
        }

        if self.retrieval.top_n > self.retrieval.k {
            return Err(LexiError::ConfigError(format!(
                "retrieval.top_n ({}) cannot exceed retrieval.k ({})",
                self.retrieval.top_n, self.retrieval.k
            )));
        }

        if self.retrieval.chunk_size == 0 {
            return Err(LexiError::ConfigError(
                "retrieval.chunk_size must be greater than 0".to_string(),
            ));
        }

        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return Err(LexiError::ConfigError(
                "retrieval.chunk_overlap must be less than chunk_size".to_string(),
            ));
        }

        if self.agent.recursion_limit == 0 {
            return Err(LexiError::ConfigError(
                "agent.recursion_limit must be greater than 0".to_string(),
            ));
        }

        TlsPolicy::from_sslmode(&self.postgres.sslmode)?;

        Ok(())
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        fn mask(value: &Option<String>) -> Option<String> {
            value.as_ref().map(|_| "****".to_string())
        }

        let mut copy = self.clone();
        copy.openai.api_key = mask(&self.openai.api_key);
        copy.redis.password = mask(&self.redis.password);
        copy.postgres.password = mask(&self.postgres.password);
        copy.sync.laws_sas_url = mask(&self.sync.laws_sas_url);
        copy.sync.procedures_sas_url = mask(&self.sync.procedures_sas_url);
        copy.tracing.arize_key = mask(&self.tracing.arize_key);
        copy
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| LexiError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                LexiError::ConfigError(format!("Failed to create config dir: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| LexiError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Model download cache directory
    pub fn download_cache_dir(&self) -> PathBuf {
        Self::expand_path(&self.paths.download_cache_dir)
    }

    /// Default local laws index directory
    pub fn laws_dir(&self) -> PathBuf {
        Self::expand_path(&self.paths.laws_dir)
    }

    /// Default local procedures index directory
    pub fn procedures_dir(&self) -> PathBuf {
        Self::expand_path(&self.paths.procedures_dir)
    }

    /// Directory generated court forms are written to
    pub fn forms_dir(&self) -> PathBuf {
        Self::expand_path(&self.paths.forms_dir)
    }

    /// State directory (REPL history)
    pub fn state_dir(&self) -> PathBuf {
        Self::expand_path(&self.paths.state_dir)
    }

    /// Listener address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| LexiError::ConfigError(format!("Invalid value for {}: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8501);
        assert_eq!(config.redis.expiration_secs, 3600);
        assert_eq!(config.retrieval.k, 7);
        assert_eq!(config.retrieval.top_n, 3);
        assert_eq!(config.vector.laws_collection, "laws_db");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overlay() {
        let vars = env(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("REDIS_HOST", "cache.example.com"),
            ("REDIS_PORT", "16379"),
            ("REDIS_EXPIRATION", "120"),
            ("AZURE_POSTGRES_HOST", "db.example.com"),
            ("AZURE_POSTGRES_PORT", "6432"),
            ("LAWS_CHROMA_SAS_URL", "https://acct.blob.core.windows.net/laws?sv=1"),
            ("CHROMA_FORCE_SYNC", "1"),
            ("ARIZE_PHNX", "phx"),
        ]);

        let mut config = Config::default();
        config.apply_env_with(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.redis.host, "cache.example.com");
        assert_eq!(config.redis.port, 16379);
        assert_eq!(config.redis.expiration_secs, 120);
        assert_eq!(config.postgres.host, "db.example.com");
        assert_eq!(config.postgres.port, 6432);
        assert!(config.sync.laws_sas_url.is_some());
        assert!(config.sync.force);
        assert!(!config.sync.overwrite);
        assert_eq!(config.tracing.arize_key.as_deref(), Some("phx"));
    }

    #[test]
    fn test_env_blank_values_ignored() {
        let vars = env(&[("REDIS_HOST", "  "), ("OPENAI_API_KEY", "")]);
        let mut config = Config::default();
        config.apply_env_with(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.redis.host, "localhost");
        assert!(config.openai.api_key.is_none());
    }

    #[test]
    fn test_env_bad_number_rejected() {
        let vars = env(&[("REDIS_PORT", "not-a-port")]);
        let mut config = Config::default();
        let err = config.apply_env_with(|k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("REDIS_PORT"));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let vars = env(&[("LEXI_CACHE_BACKEND", "memcached")]);
        let mut config = Config::default();
        assert!(config.apply_env_with(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn test_validation_top_n_exceeds_k() {
        let mut config = Config::default();
        config.retrieval.top_n = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_overlap() {
        let mut config = Config::default();
        config.retrieval.chunk_overlap = config.retrieval.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_ttl() {
        let mut config = Config::default();
        config.redis.expiration_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_sslmode() {
        let mut config = Config::default();
        config.postgres.sslmode = "sometimes".to_string();
        assert!(config.validate().is_err());

        for mode in ["disable", "allow", "prefer", "require", "verify-ca", "verify-full"] {
            config.postgres.sslmode = mode.to_string();
            assert!(config.validate().is_ok(), "{} rejected", mode);
        }
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let mut config = Config::default();
        config.openai.api_key = Some("sk-secret".to_string());
        config.postgres.password = Some("hunter2".to_string());

        let shown = toml::to_string(&config.redacted()).unwrap();
        assert!(!shown.contains("sk-secret"));
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("****"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[server]\nport = 9000\n").unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.redis.expiration_secs, 3600);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.retrieval.k = 9;
        config.save(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.retrieval.k, 9);
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let expanded = Config::expand_path("/absolute/path");
        assert_eq!(expanded.to_string_lossy(), "/absolute/path");
    }
}
