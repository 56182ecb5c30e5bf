//! Shared service state and startup wiring

use anyhow::Context;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::{build_resolver, QueryResolver};
use crate::auth::{open_user_store, SessionManager, UserManager};
use crate::cache::{connect_or_fallback, CacheService};
use crate::cli::config::Config;
use crate::knowledge::{IndexKind, KnowledgeBase};
use crate::llm::{ChatModel, OpenAiClient};
use crate::sync::{ensure_writable, BlobMirror, IndexLocation};
use crate::telemetry::TelemetryCollector;

/// Everything a request handler needs
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<QueryResolver>,
    pub users: UserManager,
    pub sessions: SessionManager,
    pub cache: CacheService,
    pub knowledge: Option<KnowledgeBase>,
    pub telemetry: TelemetryCollector,
    pub summary: ServiceSummary,
    pub forms_dir: PathBuf,
    pub max_body_bytes: usize,
}

/// Configured services, reported by `/status`
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSummary {
    pub version: String,
    pub cache_backend: String,
    pub auth_backend: String,
    pub vector_backend: String,
    pub laws_index: Option<IndexLocation>,
    pub procedures_index: Option<IndexLocation>,
    pub tracing_enabled: bool,
}

impl ServiceSummary {
    pub fn from_config(config: &Config) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            cache_backend: format!("{:?}", config.cache.backend).to_lowercase(),
            auth_backend: format!("{:?}", config.auth.backend).to_lowercase(),
            vector_backend: format!("{:?}", config.vector.backend).to_lowercase(),
            laws_index: None,
            procedures_index: None,
            tracing_enabled: config.tracing.arize_key.is_some(),
        }
    }
}

/// Directories that must exist and be writable before serving
pub fn runtime_dirs(config: &Config) -> Vec<PathBuf> {
    vec![
        config.download_cache_dir(),
        config.laws_dir(),
        config.procedures_dir(),
        config.forms_dir(),
    ]
}

impl AppState {
    /// Full service startup: directories, index mirrors, stores, agents
    pub async fn bootstrap(config: &Config) -> anyhow::Result<Self> {
        for dir in runtime_dirs(config) {
            ensure_writable(&dir)
                .with_context(|| format!("runtime directory {} is not writable", dir.display()))?;
        }

        let mirror = BlobMirror::from_config(config);
        let (laws, procedures) = mirror
            .resolve_index_dirs(config)
            .await
            .context("failed to resolve vector index directories")?;

        let mut state = Self::connect(config).await?;
        if let Err(e) = state.users.init().await {
            tracing::error!(error = %e, "failed to create users table");
        }
        state.summary.laws_index = Some(laws);
        state.summary.procedures_index = Some(procedures);
        Ok(state)
    }

    /// Build clients and agents without touching the filesystem layout
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let telemetry = TelemetryCollector::new();

        let backend = connect_or_fallback(config).await;
        let cache = CacheService::new(backend, config).with_telemetry(telemetry.clone());

        let knowledge = KnowledgeBase::from_config(config).context("failed to configure vector indexes")?;
        let model: Arc<dyn ChatModel> =
            Arc::new(OpenAiClient::with_config(&config.openai).context("failed to build OpenAI client")?);

        let resolver = build_resolver(config, model, knowledge.clone(), cache.clone(), telemetry.clone());
        let store = open_user_store(config).context("failed to configure user store")?;

        Ok(Self::new(
            resolver,
            UserManager::new(store, config.auth.min_password_len),
            SessionManager::new(config.auth.session_hours),
            cache,
            telemetry,
            config,
        )
        .with_knowledge(knowledge))
    }

    pub fn new(
        resolver: QueryResolver,
        users: UserManager,
        sessions: SessionManager,
        cache: CacheService,
        telemetry: TelemetryCollector,
        config: &Config,
    ) -> Self {
        Self {
            forms_dir: resolver.forms_dir().to_path_buf(),
            resolver: Arc::new(resolver),
            users,
            sessions,
            cache,
            knowledge: None,
            telemetry,
            summary: ServiceSummary::from_config(config),
            max_body_bytes: config.server.max_body_bytes,
        }
    }

    pub fn with_knowledge(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// Document count per index, `None` when unreachable
    pub async fn index_counts(&self) -> Vec<(IndexKind, Option<u64>)> {
        let Some(knowledge) = &self.knowledge else {
            return Vec::new();
        };

        let mut counts = Vec::new();
        for kind in [IndexKind::Laws, IndexKind::Procedures] {
            let count = knowledge.store(kind).count().await.ok();
            counts.push((kind, count));
        }
        counts
    }
}
