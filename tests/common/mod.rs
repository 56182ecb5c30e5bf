//! Offline stand-ins for the chat model and vector indexes

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use lexi::agent::{build_resolver, QueryResolver};
use lexi::auth::{open_user_store, SessionManager, UserManager};
use lexi::cache::{CacheService, MemoryCache};
use lexi::cli::config::{AuthBackend, CacheBackend, Config};
use lexi::knowledge::{Embedder, KnowledgeBase, QueryResult, VectorStore};
use lexi::llm::{ChatMessage, ChatModel, ChatRequest, ChatResponse, Role, ToolCall};
use lexi::server::AppState;
use lexi::telemetry::TelemetryCollector;
use lexi::tools::GENERATE_COURT_FORM;

/// Chat model that behaves like a well-mannered router plus specialists.
///
/// Routing keys off words in the question; specialists call their first tool
/// once and then answer with the tool output, prefixed by their route name.
#[derive(Default)]
pub struct LegalDeskModel {
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl LegalDeskModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

fn route_for(question: &str) -> &'static str {
    let q = question.to_lowercase();
    if q.contains("goodbye") {
        "FINISH"
    } else if q.contains("form") || q.contains("file") {
        "procedure"
    } else if q.contains("act") || q.contains("law") || q.contains("bail") {
        "law"
    } else {
        "general"
    }
}

#[async_trait]
impl ChatModel for LegalDeskModel {
    async fn complete(&self, request: ChatRequest) -> lexi::Result<ChatResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let last = request.messages.last().cloned().unwrap_or_else(|| ChatMessage::user(""));

        let message = if let Some(question) = last.text_content().strip_prefix("Route this question: ") {
            ChatMessage::assistant(route_for(question))
        } else if last.role == Role::Tool {
            ChatMessage::assistant(format!("law: From the sources: {}", last.text_content()))
        } else if !request.tools.is_empty() {
            let wants_form = request.tools.iter().any(|t| t.function.name == GENERATE_COURT_FORM)
                && last.text_content().to_lowercase().contains("form");
            let call = if wants_form {
                ToolCall::new("call_1", GENERATE_COURT_FORM, json!({"title": "Notice of Appeal"}).to_string())
            } else {
                let tool = &request.tools[0].function.name;
                ToolCall::new("call_1", tool.as_str(), json!({"query": last.text_content()}).to_string())
            };
            ChatMessage {
                role: Role::Assistant,
                content: None,
                tool_calls: vec![call],
                tool_call_id: None,
            }
        } else {
            ChatMessage::assistant("general: Hello, I'm Lexi.")
        };

        Ok(ChatResponse {
            message,
            finish_reason: Some("stop".into()),
        })
    }
}

pub struct UnitEmbedder;

impl Embedder for UnitEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }

    fn dimension(&self) -> usize {
        2
    }
}

/// Index returning the same passage for every query
pub struct FixedStore {
    pub source: &'static str,
    pub passage: &'static str,
}

#[async_trait]
impl VectorStore for FixedStore {
    async fn query(&self, _embedding: &[f32], _k: usize) -> lexi::Result<Vec<QueryResult>> {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), json!(self.source));
        Ok(vec![QueryResult {
            id: "1".into(),
            score: 0.92,
            document: self.passage.to_string(),
            metadata,
        }])
    }

    async fn count(&self) -> lexi::Result<u64> {
        Ok(1)
    }

    async fn ping(&self) -> lexi::Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        format!("fixed:{}", self.source)
    }
}

pub fn knowledge() -> KnowledgeBase {
    KnowledgeBase::new(
        Arc::new(UnitEmbedder),
        Arc::new(FixedStore {
            source: "Bail Act 1977",
            passage: "s 4 presumption in favour of bail",
        }),
        Arc::new(FixedStore {
            source: "Supreme Court (General Civil Procedure) Rules 2015",
            passage: "Form 6A Writ",
        }),
    )
}

/// In-process configuration rooted at `dir`
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.cache.backend = CacheBackend::Memory;
    config.auth.backend = AuthBackend::Memory;
    config.retrieval.llm_filter = false;
    config.paths.download_cache_dir = dir.join("hf").display().to_string();
    config.paths.laws_dir = dir.join("laws").display().to_string();
    config.paths.procedures_dir = dir.join("procedures").display().to_string();
    config.paths.forms_dir = dir.join("forms").display().to_string();
    config
}

pub fn resolver(config: &Config, model: Arc<LegalDeskModel>) -> (QueryResolver, CacheService, TelemetryCollector) {
    let telemetry = TelemetryCollector::new();
    let cache = CacheService::new(Arc::new(MemoryCache::new(1_000)), config).with_telemetry(telemetry.clone());
    let resolver = build_resolver(config, model, knowledge(), cache.clone(), telemetry.clone());
    (resolver, cache, telemetry)
}

pub async fn app_state(config: &Config, model: Arc<LegalDeskModel>) -> AppState {
    let (resolver, cache, telemetry) = resolver(config, model);
    let users = UserManager::new(open_user_store(config).unwrap(), config.auth.min_password_len);
    users.init().await.unwrap();
    AppState::new(
        resolver,
        users,
        SessionManager::new(config.auth.session_hours),
        cache,
        telemetry,
        config,
    )
    .with_knowledge(knowledge())
}
