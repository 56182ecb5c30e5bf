// End-to-end RAG pipeline: retrieve -> LLM filter -> rerank
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cli::config::Config;
use crate::knowledge::{IndexKind, KnowledgeBase};
use crate::llm::ChatModel;
use crate::rag::filter::RelevanceFilter;
use crate::rag::reranking::{ReRankConfig, ReRanker};
use crate::rag::retrieval::{RetrievalEngine, SearchParams};

/// RAG pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub search: SearchParams,
    pub rerank: ReRankConfig,
    /// Run the LLM relevance filter between retrieval and rerank
    pub llm_filter: bool,
    pub filter_model: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            search: SearchParams::default(),
            rerank: ReRankConfig::default(),
            llm_filter: true,
            filter_model: "gpt-4o-mini".to_string(),
        }
    }
}

impl RagConfig {
    pub fn from_config(config: &Config) -> Self {
        let r = &config.retrieval;
        Self {
            search: SearchParams { k: r.k },
            rerank: ReRankConfig {
                strategy: r.rerank_strategy,
                keyword_boost: r.keyword_boost,
                top_n: r.top_n,
            },
            llm_filter: r.llm_filter,
            filter_model: config.openai.filter_model.clone(),
        }
    }
}

/// A document handed to agents: metadata plus text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub text: String,
}

/// RAG pipeline result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResult {
    pub documents: Vec<SourceDocument>,
    /// Candidates from similarity search
    pub retrieved: usize,
    /// Candidates surviving the relevance filter
    pub filtered: usize,
    /// Documents kept after rerank
    pub reranked: usize,
}

/// Pipeline over one index
pub struct RagPipeline {
    retrieval_engine: RetrievalEngine,
    filter: Option<RelevanceFilter>,
    reranker: ReRanker,
}

impl RagPipeline {
    /// Create with custom configuration
    pub fn with_config(
        knowledge: KnowledgeBase,
        index: IndexKind,
        model: Arc<dyn ChatModel>,
        config: RagConfig,
    ) -> Self {
        let filter = config
            .llm_filter
            .then(|| RelevanceFilter::new(model, config.filter_model.clone()));

        Self {
            retrieval_engine: RetrievalEngine::with_params(knowledge, index, config.search),
            filter,
            reranker: ReRanker::with_config(config.rerank),
        }
    }

    /// Execute the pipeline for `query`
    pub async fn execute(&self, query: &str) -> Result<RagResult> {
        let retrieved_docs = self
            .retrieval_engine
            .retrieve(query)
            .await
            .context("Failed to retrieve documents")?;
        let retrieved = retrieved_docs.len();

        let filtered_docs = match &self.filter {
            Some(filter) => filter.filter(query, retrieved_docs).await,
            None => retrieved_docs,
        };
        let filtered = filtered_docs.len();

        let ranked = self.reranker.rerank(filtered_docs, query);
        let reranked = ranked.len();

        tracing::info!(
            index = %self.retrieval_engine.index(),
            retrieved,
            filtered,
            reranked,
            "rag pipeline complete"
        );

        Ok(RagResult {
            documents: ranked
                .into_iter()
                .map(|r| SourceDocument {
                    metadata: r.document.metadata,
                    text: r.document.content,
                })
                .collect(),
            retrieved,
            filtered,
            reranked,
        })
    }

    pub fn index(&self) -> IndexKind {
        self.retrieval_engine.index()
    }
}
