// Retrieval engine: embed the query, similarity search one index
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::knowledge::{IndexKind, KnowledgeBase, QueryResult};

/// Search parameters for retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// Number of nearest neighbours to fetch
    pub k: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self { k: 7 }
    }
}

/// Retrieved document with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub content: String,
    pub index: String,
    pub score: f32,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl From<QueryResult> for RetrievedDocument {
    fn from(result: QueryResult) -> Self {
        Self {
            id: result.id,
            content: result.document,
            index: String::new(), // Will be set by caller
            score: result.score,
            metadata: result.metadata.into_iter().collect(),
        }
    }
}

/// Retrieval engine for one index
pub struct RetrievalEngine {
    knowledge: KnowledgeBase,
    index: IndexKind,
    params: SearchParams,
}

impl RetrievalEngine {
    /// Create new retrieval engine
    pub fn new(knowledge: KnowledgeBase, index: IndexKind) -> Self {
        Self::with_params(knowledge, index, SearchParams::default())
    }

    /// Create with custom parameters
    pub fn with_params(knowledge: KnowledgeBase, index: IndexKind, params: SearchParams) -> Self {
        Self {
            knowledge,
            index,
            params,
        }
    }

    /// Retrieve the `k` nearest documents for `query`
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        let embedder = self.knowledge.embedder();
        let text = query.to_string();

        // Model inference is CPU-bound
        let embedding = tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .context("Embedding task panicked")?
            .context("Failed to embed query")?;

        let results = self
            .knowledge
            .store(self.index)
            .query(&embedding, self.params.k)
            .await
            .with_context(|| format!("Failed to search {} index", self.index))?;

        tracing::debug!(index = %self.index, hits = results.len(), "similarity search");

        Ok(results
            .into_iter()
            .map(|r| {
                let mut doc = RetrievedDocument::from(r);
                doc.index = self.index.to_string();
                doc
            })
            .collect())
    }

    pub fn index(&self) -> IndexKind {
        self.index
    }

    /// Get search parameters
    pub fn params(&self) -> &SearchParams {
        &self.params
    }
}
