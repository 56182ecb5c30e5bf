//! Cache-fronted document lookups over the laws and procedures indexes

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::types::{required_str, Tool};
use crate::cache::{CacheService, Namespace};
use crate::errors::{LexiError, Result};
use crate::knowledge::IndexKind;
use crate::llm::ToolDefinition;
use crate::rag::{RagPipeline, SourceDocument};

pub const LAWS_LOOKUP: &str = "laws_db_lookup";
pub const PROCEDURES_LOOKUP: &str = "procedures_db_lookup";

/// RAG lookup over one index, returning `[{metadata, text}]` as JSON
pub struct LookupTool {
    name: &'static str,
    description: &'static str,
    namespace: Namespace,
    pipeline: Arc<RagPipeline>,
    cache: Option<CacheService>,
}

impl LookupTool {
    /// Lookup tool for the index `pipeline` searches
    pub fn new(pipeline: Arc<RagPipeline>) -> Self {
        let (name, description, namespace) = match pipeline.index() {
            IndexKind::Laws => (
                LAWS_LOOKUP,
                "Search Acts, regulations, and statutory instruments (Victoria). Returns a list of {metadata, text}.",
                Namespace::LawsQuery,
            ),
            IndexKind::Procedures => (
                PROCEDURES_LOOKUP,
                "Search procedural forms and court application documents. Returns a list of {metadata, text}.",
                Namespace::ProceduresQuery,
            ),
        };

        Self {
            name,
            description,
            namespace,
            pipeline,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: CacheService) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Documents for `query`, served from cache when possible
    pub async fn lookup(&self, query: &str) -> Result<Vec<SourceDocument>> {
        let compute = || async {
            let result = self.pipeline.execute(query).await.map_err(LexiError::from)?;
            Ok::<_, LexiError>(result.documents)
        };

        match &self.cache {
            Some(cache) => cache.get_or_compute_json(self.namespace, query, compute).await,
            None => compute().await,
        }
    }
}

#[async_trait]
impl Tool for LookupTool {
    fn name(&self) -> &str {
        self.name
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            self.name,
            self.description,
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    }
                },
                "required": ["query"]
            }),
        )
    }

    async fn call(&self, args: Value) -> Result<String> {
        let query = required_str(&args, "query")?;
        let documents = self.lookup(query).await?;
        Ok(serde_json::to_string(&documents)?)
    }
}
