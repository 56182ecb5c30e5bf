//! Vector store abstraction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::errors::Result;

/// Query result from vector search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: String,
    /// Similarity, higher is closer
    pub score: f32,
    pub document: String,
    pub metadata: HashMap<String, JsonValue>,
}

/// A searchable collection of embedded documents
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The `k` nearest documents to `embedding`, best first
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<QueryResult>>;

    /// Number of documents in the collection
    async fn count(&self) -> Result<u64>;

    /// Whether the service answers
    async fn ping(&self) -> Result<()>;

    /// Human-readable location, for status output
    fn describe(&self) -> String;
}
