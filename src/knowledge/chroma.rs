//! ChromaDB HTTP client (API v2)
//!
//! The collection is resolved by name once, then queried by id with
//! precomputed embeddings. Distances are turned into scores with
//! `1 / (1 + distance)`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::vector_store::{QueryResult, VectorStore};
use crate::errors::{LexiError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One Chroma collection
pub struct ChromaCollection {
    client: Client,
    base_url: String,
    tenant: String,
    database: String,
    name: String,
    collection_id: OnceCell<String>,
}

impl ChromaCollection {
    /// Create a handle; no request is made until first use
    pub fn new(base_url: &str, tenant: &str, database: &str, name: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(LexiError::HttpError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tenant: tenant.to_string(),
            database: database.to_string(),
            name: name.to_string(),
            collection_id: OnceCell::new(),
        })
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections",
            self.base_url, self.tenant, self.database
        )
    }

    async fn collection_id(&self) -> Result<&str> {
        let id = self
            .collection_id
            .get_or_try_init(|| async {
                let url = format!("{}/{}", self.collections_url(), self.name);
                let response = self.client.get(&url).send().await?;
                if !response.status().is_success() {
                    return Err(LexiError::RetrievalError(format!(
                        "Collection '{}' not found at {} (HTTP {})",
                        self.name,
                        self.base_url,
                        response.status()
                    )));
                }
                let collection: CollectionInfo = response.json().await?;
                tracing::debug!(name = %self.name, id = %collection.id, "resolved chroma collection");
                Ok(collection.id)
            })
            .await?;
        Ok(id.as_str())
    }
}

#[async_trait]
impl VectorStore for ChromaCollection {
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<QueryResult>> {
        let id = self.collection_id().await?;
        let url = format!("{}/{}/query", self.collections_url(), id);

        let body = QueryRequest {
            query_embeddings: vec![embedding],
            n_results: k,
            include: ["documents", "metadatas", "distances"],
        };

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LexiError::RetrievalError(format!(
                "Chroma query failed (HTTP {}): {}",
                status, text
            )));
        }

        let parsed: QueryResponse = response.json().await?;
        Ok(parsed.into_results())
    }

    async fn count(&self) -> Result<u64> {
        let id = self.collection_id().await?;
        let url = format!("{}/{}/count", self.collections_url(), id);
        let count: u64 = self.client.get(&url).send().await?.json().await?;
        Ok(count)
    }

    async fn ping(&self) -> Result<()> {
        let url = format!("{}/api/v2/heartbeat", self.base_url);
        let response = self.client.get(&url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(LexiError::RetrievalError(format!(
                "Chroma heartbeat returned HTTP {}",
                response.status()
            )))
        }
    }

    fn describe(&self) -> String {
        format!("chroma {} [{}]", self.base_url, self.name)
    }
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query_embeddings: Vec<&'a [f32]>,
    n_results: usize,
    include: [&'static str; 3],
}

/// Column-oriented query reply, one row per query embedding
#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<HashMap<String, JsonValue>>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

impl QueryResponse {
    fn into_results(self) -> Vec<QueryResult> {
        let ids = self.ids.into_iter().next().unwrap_or_default();
        let mut documents = first_row(self.documents);
        let mut metadatas = first_row(self.metadatas);
        let mut distances = first_row(self.distances);

        ids.into_iter()
            .enumerate()
            .map(|(i, id)| {
                let distance = take(&mut distances, i).flatten().unwrap_or(f32::MAX);
                QueryResult {
                    id,
                    score: distance_to_score(distance),
                    document: take(&mut documents, i).flatten().unwrap_or_default(),
                    metadata: take(&mut metadatas, i).flatten().unwrap_or_default(),
                }
            })
            .collect()
    }
}

fn first_row<T>(column: Option<Vec<Vec<T>>>) -> Vec<Option<T>> {
    column
        .and_then(|rows| rows.into_iter().next())
        .map(|row| row.into_iter().map(Some).collect())
        .unwrap_or_default()
}

fn take<T>(row: &mut [Option<T>], i: usize) -> Option<T> {
    row.get_mut(i).and_then(Option::take)
}

/// Map a non-negative distance into (0, 1]
pub fn distance_to_score(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}
