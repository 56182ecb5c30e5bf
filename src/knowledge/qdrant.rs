//! Qdrant-backed collection
//!
//! Alternative to Chroma for deployments that already run Qdrant. Payloads
//! carry the chunk text under `document` (or `page_content`).

use async_trait::async_trait;
use qdrant_client::client::QdrantClient;
use qdrant_client::qdrant::{
    with_payload_selector::SelectorOptions, SearchPoints, Value as QdrantValue,
    WithPayloadSelector,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use super::vector_store::{QueryResult, VectorStore};
use crate::errors::{LexiError, Result};

/// Payload keys that may hold the chunk text
const TEXT_KEYS: [&str; 2] = ["document", "page_content"];

/// One Qdrant collection
pub struct QdrantCollection {
    client: QdrantClient,
    url: String,
    collection: String,
}

impl QdrantCollection {
    pub fn new(url: &str, collection: &str) -> Result<Self> {
        let client = QdrantClient::from_url(url)
            .build()
            .map_err(|e| LexiError::RetrievalError(format!("Failed to create Qdrant client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
            collection: collection.to_string(),
        })
    }
}

#[async_trait]
impl VectorStore for QdrantCollection {
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<QueryResult>> {
        let search_result = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.collection.clone(),
                vector: embedding.to_vec(),
                limit: k as u64,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                ..Default::default()
            })
            .await
            .map_err(|e| LexiError::RetrievalError(format!("Failed to search points: {}", e)))?;

        Ok(search_result
            .result
            .into_iter()
            .map(|point| {
                let (document, metadata) = split_payload(point.payload);
                QueryResult {
                    id: point_id_to_string(&point.id),
                    score: point.score,
                    document,
                    metadata,
                }
            })
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| LexiError::RetrievalError(format!("Failed to get collection info: {}", e)))?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0))
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .health_check()
            .await
            .map(|_| ())
            .map_err(|e| LexiError::RetrievalError(format!("Qdrant health check failed: {}", e)))
    }

    fn describe(&self) -> String {
        format!("qdrant {} [{}]", self.url, self.collection)
    }
}

/// Separate chunk text from the remaining payload fields
fn split_payload(payload: HashMap<String, QdrantValue>) -> (String, HashMap<String, JsonValue>) {
    let mut document = String::new();
    let mut metadata = HashMap::new();

    for (key, value) in payload {
        if TEXT_KEYS.contains(&key.as_str()) && document.is_empty() {
            if let Some(text) = qdrant_value_to_string(&value) {
                document = text;
                continue;
            }
        }
        if let Some(json_val) = qdrant_to_json_value(&value) {
            metadata.insert(key, json_val);
        }
    }

    (document, metadata)
}

fn qdrant_to_json_value(value: &QdrantValue) -> Option<JsonValue> {
    use qdrant_client::qdrant::value::Kind;
    value.kind.as_ref().and_then(|kind| match kind {
        Kind::StringValue(s) => Some(JsonValue::String(s.clone())),
        Kind::IntegerValue(i) => Some(JsonValue::Number((*i).into())),
        Kind::DoubleValue(f) => serde_json::Number::from_f64(*f).map(JsonValue::Number),
        Kind::BoolValue(b) => Some(JsonValue::Bool(*b)),
        _ => None,
    })
}

fn qdrant_value_to_string(value: &QdrantValue) -> Option<String> {
    use qdrant_client::qdrant::value::Kind;
    match value.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn point_id_to_string(point_id: &Option<qdrant_client::qdrant::PointId>) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;
    match point_id.as_ref().and_then(|id| id.point_id_options.as_ref()) {
        Some(PointIdOptions::Num(n)) => n.to_string(),
        Some(PointIdOptions::Uuid(u)) => u.clone(),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_payload() {
        let mut payload = HashMap::new();
        payload.insert("page_content".to_string(), QdrantValue::from("Form 2A".to_string()));
        payload.insert("page".to_string(), QdrantValue::from(4i64));
        payload.insert("final".to_string(), QdrantValue::from(true));

        let (document, metadata) = split_payload(payload);
        assert_eq!(document, "Form 2A");
        assert_eq!(metadata["page"], 4);
        assert_eq!(metadata["final"], true);
        assert!(!metadata.contains_key("page_content"));
    }

    #[test]
    fn test_point_id_to_string() {
        assert_eq!(point_id_to_string(&None), "unknown");
        let id = qdrant_client::qdrant::PointId::from(42u64);
        assert_eq!(point_id_to_string(&Some(id)), "42");
    }

    #[tokio::test]
    #[ignore] // Requires a running Qdrant
    async fn test_count_local() {
        let store = QdrantCollection::new("http://localhost:6334", "laws_db").unwrap();
        store.count().await.unwrap();
    }
}
