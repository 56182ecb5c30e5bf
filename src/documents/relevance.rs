//! Pick the chunks of an attachment closest to the question

use std::sync::Arc;

use crate::errors::{LexiError, Result};
use crate::knowledge::{cosine_similarity, Embedder};

/// Top `top_k` chunks by cosine similarity to `query`, joined by a blank line
pub async fn relevant_chunks(
    embedder: Arc<dyn Embedder>,
    chunks: Vec<String>,
    query: &str,
    top_k: usize,
) -> Result<String> {
    if chunks.is_empty() || top_k == 0 {
        return Ok(String::new());
    }

    let query = query.to_string();
    let (query_vec, chunk_vecs, chunks) = tokio::task::spawn_blocking(move || {
        let query_vec = embedder.embed(&query)?;
        let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let chunk_vecs = embedder.embed_batch(&refs)?;
        Ok::<_, anyhow::Error>((query_vec, chunk_vecs, chunks))
    })
    .await
    .map_err(|e| LexiError::ExtractionError(format!("Embedding task failed: {}", e)))??;

    Ok(select_top(&query_vec, &chunk_vecs, &chunks, top_k))
}

/// Rank chunks by similarity, best first; ties keep document order
fn select_top(query_vec: &[f32], chunk_vecs: &[Vec<f32>], chunks: &[String], top_k: usize) -> String {
    let mut scored: Vec<(f32, usize)> = chunk_vecs
        .iter()
        .enumerate()
        .map(|(i, v)| (cosine_similarity(query_vec, v), i))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .take(top_k)
        .filter_map(|(_, i)| chunks.get(i).map(String::as_str))
        .collect::<Vec<_>>()
        .join("\n\n")
}
