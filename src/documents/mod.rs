//! Uploaded-document context
//!
//! extract -> chunk -> pick the chunks most similar to the question.

pub mod chunking;
pub mod extract;
pub mod ocr;
pub mod relevance;

use std::path::Path;
use std::sync::Arc;

use crate::cli::config::RetrievalConfig;
use crate::errors::Result;
use crate::knowledge::Embedder;

pub use chunking::{chunk_document_text, TextSplitter};
pub use extract::{detect_kind, FileKind, TextExtractor};
pub use ocr::{find_on_path, OcrEngine};
pub use relevance::relevant_chunks;

/// Builds question context from an attached file
#[derive(Clone)]
pub struct DocumentContext {
    extractor: TextExtractor,
    embedder: Arc<dyn Embedder>,
    splitter: TextSplitter,
    top_k: usize,
}

impl DocumentContext {
    pub fn new(extractor: TextExtractor, embedder: Arc<dyn Embedder>, config: &RetrievalConfig) -> Self {
        Self {
            extractor,
            embedder,
            splitter: TextSplitter::new(config.chunk_size, config.chunk_overlap),
            top_k: config.context_chunks,
        }
    }

    /// Most relevant excerpts of `path` for `query`
    pub async fn context_for(&self, path: &Path, query: &str) -> Result<String> {
        let text = self.extractor.extract(path).await?;
        let chunks = self.splitter.split(&text);
        tracing::debug!(path = %path.display(), chunks = chunks.len(), "attachment chunked");
        relevant_chunks(self.embedder.clone(), chunks, query, self.top_k).await
    }
}
