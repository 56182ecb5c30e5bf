//! Knowledge base: embedder plus the laws and procedures indexes
//!
//! Both indexes share one embedder; each is any `VectorStore`.

pub mod chroma;
pub mod embedding;
pub mod qdrant;
pub mod vector_store;

use std::fmt;
use std::sync::Arc;

use crate::cli::config::{Config, VectorBackend};
use crate::errors::Result;

pub use chroma::ChromaCollection;
pub use embedding::{cosine_similarity, Embedder, EmbeddingEngine, LazyEmbedder};
pub use qdrant::QdrantCollection;
pub use vector_store::{QueryResult, VectorStore};

/// The two document indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Laws,
    Procedures,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Laws => write!(f, "laws"),
            IndexKind::Procedures => write!(f, "procedures"),
        }
    }
}

/// Shared embedder and per-domain vector stores
#[derive(Clone)]
pub struct KnowledgeBase {
    embedder: Arc<dyn Embedder>,
    laws: Arc<dyn VectorStore>,
    procedures: Arc<dyn VectorStore>,
}

impl KnowledgeBase {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        laws: Arc<dyn VectorStore>,
        procedures: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            embedder,
            laws,
            procedures,
        }
    }

    /// Build the configured backends; the embedding model loads on first query
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(LazyEmbedder::new(
            config.embedding.clone(),
            config.download_cache_dir(),
        ));

        let v = &config.vector;
        let (laws, procedures): (Arc<dyn VectorStore>, Arc<dyn VectorStore>) = match v.backend {
            VectorBackend::Chroma => (
                Arc::new(ChromaCollection::new(&v.laws_url, &v.tenant, &v.database, &v.laws_collection)?),
                Arc::new(ChromaCollection::new(
                    &v.procedures_url,
                    &v.tenant,
                    &v.database,
                    &v.procedures_collection,
                )?),
            ),
            VectorBackend::Qdrant => (
                Arc::new(QdrantCollection::new(&v.laws_url, &v.laws_collection)?),
                Arc::new(QdrantCollection::new(&v.procedures_url, &v.procedures_collection)?),
            ),
        };

        Ok(Self::new(embedder, laws, procedures))
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    pub fn store(&self, kind: IndexKind) -> Arc<dyn VectorStore> {
        match kind {
            IndexKind::Laws => self.laws.clone(),
            IndexKind::Procedures => self.procedures.clone(),
        }
    }
}
