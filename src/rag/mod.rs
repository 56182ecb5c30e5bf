// RAG (Retrieval-Augmented Generation) pipeline
//
// Components:
// - Retrieval Engine: similarity search over one index
// - Relevance Filter: chat-model YES/NO judgement per candidate
// - Re-ranking: score, sort and keep the best few
// - Pipeline: end-to-end orchestration

pub mod filter;
pub mod pipeline;
pub mod reranking;
pub mod retrieval;

pub use filter::RelevanceFilter;
pub use pipeline::{RagConfig, RagPipeline, RagResult, SourceDocument};
pub use reranking::ReRanker;
pub use retrieval::RetrievalEngine;
