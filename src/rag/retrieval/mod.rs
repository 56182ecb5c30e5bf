// Retrieval engine module
pub mod engine;

pub use engine::{RetrievalEngine, RetrievedDocument, SearchParams};
