// Re-ranking module
pub mod scorer;

pub use scorer::{RankedDocument, RankingStrategy, ReRankConfig, ReRanker};
