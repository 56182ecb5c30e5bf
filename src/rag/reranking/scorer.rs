// Rerank filtered lookup hits before they reach the agent
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::rag::retrieval::RetrievedDocument;

/// How hits are ordered after the relevance filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingStrategy {
    /// Vector similarity only
    Similarity,
    /// Similarity plus a capped boost for query terms found in the passage
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReRankConfig {
    pub strategy: RankingStrategy,
    /// Upper bound on the term boost
    pub keyword_boost: f32,
    /// Passages handed to the agent
    pub top_n: usize,
}

impl Default for ReRankConfig {
    fn default() -> Self {
        Self {
            strategy: RankingStrategy::Hybrid,
            keyword_boost: 0.1,
            top_n: 3,
        }
    }
}

/// A hit with the score it was ranked by
#[derive(Debug, Clone)]
pub struct RankedDocument {
    pub document: RetrievedDocument,
    pub score: f32,
    pub term_boost: f32,
}

pub struct ReRanker {
    config: ReRankConfig,
}

impl ReRanker {
    pub fn with_config(config: ReRankConfig) -> Self {
        Self { config }
    }

    /// Best `top_n` hits, highest score first; ties keep retrieval order
    pub fn rerank(&self, documents: Vec<RetrievedDocument>, query: &str) -> Vec<RankedDocument> {
        let terms = match self.config.strategy {
            RankingStrategy::Hybrid => query_terms(query),
            RankingStrategy::Similarity => Vec::new(),
        };

        let mut ranked: Vec<RankedDocument> = documents
            .into_iter()
            .map(|document| {
                let term_boost = term_overlap(&terms, &document.content) * self.config.keyword_boost;
                RankedDocument {
                    score: document.score + term_boost,
                    term_boost,
                    document,
                }
            })
            .collect();

        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        ranked.truncate(self.config.top_n);
        ranked
    }
}

/// Lowercased query words longer than three characters
fn query_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3)
        .map(str::to_string)
        .collect()
}

/// Share of `terms` present in `content`, 0.0 to 1.0
fn term_overlap(terms: &[String], content: &str) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let content = content.to_lowercase();
    let found = terms.iter().filter(|t| content.contains(t.as_str())).count();
    found as f32 / terms.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, content: &str, score: f32) -> RetrievedDocument {
        RetrievedDocument {
            id: id.to_string(),
            content: content.to_string(),
            index: "laws".to_string(),
            score,
            metadata: serde_json::Map::new(),
        }
    }

    fn ids(ranked: &[RankedDocument]) -> Vec<&str> {
        ranked.iter().map(|r| r.document.id.as_str()).collect()
    }

    #[test]
    fn test_similarity_keeps_top_three() {
        let ranker = ReRanker::with_config(ReRankConfig {
            strategy: RankingStrategy::Similarity,
            ..ReRankConfig::default()
        });
        let hits = vec![
            hit("s1", "bail", 0.6),
            hit("s2", "bail", 0.9),
            hit("s3", "bail", 0.7),
            hit("s4", "bail", 0.5),
        ];

        let ranked = ranker.rerank(hits, "bail conditions");
        assert_eq!(ids(&ranked), vec!["s2", "s3", "s1"]);
        assert_eq!(ranked[0].score, 0.9);
        assert_eq!(ranked[0].term_boost, 0.0);

        let one = ranker.rerank(vec![hit("s1", "x", 0.4)], "q");
        assert_eq!(one.len(), 1);
    }

    #[test]
    fn test_equal_scores_keep_retrieval_order() {
        let ranker = ReRanker::with_config(ReRankConfig::default());
        let hits = vec![hit("first", "x", 0.5), hit("second", "y", 0.5)];
        assert_eq!(ids(&ranker.rerank(hits, "a")), vec!["first", "second"]);
    }

    #[test]
    fn test_hybrid_boost_promotes_matching_passage() {
        let ranker = ReRanker::with_config(ReRankConfig::default());
        let hits = vec![
            hit("generic", "general provisions", 0.80),
            hit("bail", "an application for bail must", 0.78),
        ];

        let ranked = ranker.rerank(hits, "How do I apply for bail?");
        assert_eq!(ranked[0].document.id, "bail");
        assert!(ranked[0].term_boost > 0.0);
        assert!(ranked[0].term_boost <= 0.1 + f32::EPSILON);
    }

    #[test]
    fn test_term_overlap() {
        assert_eq!(term_overlap(&query_terms("to be or"), "a to be or"), 0.0);
        assert_eq!(term_overlap(&query_terms("Bail application"), "the bail act 1977"), 0.5);
        assert_eq!(term_overlap(&query_terms("show cause bail"), "SHOW CAUSE and BAIL"), 1.0);
    }
}
