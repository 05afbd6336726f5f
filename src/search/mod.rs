/// Hybrid search: candidate types, the query object and the search engine.
///
/// The engine fans a query out to per-collection vector and lexical sub-searches,
/// fuses the sightings into `RetrievalCandidate`s, applies structural bias and
/// optional reranking, then thresholds and truncates.

pub mod collection;
pub mod engine;
pub mod fusion;
pub mod subsearch;

pub use collection::Collection;
pub use engine::HybridSearchEngine;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

use crate::passage::Passage;
use crate::routing::{Policy, SearchMethod};

/// How a candidate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Vector,
    Lexical,
    /// Sighted by both vector and lexical search
    Hybrid,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMethod::Vector => write!(f, "vector"),
            MatchMethod::Lexical => write!(f, "lexical"),
            MatchMethod::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl From<SearchMethod> for MatchMethod {
    fn from(method: SearchMethod) -> Self {
        match method {
            SearchMethod::Vector => MatchMethod::Vector,
            SearchMethod::Lexical => MatchMethod::Lexical,
        }
    }
}

/// A passage with its scores, as produced by fusion and refined by later stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub passage: Passage,
    /// Collection the passage was first sighted in
    pub collection: String,
    /// Best vector similarity over all sightings, in [0, 1]
    pub vector_score: f64,
    /// Best BM25 score over all sightings, >= 0
    pub bm25_score: f64,
    /// Cross-encoder score; only comparable within one query
    pub rerank_score: Option<f64>,
    pub final_score: f64,
    pub method: MatchMethod,
}

impl RetrievalCandidate {
    /// Fusion key: two sightings with the same key are the same passage.
    pub fn position_key(&self) -> (&str, u32, u32) {
        let m = &self.passage.metadata;
        (m.file_path.as_str(), m.start_line, m.end_line)
    }
}

/// Tie-break order shared by every sort in the pipeline: file path, start line, end line.
pub fn compare_position(a: &RetrievalCandidate, b: &RetrievalCandidate) -> Ordering {
    a.position_key().cmp(&b.position_key())
}

/// Final score descending, then position.
pub fn compare_candidates(a: &RetrievalCandidate, b: &RetrievalCandidate) -> Ordering {
    b.final_score
        .partial_cmp(&a.final_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| compare_position(a, b))
}

pub fn sort_candidates(candidates: &mut [RetrievalCandidate]) {
    candidates.sort_by(compare_candidates);
}

/// A search request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    /// Free text the user is looking at (open file, selection); enables same-file bias
    pub context: Option<String>,
    /// Dotted module identifier the user is working in; enables same-module bias
    pub module: Option<String>,
    /// Result bound; falls back to `top_k_final`
    pub top_k: Option<usize>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Query {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

/// Why a single sub-search contributed nothing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Query embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Sub-search in collection '{collection}' timed out after {ms} ms")]
    Timeout { collection: String, ms: u64 },

    #[error("Sub-search task failed: {0}")]
    Task(String),
}

/// One isolated sub-search failure.
#[derive(Debug, Clone, PartialEq)]
pub struct SubSearchFailure {
    pub collection: String,
    pub method: SearchMethod,
    pub error: SearchError,
}

/// Everything a query produced: the ranked candidates, the routing decision, and
/// the sub-searches that were skipped or failed along the way.
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub candidates: Vec<RetrievalCandidate>,
    pub policy: Policy,
    pub failures: Vec<SubSearchFailure>,
}

impl SearchReport {
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use crate::passage::{ChunkType, PassageMetadata};
    use chrono::{TimeZone, Utc};

    pub fn candidate(path: &str, start: u32, final_score: f64) -> RetrievalCandidate {
        RetrievalCandidate {
            passage: Passage::new(
                format!("content of {}", path),
                PassageMetadata {
                    file_path: path.to_string(),
                    symbol_name: String::new(),
                    symbol_type: String::new(),
                    start_line: start,
                    end_line: start + 9,
                    language: "rust".to_string(),
                    revision: "r1".to_string(),
                    module_path: String::new(),
                    chunk_type: ChunkType::Code,
                    last_modified: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                },
            ),
            collection: "code".to_string(),
            vector_score: final_score,
            bm25_score: 0.0,
            rerank_score: None,
            final_score,
            method: MatchMethod::Vector,
        }
    }

    /// `n` candidates with distinct paths, already in fused order.
    pub fn candidates(n: usize) -> Vec<RetrievalCandidate> {
        (0..n)
            .map(|i| candidate(&format!("src/file_{:02}.rs", i), 1, 1.0 - i as f64 * 0.05))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::tests_support::candidate;
    use super::*;

    #[test]
    fn test_sort_tie_break() {
        let mut list = vec![
            candidate("b.rs", 1, 0.5),
            candidate("a.rs", 20, 0.5),
            candidate("a.rs", 3, 0.5),
            candidate("z.rs", 1, 0.9),
        ];
        sort_candidates(&mut list);
        let keys: Vec<_> = list.iter().map(|c| (c.passage.metadata.file_path.clone(), c.passage.metadata.start_line)).collect();
        assert_eq!(
            keys,
            vec![
                ("z.rs".to_string(), 1),
                ("a.rs".to_string(), 3),
                ("a.rs".to_string(), 20),
                ("b.rs".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_query_builder() {
        let q = Query::new("where is validate_token")
            .with_context("src/auth/token.rs")
            .with_module("auth.token")
            .with_top_k(3);
        assert_eq!(q.top_k, Some(3));
        assert_eq!(q.context.as_deref(), Some("src/auth/token.rs"));
        assert_eq!(q.module.as_deref(), Some("auth.token"));
        assert_eq!(Query::new("x").top_k, None);
    }

    #[test]
    fn test_search_error_display() {
        let e = SearchError::Timeout { collection: "docs".to_string(), ms: 250 };
        assert_eq!(e.to_string(), "Sub-search in collection 'docs' timed out after 250 ms");
    }
}
