/// Pairwise (cross-encoder) relevance reranking
///
/// A reranker scores each (query, document) pair independently. Scores are only
/// comparable within a single call. The dual embedder decides how many candidates
/// are handed over, so implementations never see more than the configured head.

pub mod local;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during reranking.
#[derive(Debug, Error)]
pub enum RerankError {
    /// Model download or load failure
    #[error("Reranker initialization error: {0}")]
    ModelInit(String),

    /// Scoring failure
    #[error("Reranker inference error: {0}")]
    Inference(String),

    /// Unsupported or missing model name
    #[error("Reranker not configured: {0}")]
    NotConfigured(String),
}

/// Core trait for pairwise relevance scoring.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score every document against the query. The result is index-aligned with `documents`.
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RerankError>;

    /// Return the model name identifier used by this reranker.
    fn model_name(&self) -> &str;
}
