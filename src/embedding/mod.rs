/// Embedding providers and the dual (code/prose) embedder
///
/// A passage or query is embedded with exactly one of two representations: a code
/// model for source code in a recognized language, a prose model for everything else.
/// Providers are pluggable: local fastembed models (default, no API key) or an
/// OpenAI-compatible API.

pub mod local;
pub mod openai;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::passage::ChunkType;
use crate::rerank::Reranker;
use crate::rerank::local::LocalReranker;
use crate::search::{compare_position, RetrievalCandidate};

use self::local::LocalEmbeddingProvider;
use self::openai::OpenAIEmbeddingProvider;

/// Errors that can occur during embedding operations.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    /// fastembed model initialization failure
    #[error("Model initialization error: {0}")]
    ModelInit(String),

    /// Embedding generation failure (inference error, degenerate vector)
    #[error("Embedding generation error: {0}")]
    Generation(String),

    /// API provider returned an HTTP error
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// No provider configured for the requested representation
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Which model family produced a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    Code,
    Prose,
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Representation::Code => write!(f, "code"),
            Representation::Prose => write!(f, "prose"),
        }
    }
}

/// An L2-normalized vector tagged with the representation it belongs to.
///
/// Vectors of different representations live in different spaces and are never compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "representation", content = "vector", rename_all = "lowercase")]
pub enum Embedding {
    Code(Vec<f32>),
    Prose(Vec<f32>),
}

impl Embedding {
    pub fn representation(&self) -> Representation {
        match self {
            Embedding::Code(_) => Representation::Code,
            Embedding::Prose(_) => Representation::Prose,
        }
    }

    pub fn vector(&self) -> &[f32] {
        match self {
            Embedding::Code(v) | Embedding::Prose(v) => v,
        }
    }

    /// Cosine similarity, or None when the representations or dimensions differ.
    ///
    /// Both sides are unit length, so this is the inner product.
    pub fn similarity(&self, other: &Embedding) -> Option<f32> {
        match (self, other) {
            (Embedding::Code(a), Embedding::Code(b)) | (Embedding::Prose(a), Embedding::Prose(b)) => {
                if a.len() != b.len() {
                    return None;
                }
                Some(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
            }
            _ => None,
        }
    }
}

/// Caller hint for query embedding. `Code` and `Prose` force a model; `Auto` lets the
/// keyword heuristic decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryHint {
    #[default]
    Auto,
    Code,
    /// The searched collections hold prose only; a code vector could never match.
    Prose,
}

/// Core trait for embedding text into fixed-dimension float vectors.
///
/// Implementations must be Send + Sync to support use in async contexts
/// and across thread boundaries (e.g., Arc<dyn EmbeddingProvider>).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Return the model name identifier (e.g., "bge-small-en-v1.5").
    fn model_name(&self) -> &str;

    /// Return the dimension of the embedding vectors produced by this model.
    fn dimension(&self) -> usize;
}

const CODE_LANGUAGES: &[&str] = &[
    "rust", "python", "go", "golang", "javascript", "typescript", "tsx", "jsx", "java",
    "kotlin", "scala", "c", "cpp", "c++", "csharp", "c#", "ruby", "php", "swift", "shell",
    "bash", "sh", "powershell", "sql", "lua", "perl", "haskell", "elixir", "erlang",
];

const CODE_QUERY_TERMS: &[&str] = &[
    "function", "func", "fn", "def", "method", "class", "struct", "enum", "trait", "impl",
    "interface", "import", "module", "api", "endpoint", "signature", "return", "returns",
    "variable", "constructor", "callback", "exception",
];

const CODE_FILE_PATTERN: &str =
    r"\.(rs|py|go|js|jsx|ts|tsx|java|kt|scala|c|h|cc|cpp|hpp|cs|rb|php|swift|sh|ps1|sql|lua)\b";

/// Whether `language` names a programming language with a code embedding model.
pub fn is_code_language(language: &str) -> bool {
    let language = language.trim().to_lowercase();
    CODE_LANGUAGES.contains(&language.as_str())
}

/// Keyword heuristic deciding whether a free-text query is about code.
pub fn looks_like_code_query(text: &str) -> bool {
    let lowered = text.to_lowercase();
    if lowered.contains("::") || lowered.contains("()") || lowered.contains("->") {
        return true;
    }
    let has_term = lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|token| CODE_QUERY_TERMS.contains(&token));
    if has_term {
        return true;
    }
    Regex::new(CODE_FILE_PATTERN)
        .map(|re| re.is_match(&lowered))
        .unwrap_or(false)
}

/// Scale a vector to unit length. Zero or non-finite vectors are rejected.
pub fn l2_normalize(mut vector: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm <= f32::EPSILON {
        return Err(EmbeddingError::Generation(
            "cannot normalize a zero or non-finite vector".to_string(),
        ));
    }
    for x in &mut vector {
        *x /= norm;
    }
    Ok(vector)
}

/// Selects the code or prose provider per input and owns the optional reranker.
#[derive(Clone, Default)]
pub struct DualEmbedder {
    code: Option<Arc<dyn EmbeddingProvider>>,
    prose: Option<Arc<dyn EmbeddingProvider>>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl DualEmbedder {
    /// An embedder with no providers: every embedding is absent and vector search is skipped.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prose(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.prose = Some(provider);
        self
    }

    pub fn with_code(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.code = Some(provider);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn has_reranker(&self) -> bool {
        self.reranker.is_some()
    }

    /// Representation a passage is stored under.
    pub fn passage_representation(chunk_type: &ChunkType, language: &str) -> Representation {
        if *chunk_type == ChunkType::Code && is_code_language(language) {
            Representation::Code
        } else {
            Representation::Prose
        }
    }

    /// Representation a query is embedded under.
    pub fn query_representation(text: &str, hint: QueryHint) -> Representation {
        match hint {
            QueryHint::Code => Representation::Code,
            QueryHint::Prose => Representation::Prose,
            QueryHint::Auto if looks_like_code_query(text) => Representation::Code,
            QueryHint::Auto => Representation::Prose,
        }
    }

    /// Embed a passage; None when its representation has no working provider.
    pub async fn embed_passage(&self, content: &str, chunk_type: &ChunkType, language: &str) -> Option<Embedding> {
        let representation = Self::passage_representation(chunk_type, language);
        match self.embed_as(representation, content).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                tracing::warn!(
                    representation = %representation,
                    error = %e,
                    "Passage embedding unavailable"
                );
                None
            }
        }
    }

    /// Embed a query; None when its representation has no working provider.
    pub async fn embed_query(&self, text: &str, hint: QueryHint) -> Option<Embedding> {
        self.try_embed_query(text, hint).await.ok()
    }

    /// Like `embed_query`, but keeps the failure reason.
    pub async fn try_embed_query(&self, text: &str, hint: QueryHint) -> Result<Embedding, EmbeddingError> {
        let representation = Self::query_representation(text, hint);
        self.embed_as(representation, text).await
    }

    async fn embed_as(&self, representation: Representation, text: &str) -> Result<Embedding, EmbeddingError> {
        let provider = match representation {
            Representation::Code => self.code.as_ref(),
            Representation::Prose => self.prose.as_ref(),
        }
        .ok_or_else(|| EmbeddingError::NotConfigured(format!("no {} embedding provider", representation)))?;

        let vector = l2_normalize(provider.embed(text).await?)?;
        Ok(match representation {
            Representation::Code => Embedding::Code(vector),
            Representation::Prose => Embedding::Prose(vector),
        })
    }

    /// Reorder the head of a fused candidate list by pairwise relevance.
    ///
    /// Only the first `limit` candidates are scored and returned. Without a reranker,
    /// or when the reranker fails, the head keeps its incoming order.
    pub async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<RetrievalCandidate>,
        limit: usize,
    ) -> Vec<RetrievalCandidate> {
        candidates.truncate(limit);
        let reranker = match &self.reranker {
            Some(r) => r,
            None => return candidates,
        };
        if candidates.is_empty() {
            return candidates;
        }

        let documents: Vec<String> = candidates.iter().map(|c| c.passage.content.clone()).collect();
        match reranker.score(query, &documents).await {
            Ok(scores) if scores.len() == candidates.len() => {
                for (candidate, score) in candidates.iter_mut().zip(scores) {
                    candidate.rerank_score = Some(score as f64);
                }
                candidates.sort_by(|a, b| {
                    let (sa, sb) = (a.rerank_score.unwrap_or(f64::MIN), b.rerank_score.unwrap_or(f64::MIN));
                    sb.partial_cmp(&sa)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| compare_position(a, b))
                });
                candidates
            }
            Ok(scores) => {
                tracing::warn!(
                    expected = candidates.len(),
                    got = scores.len(),
                    model = reranker.model_name(),
                    "Reranker returned wrong number of scores, keeping fused order"
                );
                candidates
            }
            Err(e) => {
                tracing::warn!(model = reranker.model_name(), error = %e, "Reranking failed, keeping fused order");
                candidates
            }
        }
    }
}

/// Build the dual embedder (and reranker) described by the configuration.
///
/// A provider that fails to initialize is left out with a warning: queries then run
/// without that representation instead of failing.
pub async fn build_embedder(config: &Config) -> DualEmbedder {
    let mut embedder = DualEmbedder::new();
    let cfg = &config.embedding;

    match cfg.provider.as_str() {
        "openai" => {
            let provider = cfg
                .openai_api_key
                .clone()
                .ok_or_else(|| EmbeddingError::NotConfigured(
                    "OpenAI API key required when provider is 'openai'. \
                     Set SECRAG_EMBEDDING__OPENAI_API_KEY or embedding.openai_api_key in secrag.toml"
                        .to_string(),
                ))
                .and_then(|key| {
                    OpenAIEmbeddingProvider::new(key, cfg.openai_base_url.clone(), cfg.openai_model.clone())
                });
            match provider {
                Ok(p) => {
                    // One remote model serves both representations.
                    let p: Arc<dyn EmbeddingProvider> = Arc::new(p);
                    embedder = embedder.with_prose(p.clone()).with_code(p);
                }
                Err(e) => tracing::warn!(error = %e, "OpenAI embedding provider unavailable"),
            }
        }
        // "local" and anything unrecognized
        _ => {
            match LocalEmbeddingProvider::new(&cfg.cache_dir, &cfg.prose_model).await {
                Ok(p) => embedder = embedder.with_prose(Arc::new(p)),
                Err(e) => tracing::warn!(model = %cfg.prose_model, error = %e, "Prose embedding model unavailable"),
            }
            match LocalEmbeddingProvider::new(&cfg.cache_dir, &cfg.code_model).await {
                Ok(p) => embedder = embedder.with_code(Arc::new(p)),
                Err(e) => tracing::warn!(model = %cfg.code_model, error = %e, "Code embedding model unavailable"),
            }
        }
    }

    if config.reranker.enabled {
        match LocalReranker::new(&config.reranker.cache_dir, &config.reranker.model).await {
            Ok(r) => {
                tracing::info!(model = %config.reranker.model, "Reranking enabled");
                embedder = embedder.with_reranker(Arc::new(r));
            }
            Err(e) => tracing::warn!(error = %e, "Failed to init reranker, reranking disabled"),
        }
    }

    embedder
}
