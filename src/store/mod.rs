/// Passage store abstraction layer
///
/// A `PassageStore` is one collection's vector store: passages keyed by their
/// deterministic id, with an optional embedding each. The ingestion side writes through
/// `upsert`; the search engine only reads (`query`, `get_all`).

use async_trait::async_trait;

use crate::embedding::{DualEmbedder, Embedding};
use crate::errors::SecragError;
use crate::passage::{Passage, PassageMetadata};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryPassageStore;
pub use postgres::PostgresPassageStore;

/// A passage returned by nearest-neighbor search.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub passage: Passage,
    /// Cosine distance to the query vector (0 = identical direction)
    pub distance: f64,
}

/// Core abstraction for one collection's passage persistence.
///
/// All implementations must be Send + Sync; the engine shares them across sub-search tasks.
#[async_trait]
pub trait PassageStore: Send + Sync {
    /// Insert or fully replace passages, idempotent by id.
    ///
    /// All four slices are index-aligned. A `None` embedding stores the passage
    /// without vector support (it stays visible to `get_all` and thus to BM25).
    async fn upsert(
        &self,
        ids: &[String],
        documents: &[String],
        embeddings: &[Option<Embedding>],
        metadata: &[PassageMetadata],
    ) -> Result<(), SecragError>;

    /// Nearest neighbors of `embedding` among passages of the same representation,
    /// closest first, at most `top_k`.
    async fn query(&self, embedding: &Embedding, top_k: usize) -> Result<Vec<VectorMatch>, SecragError>;

    /// Every passage in the collection as index-aligned (documents, metadata).
    async fn get_all(&self) -> Result<(Vec<String>, Vec<PassageMetadata>), SecragError>;

    /// Number of passages in the collection.
    async fn count(&self) -> Result<usize, SecragError>;
}

/// Reject upsert batches whose slices are not index-aligned.
pub fn validate_upsert(
    ids: &[String],
    documents: &[String],
    embeddings: &[Option<Embedding>],
    metadata: &[PassageMetadata],
) -> Result<(), SecragError> {
    let n = ids.len();
    if documents.len() != n || embeddings.len() != n || metadata.len() != n {
        return Err(SecragError::Validation {
            message: format!(
                "Upsert arrays must have equal length (ids={}, documents={}, embeddings={}, metadata={})",
                n,
                documents.len(),
                embeddings.len(),
                metadata.len()
            ),
            field: None,
        });
    }
    if ids.iter().any(|id| id.trim().is_empty()) {
        return Err(SecragError::validation("ids", "Passage ids cannot be empty"));
    }
    Ok(())
}

/// Embed and upsert a batch of passages the way the ingestion pipeline does.
///
/// Ids are derived from each passage's identity fields. Passages whose embedding is
/// unavailable are stored without a vector. Returns how many passages got a vector.
pub async fn upsert_passages(
    store: &dyn PassageStore,
    embedder: &DualEmbedder,
    passages: &[Passage],
) -> Result<usize, SecragError> {
    let mut ids = Vec::with_capacity(passages.len());
    let mut documents = Vec::with_capacity(passages.len());
    let mut embeddings = Vec::with_capacity(passages.len());
    let mut metadata = Vec::with_capacity(passages.len());

    for passage in passages {
        passage.metadata.validate()?;
        let embedding = embedder
            .embed_passage(&passage.content, &passage.metadata.chunk_type, &passage.metadata.language)
            .await;
        ids.push(passage.id());
        documents.push(passage.content.clone());
        embeddings.push(embedding);
        metadata.push(passage.metadata.clone());
    }

    let embedded = embeddings.iter().filter(|e| e.is_some()).count();
    store.upsert(&ids, &documents, &embeddings, &metadata).await?;

    if embedded < passages.len() {
        tracing::warn!(
            total = passages.len(),
            embedded,
            "Some passages were stored without an embedding"
        );
    }
    Ok(embedded)
}
