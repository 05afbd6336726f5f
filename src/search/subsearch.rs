/// Per-collection vector and lexical sub-searches.

use std::cmp::Ordering;

use super::collection::Collection;
use super::fusion::Sighting;
use super::SearchError;
use crate::embedding::Embedding;
use crate::routing::SearchMethod;

/// Nearest neighbors in one collection, scored as `clamp(1 - distance, 0, 1)`.
///
/// At most `top_k` sightings, best first, ties by file path then start line.
pub async fn vector_search(
    embedding: &Embedding,
    collection: &Collection,
    top_k: usize,
) -> Result<Vec<Sighting>, SearchError> {
    if top_k == 0 {
        return Ok(Vec::new());
    }
    let matches = collection
        .store()
        .query(embedding, top_k)
        .await
        .map_err(|e| SearchError::Store(e.to_string()))?;

    let mut sightings: Vec<Sighting> = matches
        .into_iter()
        .map(|m| Sighting {
            passage: m.passage,
            collection: collection.name().to_string(),
            method: SearchMethod::Vector,
            score: (1.0 - m.distance).clamp(0.0, 1.0),
        })
        .collect();

    sightings.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.passage.metadata.file_path.cmp(&b.passage.metadata.file_path))
            .then(a.passage.metadata.start_line.cmp(&b.passage.metadata.start_line))
    });
    sightings.truncate(top_k);
    Ok(sightings)
}

/// BM25 hits in one collection. No index means no hits, never an error.
pub async fn lexical_search(query_tokens: &[String], collection: &Collection, top_k: usize) -> Vec<Sighting> {
    let Some(index) = collection.lexical_index().await else {
        tracing::debug!(collection = %collection.name(), "No lexical index, skipping BM25");
        return Vec::new();
    };
    index
        .search(query_tokens, top_k)
        .into_iter()
        .map(|(passage, score)| Sighting {
            passage,
            collection: collection.name().to_string(),
            method: SearchMethod::Lexical,
            score,
        })
        .collect()
}
