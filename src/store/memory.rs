/// In-memory passage store with brute-force cosine search.
///
/// Suitable for tests and small corpora. Passages are kept in id order so `get_all`
/// is deterministic.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{validate_upsert, PassageStore, VectorMatch};
use crate::embedding::Embedding;
use crate::errors::SecragError;
use crate::passage::{Passage, PassageMetadata};

#[derive(Debug, Clone)]
struct StoredPassage {
    passage: Passage,
    embedding: Option<Embedding>,
}

#[derive(Debug, Default)]
pub struct InMemoryPassageStore {
    passages: RwLock<BTreeMap<String, StoredPassage>>,
}

impl InMemoryPassageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PassageStore for InMemoryPassageStore {
    async fn upsert(
        &self,
        ids: &[String],
        documents: &[String],
        embeddings: &[Option<Embedding>],
        metadata: &[PassageMetadata],
    ) -> Result<(), SecragError> {
        validate_upsert(ids, documents, embeddings, metadata)?;

        let mut passages = self.passages.write().await;
        for (((id, document), embedding), meta) in ids.iter().zip(documents).zip(embeddings).zip(metadata) {
            passages.insert(
                id.clone(),
                StoredPassage {
                    passage: Passage::new(document.clone(), meta.clone()),
                    embedding: embedding.clone(),
                },
            );
        }
        Ok(())
    }

    async fn query(&self, embedding: &Embedding, top_k: usize) -> Result<Vec<VectorMatch>, SecragError> {
        let passages = self.passages.read().await;
        let mut matches: Vec<VectorMatch> = passages
            .values()
            .filter_map(|stored| {
                let similarity = stored.embedding.as_ref()?.similarity(embedding)?;
                Some(VectorMatch {
                    passage: stored.passage.clone(),
                    distance: 1.0 - similarity as f64,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.passage.metadata.file_path.cmp(&b.passage.metadata.file_path))
                .then(a.passage.metadata.start_line.cmp(&b.passage.metadata.start_line))
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn get_all(&self) -> Result<(Vec<String>, Vec<PassageMetadata>), SecragError> {
        let passages = self.passages.read().await;
        Ok(passages
            .values()
            .map(|stored| (stored.passage.content.clone(), stored.passage.metadata.clone()))
            .unzip())
    }

    async fn count(&self) -> Result<usize, SecragError> {
        Ok(self.passages.read().await.len())
    }
}
