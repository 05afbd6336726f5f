/// A named partition of passages: one vector store plus an optional BM25 index.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::errors::SecragError;
use crate::lexical::Bm25Index;
use crate::store::PassageStore;

/// Shared handle to one collection. Cloning is cheap; clones see the same store and
/// the same lexical index slot.
#[derive(Clone)]
pub struct Collection {
    name: String,
    store: Arc<dyn PassageStore>,
    lexical: Arc<RwLock<Option<Arc<Bm25Index>>>>,
}

impl Collection {
    /// A collection without a lexical index; BM25 returns nothing until one is built.
    pub fn new(name: impl Into<String>, store: Arc<dyn PassageStore>) -> Self {
        Collection {
            name: name.into(),
            store,
            lexical: Arc::new(RwLock::new(None)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn PassageStore> {
        &self.store
    }

    /// Rebuild the BM25 index from the store's current passages.
    ///
    /// The new index is built off to the side and swapped in at once; queries in
    /// flight keep the index they started with. Returns the indexed passage count.
    pub async fn rebuild_lexical_index(&self, k1: f64, b: f64) -> Result<usize, SecragError> {
        let index = Bm25Index::from_store(self.store.as_ref(), k1, b).await?;
        let count = index.len();
        *self.lexical.write().await = Some(Arc::new(index));
        tracing::info!(collection = %self.name, passages = count, "Lexical index rebuilt");
        Ok(count)
    }

    pub async fn clear_lexical_index(&self) {
        *self.lexical.write().await = None;
        tracing::debug!(collection = %self.name, "Lexical index cleared");
    }

    /// Current index snapshot, if one has been built.
    pub async fn lexical_index(&self) -> Option<Arc<Bm25Index>> {
        self.lexical.read().await.clone()
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection").field("name", &self.name).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::tokenize;
    use crate::passage::{ChunkType, PassageMetadata};
    use crate::store::InMemoryPassageStore;
    use chrono::Utc;

    #[tokio::test]
    async fn test_rebuild_and_clear_lexical_index() {
        let store = Arc::new(InMemoryPassageStore::new());
        let meta = PassageMetadata {
            file_path: "docs/triage.md".to_string(),
            symbol_name: String::new(),
            symbol_type: String::new(),
            start_line: 1,
            end_line: 4,
            language: "markdown".to_string(),
            revision: "r1".to_string(),
            module_path: String::new(),
            chunk_type: ChunkType::Docs,
            last_modified: Utc::now(),
        };
        store
            .upsert(&[meta.id()], &["triage phishing alerts".to_string()], &[None], &[meta])
            .await
            .unwrap();

        let collection = Collection::new("docs", store);
        assert!(collection.lexical_index().await.is_none());

        assert_eq!(collection.rebuild_lexical_index(1.5, 0.75).await.unwrap(), 1);
        let index = collection.lexical_index().await.unwrap();
        assert_eq!(index.search(&tokenize("phishing"), 5).len(), 1);

        // Clones share the index slot
        let clone = collection.clone();
        clone.clear_lexical_index().await;
        assert!(collection.lexical_index().await.is_none());
        // A snapshot taken earlier stays usable
        assert_eq!(index.len(), 1);
    }
}
