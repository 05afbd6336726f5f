//! In-memory BM25 index over one collection's passages.
//!
//! Built from a full `get_all` snapshot of the collection and never mutated afterwards;
//! a rebuild produces a new index that replaces the old one wholesale.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::errors::SecragError;
use crate::passage::{Passage, PassageMetadata};
use crate::store::PassageStore;

/// Whitespace split plus lowercasing, shared by index build and query.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(|t| t.to_lowercase()).collect()
}

/// Okapi BM25 over a fixed passage snapshot.
#[derive(Debug, Clone)]
pub struct Bm25Index {
    passages: Vec<Passage>,
    doc_lengths: Vec<u32>,
    /// term -> (passage index, term frequency)
    postings: HashMap<String, Vec<(usize, u32)>>,
    avg_doc_len: f64,
    k1: f64,
    b: f64,
}

impl Bm25Index {
    /// Build from index-aligned documents and metadata.
    pub fn build(documents: Vec<String>, metadata: Vec<PassageMetadata>, k1: f64, b: f64) -> Self {
        if documents.len() != metadata.len() {
            tracing::warn!(
                documents = documents.len(),
                metadata = metadata.len(),
                "Document and metadata counts differ, indexing the aligned prefix"
            );
        }

        let mut passages = Vec::with_capacity(documents.len());
        let mut doc_lengths = Vec::with_capacity(documents.len());
        let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();

        for (idx, (content, meta)) in documents.into_iter().zip(metadata).enumerate() {
            let tokens = tokenize(&content);
            doc_lengths.push(tokens.len() as u32);

            let mut term_freqs: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *term_freqs.entry(token).or_insert(0) += 1;
            }
            for (term, freq) in term_freqs {
                postings.entry(term).or_default().push((idx, freq));
            }
            passages.push(Passage::new(content, meta));
        }

        let total: u64 = doc_lengths.iter().map(|&l| l as u64).sum();
        let avg_doc_len = if doc_lengths.is_empty() {
            0.0
        } else {
            total as f64 / doc_lengths.len() as f64
        };

        Bm25Index {
            passages,
            doc_lengths,
            postings,
            avg_doc_len,
            k1,
            b,
        }
    }

    /// Snapshot a store and index it.
    pub async fn from_store(store: &dyn PassageStore, k1: f64, b: f64) -> Result<Self, SecragError> {
        let (documents, metadata) = store.get_all().await?;
        let index = Self::build(documents, metadata, k1, b);
        tracing::debug!(passages = index.len(), terms = index.postings.len(), "Built BM25 index");
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    fn idf(&self, doc_freq: usize) -> f64 {
        let n = self.passages.len() as f64;
        let df = doc_freq as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Score passages against pre-tokenized query terms.
    ///
    /// Returns at most `top_k` passages with a strictly positive score, best first;
    /// equal scores are ordered by file path, then start line.
    pub fn search(&self, query_tokens: &[String], top_k: usize) -> Vec<(Passage, f64)> {
        if self.passages.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let avg_len = if self.avg_doc_len > 0.0 { self.avg_doc_len } else { 1.0 };

        let mut scores: HashMap<usize, f64> = HashMap::new();
        for term in query_tokens {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let idf = self.idf(postings.len());
            for &(idx, tf) in postings {
                let tf = tf as f64;
                let doc_len = self.doc_lengths[idx] as f64;
                let norm = self.k1 * (1.0 - self.b + self.b * doc_len / avg_len);
                *scores.entry(idx).or_insert(0.0) += idf * (tf * (self.k1 + 1.0)) / (tf + norm);
            }
        }

        let mut ranked: Vec<(usize, f64)> = scores.into_iter().filter(|&(_, s)| s > 0.0).collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| {
                let (pa, pb) = (&self.passages[a.0].metadata, &self.passages[b.0].metadata);
                pa.file_path
                    .cmp(&pb.file_path)
                    .then(pa.start_line.cmp(&pb.start_line))
                    .then(pa.end_line.cmp(&pb.end_line))
            })
        });
        ranked.truncate(top_k);

        ranked
            .into_iter()
            .map(|(idx, score)| (self.passages[idx].clone(), score))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passage::ChunkType;
    use chrono::Utc;

    fn meta(path: &str, start: u32) -> PassageMetadata {
        PassageMetadata {
            file_path: path.to_string(),
            symbol_name: String::new(),
            symbol_type: String::new(),
            start_line: start,
            end_line: start + 5,
            language: "markdown".to_string(),
            revision: "r1".to_string(),
            module_path: String::new(),
            chunk_type: ChunkType::Docs,
            last_modified: Utc::now(),
        }
    }

    fn index() -> Bm25Index {
        Bm25Index::build(
            vec![
                "rotate the API signing key every 90 days".to_string(),
                "the SIEM forwards alerts to the triage queue".to_string(),
                "signing key rotation runbook: revoke old signing key".to_string(),
            ],
            vec![meta("docs/keys.md", 1), meta("docs/siem.md", 1), meta("docs/runbook.md", 10)],
            1.5,
            0.75,
        )
    }

    #[test]
    fn test_tokenize_whitespace_lowercase() {
        assert_eq!(tokenize("  Rotate   the\tKEY\n"), vec!["rotate", "the", "key"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_search_ranks_by_term_frequency() {
        let idx = index();
        let hits = idx.search(&tokenize("signing key"), 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.metadata.file_path, "docs/runbook.md");
        assert_eq!(hits[1].0.metadata.file_path, "docs/keys.md");
        assert!(hits[0].1 > hits[1].1);
        assert!(hits.iter().all(|(_, s)| *s > 0.0));
    }

    #[test]
    fn test_search_only_positive_scores() {
        let idx = index();
        assert!(idx.search(&tokenize("kubernetes"), 10).is_empty());
        assert!(idx.search(&[], 10).is_empty());
    }

    #[test]
    fn test_search_respects_top_k() {
        let idx = index();
        assert_eq!(idx.search(&tokenize("the key"), 1).len(), 1);
        assert!(idx.search(&tokenize("the key"), 0).is_empty());
    }

    #[test]
    fn test_empty_index() {
        let idx = Bm25Index::build(Vec::new(), Vec::new(), 1.5, 0.75);
        assert!(idx.is_empty());
        assert!(idx.search(&tokenize("anything"), 5).is_empty());
    }

    #[test]
    fn test_idf_always_positive() {
        // A term present in every passage still contributes a positive score
        let idx = Bm25Index::build(
            vec!["alert".to_string(), "alert".to_string()],
            vec![meta("a.md", 1), meta("b.md", 1)],
            1.5,
            0.75,
        );
        let hits = idx.search(&tokenize("alert"), 5);
        assert_eq!(hits.len(), 2);
        // Equal scores fall back to path order
        assert_eq!(hits[0].0.metadata.file_path, "a.md");
    }
}
