/// The hybrid search engine: route, embed once, fan out, fuse, bias, rerank, cut.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use super::collection::Collection;
use super::fusion::{self, Sighting};
use super::subsearch::{lexical_search, vector_search};
use super::{Query, RetrievalCandidate, SearchError, SearchReport, SubSearchFailure};
use crate::config::RetrievalConfig;
use crate::embedding::{DualEmbedder, Embedding, EmbeddingError, QueryHint};
use crate::errors::SecragError;
use crate::lexical::tokenize;
use crate::routing::{route, PolicyKind, SearchMethod};

/// Representation to embed the query under, given where the policy will search.
///
/// The docs policy searches docs and config only, which are embedded as prose.
fn query_hint(kind: PolicyKind) -> QueryHint {
    match kind {
        PolicyKind::Code => QueryHint::Code,
        PolicyKind::Docs => QueryHint::Prose,
        PolicyKind::ConfigDeploy | PolicyKind::Hybrid => QueryHint::Auto,
    }
}

/// One dispatched sub-search.
struct Dispatch {
    collection: Collection,
    method: SearchMethod,
}

pub struct HybridSearchEngine {
    collections: BTreeMap<String, Collection>,
    embedder: Arc<DualEmbedder>,
    config: RetrievalConfig,
}

impl HybridSearchEngine {
    pub fn new(embedder: Arc<DualEmbedder>, config: RetrievalConfig) -> Self {
        HybridSearchEngine {
            collections: BTreeMap::new(),
            embedder,
            config,
        }
    }

    pub fn with_collection(mut self, collection: Collection) -> Self {
        self.add_collection(collection);
        self
    }

    /// Register or replace a collection under its name.
    pub fn add_collection(&mut self, collection: Collection) {
        self.collections.insert(collection.name().to_string(), collection);
    }

    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Rebuild every collection's lexical index with the configured BM25 parameters.
    pub async fn rebuild_lexical_indexes(&self) -> Result<(), SecragError> {
        for collection in self.collections.values() {
            collection
                .rebuild_lexical_index(self.config.bm25_k1, self.config.bm25_b)
                .await?;
        }
        Ok(())
    }

    /// Convenience entry point returning only the ranked candidates.
    pub async fn hybrid_search(
        &self,
        query_text: &str,
        context: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievalCandidate>, SecragError> {
        let mut query = Query::new(query_text).with_top_k(top_k);
        query.context = context.map(str::to_string);
        Ok(self.search(&query).await?.candidates)
    }

    /// Run the full retrieval pipeline for one query.
    ///
    /// Only invalid input is an error. Sub-searches that fail, time out or cannot run
    /// contribute nothing and are listed in the report. With a reranker configured the
    /// list is cut to `rerank_top_k` before `top_k`, so a larger `top_k` returns at most
    /// `rerank_top_k` candidates.
    pub async fn search(&self, query: &Query) -> Result<SearchReport, SecragError> {
        let text = query.text.trim();
        if text.is_empty() {
            return Err(SecragError::validation("query", "Query text cannot be empty"));
        }
        let top_k = query.top_k.unwrap_or(self.config.top_k_final);
        if top_k == 0 {
            return Err(SecragError::validation("top_k", "top_k must be greater than 0"));
        }

        let policy = route(text);
        tracing::debug!(policy = ?policy.kind, collections = ?policy.collections, "Query routed");

        let mut failures = Vec::new();

        // Collections the policy names but the engine does not have are skipped quietly.
        let targets: Vec<&Collection> = policy
            .collections
            .iter()
            .filter_map(|name| {
                let found = self.collections.get(name);
                if found.is_none() {
                    tracing::debug!(collection = %name, "Collection not configured, skipping");
                }
                found
            })
            .collect();

        let embedding = if policy.uses(SearchMethod::Vector) && !targets.is_empty() {
            let hint = query_hint(policy.kind);
            match self.embedder.try_embed_query(text, hint).await {
                Ok(embedding) => Some(Arc::new(embedding)),
                Err(e) => {
                    match &e {
                        EmbeddingError::NotConfigured(_) => {
                            tracing::debug!(error = %e, "No query embedding, vector search skipped")
                        }
                        _ => tracing::warn!(error = %e, "Query embedding failed, vector search skipped"),
                    }
                    for collection in &targets {
                        failures.push(SubSearchFailure {
                            collection: collection.name().to_string(),
                            method: SearchMethod::Vector,
                            error: SearchError::EmbeddingUnavailable(e.to_string()),
                        });
                    }
                    None
                }
            }
        } else {
            None
        };

        let lexical = policy.uses(SearchMethod::Lexical) && self.config.lexical_enabled;
        if policy.uses(SearchMethod::Lexical) && !self.config.lexical_enabled {
            tracing::debug!("Lexical search disabled by configuration");
        }
        let tokens = Arc::new(tokenize(text));

        // Dispatch order: policy collection order, vector before lexical.
        let mut dispatches = Vec::new();
        for collection in &targets {
            if embedding.is_some() {
                dispatches.push(Dispatch {
                    collection: (*collection).clone(),
                    method: SearchMethod::Vector,
                });
            }
            if lexical {
                dispatches.push(Dispatch {
                    collection: (*collection).clone(),
                    method: SearchMethod::Lexical,
                });
            }
        }

        let results = self.run_dispatches(&dispatches, embedding, tokens).await;

        let mut sightings = Vec::new();
        for (dispatch, result) in dispatches.iter().zip(results) {
            match result {
                Ok(hits) => sightings.extend(hits),
                Err(error) => {
                    tracing::warn!(
                        collection = %dispatch.collection.name(),
                        method = %dispatch.method,
                        error = %error,
                        "Sub-search failed, continuing without it"
                    );
                    failures.push(SubSearchFailure {
                        collection: dispatch.collection.name().to_string(),
                        method: dispatch.method,
                        error,
                    });
                }
            }
        }

        let mut candidates = fusion::fuse(sightings, self.config.vector_weight, self.config.bm25_weight);

        if policy.apply_structural_bias {
            fusion::apply_structural_bias(
                &mut candidates,
                query.context.as_deref(),
                query.module.as_deref(),
                self.config.same_module_boost,
                self.config.same_file_boost,
            );
        }
        if policy.prefer_symbol_hits {
            fusion::apply_symbol_preference(&mut candidates, text, self.config.symbol_match_boost);
        }

        if self.embedder.has_reranker() {
            candidates = self.embedder.rerank(text, candidates, self.config.rerank_top_k).await;
        }

        let fused = candidates.len();
        candidates.retain(|c| c.final_score >= self.config.score_threshold);
        candidates.truncate(top_k);

        tracing::info!(
            policy = ?policy.kind,
            sub_searches = dispatches.len(),
            failures = failures.len(),
            fused,
            returned = candidates.len(),
            "Hybrid search complete"
        );

        Ok(SearchReport {
            candidates,
            policy,
            failures,
        })
    }

    /// Run all sub-searches concurrently; results come back in dispatch order.
    async fn run_dispatches(
        &self,
        dispatches: &[Dispatch],
        embedding: Option<Arc<Embedding>>,
        tokens: Arc<Vec<String>>,
    ) -> Vec<Result<Vec<Sighting>, SearchError>> {
        let timeout_ms = self.config.collection_timeout_ms;
        let mut set = JoinSet::new();

        for (slot, dispatch) in dispatches.iter().enumerate() {
            let collection = dispatch.collection.clone();
            let method = dispatch.method;
            let embedding = embedding.clone();
            let tokens = Arc::clone(&tokens);
            let (top_k_vector, top_k_bm25) = (self.config.top_k_vector, self.config.top_k_bm25);

            set.spawn(async move {
                let work = async {
                    match method {
                        SearchMethod::Vector => match embedding.as_deref() {
                            Some(embedding) => vector_search(embedding, &collection, top_k_vector).await,
                            None => Err(SearchError::EmbeddingUnavailable("no query embedding".to_string())),
                        },
                        SearchMethod::Lexical => Ok(lexical_search(&tokens, &collection, top_k_bm25).await),
                    }
                };
                let result = match tokio::time::timeout(Duration::from_millis(timeout_ms), work).await {
                    Ok(result) => result,
                    Err(_) => Err(SearchError::Timeout {
                        collection: collection.name().to_string(),
                        ms: timeout_ms,
                    }),
                };
                (slot, result)
            });
        }

        let mut results: Vec<Option<Result<Vec<Sighting>, SearchError>>> = vec![None; dispatches.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((slot, result)) => results[slot] = Some(result),
                Err(e) => tracing::warn!(error = %e, "Sub-search task aborted"),
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(SearchError::Task("sub-search task panicked or was cancelled".to_string()))))
            .collect()
    }
}
