/// Score fusion and post-fusion score adjustments.
///
/// All functions here are pure: they take sightings or candidates and return or
/// mutate scores without I/O.

use std::collections::{BTreeSet, HashMap};

use super::{sort_candidates, MatchMethod, RetrievalCandidate};
use crate::passage::Passage;
use crate::routing::SearchMethod;

/// One hit from one sub-search, before fusion.
#[derive(Debug, Clone)]
pub struct Sighting {
    pub passage: Passage,
    pub collection: String,
    pub method: SearchMethod,
    /// Vector similarity in [0, 1] or raw BM25 score, depending on `method`
    pub score: f64,
}

/// Merge sightings into candidates keyed by (file_path, start_line, end_line).
///
/// Duplicates keep the maximum score per method; a key sighted by both methods
/// becomes `Hybrid`. The passage and collection of the first sighting are kept, so
/// callers should pass sightings in a stable order. The result is sorted.
pub fn fuse(sightings: Vec<Sighting>, vector_weight: f64, bm25_weight: f64) -> Vec<RetrievalCandidate> {
    let mut candidates: Vec<RetrievalCandidate> = Vec::new();
    let mut index: HashMap<(String, u32, u32), usize> = HashMap::new();

    for sighting in sightings {
        let meta = &sighting.passage.metadata;
        let key = (meta.file_path.clone(), meta.start_line, meta.end_line);
        let method = MatchMethod::from(sighting.method);

        let slot = match index.get(&key) {
            Some(&i) => i,
            None => {
                index.insert(key, candidates.len());
                candidates.push(RetrievalCandidate {
                    passage: sighting.passage,
                    collection: sighting.collection,
                    vector_score: 0.0,
                    bm25_score: 0.0,
                    rerank_score: None,
                    final_score: 0.0,
                    method,
                });
                candidates.len() - 1
            }
        };

        let candidate = &mut candidates[slot];
        match sighting.method {
            SearchMethod::Vector => candidate.vector_score = candidate.vector_score.max(sighting.score),
            SearchMethod::Lexical => candidate.bm25_score = candidate.bm25_score.max(sighting.score),
        }
        if candidate.method != method {
            candidate.method = MatchMethod::Hybrid;
        }
    }

    for candidate in &mut candidates {
        candidate.final_score = candidate.vector_score * vector_weight + candidate.bm25_score * bm25_weight;
    }
    sort_candidates(&mut candidates);
    candidates
}

/// True when `module_path` names `module` or one of its ancestors.
///
/// Segment-aware: "auth" matches "auth" and "auth.token" but not "authz".
pub fn module_matches(module_path: &str, module: &str) -> bool {
    if module_path.is_empty() {
        return false;
    }
    match module.strip_prefix(module_path) {
        Some("") => true,
        Some(rest) => rest.starts_with(['.', ':', '/']) || module_path.ends_with(['.', ':', '/']),
        None => false,
    }
}

/// Boost candidates that share the caller's module or file, then re-sort.
///
/// The two boosts are independent and multiply. An empty or absent context or
/// module disables the corresponding check.
pub fn apply_structural_bias(
    candidates: &mut [RetrievalCandidate],
    context: Option<&str>,
    module: Option<&str>,
    same_module_boost: f64,
    same_file_boost: f64,
) {
    let context = context.filter(|c| !c.trim().is_empty());
    let module = module.map(str::trim).filter(|m| !m.is_empty());

    for candidate in candidates.iter_mut() {
        let meta = &candidate.passage.metadata;
        if let Some(module) = module {
            if module_matches(&meta.module_path, module) {
                candidate.final_score *= same_module_boost;
            }
        }
        if let Some(context) = context {
            if !meta.file_path.is_empty() && context.contains(meta.file_path.as_str()) {
                candidate.final_score *= same_file_boost;
            }
        }
    }
    sort_candidates(candidates);
}

fn identifier_tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Boost candidates whose symbol name appears as a token of the query, then re-sort.
pub fn apply_symbol_preference(candidates: &mut [RetrievalCandidate], query_text: &str, boost: f64) {
    let tokens = identifier_tokens(query_text);
    if tokens.is_empty() {
        return;
    }
    for candidate in candidates.iter_mut() {
        let symbol = candidate.passage.metadata.symbol_name.trim();
        if !symbol.is_empty() && tokens.contains(&symbol.to_lowercase()) {
            candidate.final_score *= boost;
        }
    }
    sort_candidates(candidates);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::tests_support::candidate;

    fn sighting(path: &str, start: u32, collection: &str, method: SearchMethod, score: f64) -> Sighting {
        Sighting {
            passage: candidate(path, start, 0.0).passage,
            collection: collection.to_string(),
            method,
            score,
        }
    }

    #[test]
    fn test_fuse_hybrid_score() {
        let fused = fuse(
            vec![
                sighting("src/auth.rs", 1, "code", SearchMethod::Vector, 0.9),
                sighting("src/auth.rs", 1, "code", SearchMethod::Lexical, 4.0),
            ],
            0.7,
            0.3,
        );
        assert_eq!(fused.len(), 1);
        let c = &fused[0];
        assert_eq!(c.method, MatchMethod::Hybrid);
        assert!((c.vector_score - 0.9).abs() < 1e-9);
        assert!((c.bm25_score - 4.0).abs() < 1e-9);
        assert!((c.final_score - 1.83).abs() < 1e-9);
    }

    #[test]
    fn test_fuse_keeps_max_per_method() {
        let fused = fuse(
            vec![
                sighting("a.rs", 1, "code", SearchMethod::Vector, 0.4),
                sighting("a.rs", 1, "docs", SearchMethod::Vector, 0.8),
                sighting("b.rs", 1, "code", SearchMethod::Lexical, 2.0),
            ],
            0.7,
            0.3,
        );
        assert_eq!(fused.len(), 2);
        let a = fused.iter().find(|c| c.passage.metadata.file_path == "a.rs").unwrap();
        assert_eq!(a.method, MatchMethod::Vector);
        assert!((a.vector_score - 0.8).abs() < 1e-9);
        // First sighting wins for provenance
        assert_eq!(a.collection, "code");
        let b = fused.iter().find(|c| c.passage.metadata.file_path == "b.rs").unwrap();
        assert_eq!(b.method, MatchMethod::Lexical);
        assert_eq!(b.vector_score, 0.0);
    }

    #[test]
    fn test_fuse_distinguishes_line_ranges() {
        let fused = fuse(
            vec![
                sighting("a.rs", 1, "code", SearchMethod::Vector, 0.5),
                sighting("a.rs", 40, "code", SearchMethod::Vector, 0.5),
            ],
            0.7,
            0.3,
        );
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].passage.metadata.start_line, 1);
        assert_eq!(fused[1].passage.metadata.start_line, 40);
    }

    #[test]
    fn test_fuse_is_order_independent_in_scores() {
        let forward = vec![
            sighting("a.rs", 1, "code", SearchMethod::Vector, 0.3),
            sighting("b.rs", 1, "code", SearchMethod::Lexical, 1.0),
            sighting("a.rs", 1, "code", SearchMethod::Lexical, 0.5),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();
        let a = fuse(forward, 0.7, 0.3);
        let b = fuse(reversed, 0.7, 0.3);
        let scores = |v: &[RetrievalCandidate]| -> Vec<(String, f64)> {
            v.iter().map(|c| (c.passage.metadata.file_path.clone(), c.final_score)).collect()
        };
        assert_eq!(scores(&a), scores(&b));
    }

    #[test]
    fn test_module_matches_segments() {
        assert!(module_matches("auth", "auth"));
        assert!(module_matches("auth", "auth.token"));
        assert!(module_matches("auth", "auth::token"));
        assert!(!module_matches("auth", "authz.token"));
        assert!(!module_matches("", "auth"));
        assert!(!module_matches("auth.token", "auth"));
    }

    #[test]
    fn test_structural_bias_exact_boost() {
        let mut list = vec![candidate("src/auth/token.rs", 1, 0.5), candidate("src/other.rs", 1, 0.6)];
        apply_structural_bias(&mut list, Some("editing src/auth/token.rs"), None, 1.2, 1.5);
        assert_eq!(list[0].passage.metadata.file_path, "src/auth/token.rs");
        assert!((list[0].final_score - 0.75).abs() < 1e-12);
        assert!((list[1].final_score - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_structural_bias_boosts_multiply() {
        let mut c = candidate("src/auth/token.rs", 1, 1.0);
        c.passage.metadata.module_path = "auth".to_string();
        let mut list = vec![c];
        apply_structural_bias(&mut list, Some("src/auth/token.rs"), Some("auth.token"), 1.2, 1.5);
        assert!((list[0].final_score - 1.8).abs() < 1e-12);
    }

    #[test]
    fn test_structural_bias_noop_without_context() {
        let mut c = candidate("src/auth/token.rs", 1, 1.0);
        c.passage.metadata.module_path = "auth".to_string();
        let mut list = vec![c];
        apply_structural_bias(&mut list, Some("   "), None, 1.2, 1.5);
        apply_structural_bias(&mut list, None, Some(""), 1.2, 1.5);
        assert_eq!(list[0].final_score, 1.0);
    }

    #[test]
    fn test_symbol_preference() {
        let mut hit = candidate("src/auth.rs", 1, 0.5);
        hit.passage.metadata.symbol_name = "Validate_Token".to_string();
        let mut list = vec![candidate("src/a.rs", 1, 0.55), hit];
        apply_symbol_preference(&mut list, "where is validate_token() defined?", 1.2);
        assert_eq!(list[0].passage.metadata.file_path, "src/auth.rs");
        assert!((list[0].final_score - 0.6).abs() < 1e-12);
        assert!((list[1].final_score - 0.55).abs() < 1e-12);
    }
}
