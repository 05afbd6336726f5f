/// Configuration management using figment
///
/// Loads configuration with this precedence (highest wins):
/// 1. Defaults (hardcoded)
/// 2. TOML file: secrag.toml (in working directory)
/// 3. Environment variables: prefixed SECRAG_, nested with `__`
///    (e.g., SECRAG_RETRIEVAL__VECTOR_WEIGHT=0.6)

use figment::{
    Figment,
    providers::{Env, Format, Toml, Serialized},
};
use serde::{Deserialize, Serialize};
use crate::errors::SecragError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional file path for JSON log output (in addition to stderr)
    #[serde(default)]
    pub log_file: Option<String>,

    /// PostgreSQL connection URL for the pgvector passage store.
    /// When unset, callers are expected to use the in-memory store.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub reranker: RerankerConfig,
}

/// Scoring and fan-out knobs for the hybrid search engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Weight of the vector similarity in the fused score
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    /// Weight of the BM25 score in the fused score
    #[serde(default = "default_bm25_weight")]
    pub bm25_weight: f64,
    /// Per-collection vector candidates fetched before fusion
    #[serde(default = "default_top_k_vector")]
    pub top_k_vector: usize,
    /// Per-collection lexical candidates fetched before fusion
    #[serde(default = "default_top_k_bm25")]
    pub top_k_bm25: usize,
    /// Result count used when the query does not carry its own top_k
    #[serde(default = "default_top_k_final")]
    pub top_k_final: usize,
    /// Candidates with a final score below this value are dropped
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    #[serde(default = "default_same_module_boost")]
    pub same_module_boost: f64,
    #[serde(default = "default_same_file_boost")]
    pub same_file_boost: f64,
    /// Applied when the routing policy prefers symbol hits and the
    /// candidate's symbol name is one of the query tokens
    #[serde(default = "default_symbol_match_boost")]
    pub symbol_match_boost: f64,
    /// Size of the head handed to the reranker
    #[serde(default = "default_rerank_top_k")]
    pub rerank_top_k: usize,
    /// Process-wide switch for the BM25 engine
    #[serde(default = "default_lexical_enabled")]
    pub lexical_enabled: bool,
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f64,
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f64,
    /// Budget for a single per-collection sub-search
    #[serde(default = "default_collection_timeout_ms")]
    pub collection_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "local" (fastembed, default) or "openai"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Directory for downloaded model weights
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    /// Local model used for prose passages and queries
    #[serde(default = "default_prose_model")]
    pub prose_model: String,
    /// Local model used for code passages and queries
    #[serde(default = "default_code_model")]
    pub code_model: String,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_reranker_model")]
    pub model: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_vector_weight() -> f64 { 0.7 }
fn default_bm25_weight() -> f64 { 0.3 }
fn default_top_k_vector() -> usize { 20 }
fn default_top_k_bm25() -> usize { 20 }
fn default_top_k_final() -> usize { 10 }
fn default_score_threshold() -> f64 { 0.2 }
fn default_same_module_boost() -> f64 { 1.2 }
fn default_same_file_boost() -> f64 { 1.5 }
fn default_symbol_match_boost() -> f64 { 1.2 }
fn default_rerank_top_k() -> usize { 20 }
fn default_lexical_enabled() -> bool { true }
fn default_bm25_k1() -> f64 { 1.5 }
fn default_bm25_b() -> f64 { 0.75 }
fn default_collection_timeout_ms() -> u64 { 5_000 }

fn default_embedding_provider() -> String {
    "local".to_string()
}

fn default_cache_dir() -> String {
    dirs::cache_dir()
        .map(|dir| dir.join("secrag").join("models").to_string_lossy().to_string())
        .unwrap_or_else(|| ".fastembed_cache".to_string())
}

fn default_prose_model() -> String {
    "bge-small-en-v1.5".to_string()
}

fn default_code_model() -> String {
    "jina-embeddings-v2-base-code".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_reranker_model() -> String {
    "bge-reranker-base".to_string()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            vector_weight: default_vector_weight(),
            bm25_weight: default_bm25_weight(),
            top_k_vector: default_top_k_vector(),
            top_k_bm25: default_top_k_bm25(),
            top_k_final: default_top_k_final(),
            score_threshold: default_score_threshold(),
            same_module_boost: default_same_module_boost(),
            same_file_boost: default_same_file_boost(),
            symbol_match_boost: default_symbol_match_boost(),
            rerank_top_k: default_rerank_top_k(),
            lexical_enabled: default_lexical_enabled(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
            collection_timeout_ms: default_collection_timeout_ms(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            provider: default_embedding_provider(),
            cache_dir: default_cache_dir(),
            prose_model: default_prose_model(),
            code_model: default_code_model(),
            openai_api_key: None,
            openai_base_url: default_openai_base_url(),
            openai_model: default_openai_model(),
        }
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        RerankerConfig {
            enabled: false,
            model: default_reranker_model(),
            cache_dir: default_cache_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            log_file: None,
            database_url: None,
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            reranker: RerankerConfig::default(),
        }
    }
}

impl RetrievalConfig {
    /// Check the invariants the scoring pipeline relies on.
    ///
    /// Weights must sum to at most 1 so fused scores stay bounded before the
    /// structural boosts are applied.
    pub fn validate(&self) -> Result<(), SecragError> {
        if !(self.vector_weight >= 0.0 && self.bm25_weight >= 0.0) {
            return Err(SecragError::Config(
                "vector_weight and bm25_weight must be non-negative".to_string(),
            ));
        }
        if self.vector_weight + self.bm25_weight > 1.0 + f64::EPSILON {
            return Err(SecragError::Config(format!(
                "vector_weight + bm25_weight must be <= 1.0 (got {} + {})",
                self.vector_weight, self.bm25_weight
            )));
        }
        if !(self.same_module_boost > 1.0 && self.same_file_boost > 1.0) {
            return Err(SecragError::Config(
                "same_module_boost and same_file_boost must be greater than 1.0".to_string(),
            ));
        }
        if !(self.symbol_match_boost >= 1.0) {
            return Err(SecragError::Config(
                "symbol_match_boost must be at least 1.0".to_string(),
            ));
        }
        if self.top_k_vector == 0 || self.top_k_bm25 == 0 || self.top_k_final == 0 || self.rerank_top_k == 0 {
            return Err(SecragError::Config(
                "top_k_vector, top_k_bm25, top_k_final and rerank_top_k must be greater than 0".to_string(),
            ));
        }
        if !self.score_threshold.is_finite() {
            return Err(SecragError::Config("score_threshold must be finite".to_string()));
        }
        if !(self.bm25_k1 >= 0.0 && (0.0..=1.0).contains(&self.bm25_b)) {
            return Err(SecragError::Config(
                "bm25_k1 must be >= 0 and bm25_b must be within [0, 1]".to_string(),
            ));
        }
        if self.collection_timeout_ms == 0 {
            return Err(SecragError::Config("collection_timeout_ms must be greater than 0".to_string()));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from defaults, TOML file, and environment variables
    ///
    /// Environment variables override TOML file values.
    /// Example: SECRAG_RETRIEVAL__TOP_K_FINAL=5 overrides retrieval.top_k_final in secrag.toml
    pub fn load() -> Result<Config, SecragError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("secrag.toml"))
            .merge(Env::prefixed("SECRAG_").split("__"))
            .extract()
            .map_err(|e| SecragError::Config(format!("Failed to load config: {}", e)))?;
        config.retrieval.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_file, None);
        assert_eq!(config.database_url, None);
        assert_eq!(config.retrieval.vector_weight, 0.7);
        assert_eq!(config.retrieval.bm25_weight, 0.3);
        assert_eq!(config.embedding.provider, "local");
        assert!(!config.reranker.enabled);
        assert!(config.retrieval.validate().is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_at_most_one() {
        let config = RetrievalConfig {
            vector_weight: 0.8,
            bm25_weight: 0.4,
            ..RetrievalConfig::default()
        };
        assert!(matches!(config.validate(), Err(SecragError::Config(_))));
    }

    #[test]
    fn test_boosts_must_exceed_one() {
        let config = RetrievalConfig {
            same_file_boost: 1.0,
            ..RetrievalConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let config = RetrievalConfig {
            rerank_top_k: 0,
            ..RetrievalConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_merges_toml_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "secrag.toml",
                r#"
                log_level = "debug"

                [retrieval]
                vector_weight = 0.6
                bm25_weight = 0.4
                "#,
            )?;
            jail.set_env("SECRAG_RETRIEVAL__TOP_K_FINAL", "3");
            jail.set_env("SECRAG_RERANKER__ENABLED", "true");

            let config = Config::load().map_err(|e| e.to_string())?;
            assert_eq!(config.log_level, "debug");
            assert_eq!(config.retrieval.vector_weight, 0.6);
            assert_eq!(config.retrieval.bm25_weight, 0.4);
            assert_eq!(config.retrieval.top_k_final, 3);
            assert_eq!(config.retrieval.same_file_boost, 1.5);
            assert!(config.reranker.enabled);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_weights() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SECRAG_RETRIEVAL__VECTOR_WEIGHT", "0.9");
            assert!(Config::load().is_err());
            Ok(())
        });
    }
}
