/// Local embedding provider using fastembed
///
/// Offline embedding generation with ONNX models; weights are downloaded once into the
/// cache directory. All CPU-bound fastembed calls run in spawn_blocking to keep the
/// async runtime responsive.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task;

use super::{EmbeddingError, EmbeddingProvider};

/// Map a configured model name to the fastembed model and its output dimension.
fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize), EmbeddingError> {
    match name.trim().to_lowercase().as_str() {
        "all-minilm-l6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        "nomic-embed-text-v1.5" => Ok((EmbeddingModel::NomicEmbedTextV15, 768)),
        "jina-embeddings-v2-base-code" => Ok((EmbeddingModel::JinaEmbeddingsV2BaseCode, 768)),
        other => Err(EmbeddingError::NotConfigured(format!(
            "Unknown local embedding model '{}'",
            other
        ))),
    }
}

/// Local embedding provider backed by a fastembed `TextEmbedding`.
pub struct LocalEmbeddingProvider {
    model: Arc<Mutex<TextEmbedding>>,
    name: String,
    dim: usize,
}

impl LocalEmbeddingProvider {
    /// Load `model_name`, downloading weights into `cache_dir` if not cached.
    pub async fn new(cache_dir: &str, model_name: &str) -> Result<Self, EmbeddingError> {
        let (model, dim) = resolve_model(model_name)?;
        let cache_path = PathBuf::from(cache_dir);

        let embedding = task::spawn_blocking(move || {
            std::fs::create_dir_all(&cache_path)
                .map_err(|e| EmbeddingError::ModelInit(format!("Failed to create cache dir: {}", e)))?;
            TextEmbedding::try_new(
                TextInitOptions::new(model)
                    .with_cache_dir(cache_path)
                    .with_show_download_progress(false),
            )
            .map_err(|e| EmbeddingError::ModelInit(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::ModelInit(e.to_string()))??;

        tracing::info!(model = model_name, dim, "Local embedding model loaded");

        Ok(LocalEmbeddingProvider {
            model: Arc::new(Mutex::new(embedding)),
            name: model_name.to_string(),
            dim,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let input = vec![text.to_string()];

        let mut vectors = task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| EmbeddingError::Generation(format!("Model lock poisoned: {}", e)))?;
            model
                .embed(input, None)
                .map_err(|e| EmbeddingError::Generation(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::Generation(e.to_string()))??;

        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Generation("Model returned no embedding".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}
