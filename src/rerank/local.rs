/// Local cross-encoder reranker using fastembed's `TextRerank`.

use async_trait::async_trait;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task;

use super::{RerankError, Reranker};

fn resolve_model(name: &str) -> Result<RerankerModel, RerankError> {
    match name.trim().to_lowercase().as_str() {
        "bge-reranker-base" => Ok(RerankerModel::BGERerankerBase),
        "bge-reranker-v2-m3" => Ok(RerankerModel::BGERerankerV2M3),
        "jina-reranker-v1-turbo-en" => Ok(RerankerModel::JINARerankerV1TurboEn),
        other => Err(RerankError::NotConfigured(format!("Unknown reranker model '{}'", other))),
    }
}

pub struct LocalReranker {
    model: Arc<Mutex<TextRerank>>,
    name: String,
}

impl LocalReranker {
    /// Load `model_name`, downloading weights into `cache_dir` if not cached.
    pub async fn new(cache_dir: &str, model_name: &str) -> Result<Self, RerankError> {
        let model = resolve_model(model_name)?;
        let cache_path = PathBuf::from(cache_dir);

        let rerank = task::spawn_blocking(move || {
            std::fs::create_dir_all(&cache_path)
                .map_err(|e| RerankError::ModelInit(format!("Failed to create cache dir: {}", e)))?;
            TextRerank::try_new(
                RerankInitOptions::new(model)
                    .with_cache_dir(cache_path)
                    .with_show_download_progress(false),
            )
            .map_err(|e| RerankError::ModelInit(e.to_string()))
        })
        .await
        .map_err(|e| RerankError::ModelInit(e.to_string()))??;

        Ok(LocalReranker {
            model: Arc::new(Mutex::new(rerank)),
            name: model_name.to_string(),
        })
    }
}

#[async_trait]
impl Reranker for LocalReranker {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RerankError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let query = query.to_string();
        let documents = documents.to_vec();
        let count = documents.len();

        let results = task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| RerankError::Inference(format!("Model lock poisoned: {}", e)))?;
            model
                .rerank(query, documents, false, None)
                .map_err(|e| RerankError::Inference(e.to_string()))
        })
        .await
        .map_err(|e| RerankError::Inference(e.to_string()))??;

        // fastembed returns results sorted by score; put them back in input order.
        let mut scores = vec![f32::NEG_INFINITY; count];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = result.score;
            }
        }
        Ok(scores)
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_model_names() {
        assert!(matches!(resolve_model("BGE-Reranker-Base"), Ok(RerankerModel::BGERerankerBase)));
        assert!(matches!(resolve_model("cohere"), Err(RerankError::NotConfigured(_))));
    }
}
