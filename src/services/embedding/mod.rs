//! Embedding provider: role-aware prefixing, batching and normalisation on
//! top of a pluggable model runtime.

mod onnx;

pub use onnx::OnnxEmbedder;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::EmbeddingError;
use crate::models::{EmbeddingConfig, EmbeddingProfile, Pooling};

const INSTRUCT_QUERY_PREFIX: &str =
    "Instruct: Given a search query, retrieve relevant passages\nQuery: ";

/// Raw model runtime. Implementations return one vector per input text.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn model_id(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingRole {
    Query,
    Passage,
}

impl EmbeddingProfile {
    /// Fallback mapping from a model identifier, used when no profile is
    /// configured.
    pub fn detect(model_id: &str) -> Self {
        let lowered = model_id.to_lowercase();
        if lowered.contains("qwen") && lowered.contains("embedding") {
            EmbeddingProfile::Instruct
        } else if lowered.contains("e5") {
            EmbeddingProfile::E5
        } else if lowered.contains("instruct") {
            EmbeddingProfile::Instruct
        } else {
            EmbeddingProfile::Plain
        }
    }

    pub fn resolve(config: &EmbeddingConfig) -> Self {
        config
            .profile
            .unwrap_or_else(|| Self::detect(&config.model_id))
    }

    pub fn prepare(&self, role: EmbeddingRole, text: &str) -> String {
        match (self, role) {
            (EmbeddingProfile::E5, EmbeddingRole::Query) => format!("query: {text}"),
            (EmbeddingProfile::E5, EmbeddingRole::Passage) => format!("passage: {text}"),
            (EmbeddingProfile::Instruct, EmbeddingRole::Query) => {
                format!("{INSTRUCT_QUERY_PREFIX}{text}")
            }
            (EmbeddingProfile::Instruct, EmbeddingRole::Passage)
            | (EmbeddingProfile::Plain, _) => text.to_string(),
        }
    }

    pub fn default_pooling(&self) -> Pooling {
        match self {
            EmbeddingProfile::Instruct => Pooling::LastToken,
            EmbeddingProfile::E5 | EmbeddingProfile::Plain => Pooling::Mean,
        }
    }
}

/// The one place query and passage conventions are applied. Shared through
/// an `Arc` by the indexer and the retriever.
pub struct EmbeddingProvider {
    embedder: Arc<dyn Embedder>,
    profile: EmbeddingProfile,
    dimension: usize,
    batch_size: usize,
}

impl EmbeddingProvider {
    pub fn new(embedder: Arc<dyn Embedder>, config: &EmbeddingConfig) -> Self {
        Self {
            embedder,
            profile: EmbeddingProfile::resolve(config),
            dimension: config.dimension as usize,
            batch_size: (config.batch_size as usize).max(1),
        }
    }

    pub fn profile(&self) -> EmbeddingProfile {
        self.profile
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    /// Embed `texts` under `role`. Every returned vector is L2-normalised and
    /// has the configured dimension.
    pub async fn embed(
        &self,
        texts: &[String],
        role: EmbeddingRole,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let prepared: Vec<String> = batch
                .iter()
                .map(|t| self.profile.prepare(role, t))
                .collect();
            let embedded = self.embedder.embed(prepared).await?;

            if embedded.len() != batch.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    embedded.len()
                )));
            }
            for vector in embedded {
                if vector.len() != self.dimension {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: self.dimension,
                        actual: vector.len(),
                    });
                }
                vectors.push(normalize(vector));
            }
        }

        debug!(count = vectors.len(), role = ?role, "embedded texts");
        Ok(vectors)
    }

    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(&[query.to_string()], EmbeddingRole::Query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }
}

pub fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}
