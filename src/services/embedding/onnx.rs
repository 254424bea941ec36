use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::{ArrayViewD, Axis};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::{Session, SessionInputValue, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::Embedder;
use crate::error::{EmbeddingError, ModelError};
use crate::models::{Config, Device, EmbeddingConfig, EmbeddingProfile, Pooling};

struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    input_names: Vec<String>,
    pooling: Pooling,
}

impl OnnxModel {
    fn load(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, ModelError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(ModelError::NotFound(model_path.display().to_string()));
        }

        let mut builder = Session::builder()
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .with_intra_threads(num_cpus())
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?;

        if config.device == Device::Cuda {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?;
        }

        let session = builder
            .commit_from_file(&model_path)
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?;
        let input_names = session.inputs.iter().map(|i| i.name.clone()).collect();

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_tokens as usize,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        let pooling = config
            .pooling
            .unwrap_or_else(|| EmbeddingProfile::resolve(config).default_pooling());

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            input_names,
            pooling,
        })
    }

    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts, true)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        let batch_size = encodings.len();
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let mut token_type_ids = vec![0i64; batch_size * max_len];
        let mut position_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let rows = encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask())
                .zip(encoding.get_type_ids());
            for (j, ((&id, &m), &t)) in rows.enumerate() {
                input_ids[i * max_len + j] = id as i64;
                attention_mask[i * max_len + j] = m as i64;
                token_type_ids[i * max_len + j] = t as i64;
                position_ids[i * max_len + j] = j as i64;
            }
        }

        let mut inputs: Vec<(String, SessionInputValue<'_>)> = Vec::new();
        for name in &self.input_names {
            let data = match name.as_str() {
                "input_ids" => input_ids.clone(),
                "attention_mask" => attention_mask.clone(),
                "token_type_ids" => token_type_ids.clone(),
                "position_ids" => position_ids.clone(),
                other => {
                    return Err(ModelError::InferenceError(format!(
                        "unsupported model input: {other}"
                    )));
                }
            };
            let tensor = Tensor::from_array(([batch_size, max_len], data))
                .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;
            inputs.push((name.clone(), tensor.into()));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::InferenceError("session lock poisoned".to_string()))?;
        let outputs = session
            .run(inputs)
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;
        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        match output.ndim() {
            3 => Ok((0..batch_size)
                .map(|i| self.pool(&output, i, &attention_mask[i * max_len..(i + 1) * max_len]))
                .collect()),
            2 => Ok(output
                .axis_iter(Axis(0))
                .map(|row| row.iter().copied().collect())
                .collect()),
            _ => Err(ModelError::InferenceError(format!(
                "unexpected output shape: {:?}",
                output.shape()
            ))),
        }
    }

    /// Pool token states `[batch, seq, hidden]` of row `i` into one vector.
    fn pool(&self, hidden: &ArrayViewD<'_, f32>, i: usize, mask: &[i64]) -> Vec<f32> {
        let dim = hidden.shape()[2];
        let tokens = mask.iter().filter(|&&m| m > 0).count();

        match self.pooling {
            Pooling::Cls => (0..dim).map(|d| hidden[[i, 0, d]]).collect(),
            Pooling::LastToken => {
                let last = mask.iter().rposition(|&m| m > 0).unwrap_or(0);
                (0..dim).map(|d| hidden[[i, last, d]]).collect()
            }
            Pooling::Mean => {
                let mut sum = vec![0f32; dim];
                for (j, &m) in mask.iter().enumerate() {
                    if m > 0 {
                        for (d, slot) in sum.iter_mut().enumerate() {
                            *slot += hidden[[i, j, d]];
                        }
                    }
                }
                let denom = tokens.max(1) as f32;
                sum.into_iter().map(|v| v / denom).collect()
            }
        }
    }
}

/// Local ONNX Runtime model, loaded on first use.
pub struct OnnxEmbedder {
    config: EmbeddingConfig,
    model_dir: PathBuf,
    model: OnceCell<Arc<OnnxModel>>,
}

impl OnnxEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let model_dir = match &config.model_path {
            Some(path) => path.clone(),
            None => Config::models_dir()
                .ok_or_else(|| {
                    EmbeddingError::Unavailable("could not determine models directory".to_string())
                })?
                .join(config.model_id.replace('/', "--")),
        };

        Ok(Self {
            config: config.clone(),
            model_dir,
            model: OnceCell::new(),
        })
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    async fn model(&self) -> Result<Arc<OnnxModel>, EmbeddingError> {
        self.model
            .get_or_try_init(|| async {
                let config = self.config.clone();
                let dir = self.model_dir.clone();
                let loaded = tokio::task::spawn_blocking(move || OnnxModel::load(&config, &dir))
                    .await
                    .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

                match loaded {
                    Ok(model) => {
                        info!(model = %self.config.model_id, dir = %self.model_dir.display(), "embedding model loaded");
                        Ok(Arc::new(model))
                    }
                    Err(e) => {
                        warn!(model = %self.config.model_id, error = %e, "embedding model unavailable");
                        Err(EmbeddingError::from(e))
                    }
                }
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = self.model().await?;
        tokio::task::spawn_blocking(move || model.embed(texts))
            .await
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?
            .map_err(EmbeddingError::from)
    }

    fn model_id(&self) -> &str {
        &self.config.model_id
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
