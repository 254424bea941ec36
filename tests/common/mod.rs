#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nbindex::error::EmbeddingError;
use nbindex::models::{Config, SourceOrigin};
use nbindex::services::{Embedder, MemoryBackend, Workspace};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Bag-of-words embedder: every lower-cased word is hashed into a bucket, so
/// texts sharing words score higher.
pub struct HashEmbedder {
    dimension: usize,
    delay: Duration,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            delay: Duration::ZERO,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            v[(hasher.finish() % self.dimension as u64) as usize] += 1.0;
        }
        // Keeps every vector non-zero.
        v[0] += 0.01;
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Unavailable("model offline".to_string()));
        }
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn model_id(&self) -> &str {
        "test/hash-embedder"
    }
}

pub fn test_config(dimension: u32) -> Config {
    let mut config = Config::default();
    config.embedding.model_id = "test/hash-embedder".to_string();
    config.embedding.dimension = dimension;
    config.embedding.batch_size = 4;
    config.indexing.chunk_size = 120;
    config.indexing.chunk_overlap = 20;
    config.indexing.auto_reindex = false;
    config.metrics.enabled = false;
    config
}

pub fn workspace_with(config: Config, embedder: Arc<HashEmbedder>) -> Workspace {
    Workspace::with_components(config, embedder, Arc::new(MemoryBackend::new()))
        .expect("workspace")
}

pub fn workspace(dimension: u32) -> (Workspace, Arc<HashEmbedder>) {
    let embedder = Arc::new(HashEmbedder::new(dimension as usize));
    (workspace_with(test_config(dimension), embedder.clone()), embedder)
}

pub fn file_origin(name: &str) -> SourceOrigin {
    SourceOrigin::File(format!("/notes/{name}"))
}

pub fn zip_entry(name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(name, SimpleFileOptions::default())
        .expect("start entry");
    writer.write_all(bytes).expect("write entry");
    writer.finish().expect("finish zip").into_inner()
}

pub const RUST_TEXT: &str = "Rust ownership rules guarantee memory safety without a garbage \
collector. The borrow checker tracks lifetimes of references and rejects dangling pointers. \
Ownership moves values between bindings, and borrowing lends access without moving.";

pub const GARDEN_TEXT: &str = "Tomatoes need full sun and regular watering in the garden. \
Mulch keeps the soil moist and suppresses weeds around the plants. Prune the suckers so \
the tomato plant puts its energy into fruit.";

pub const OCEAN_TEXT: &str = "Ocean currents move heat from the equator toward the poles. \
The Gulf Stream carries warm water along the Atlantic coast. Deep water circulation is \
driven by differences in salinity and temperature.";
