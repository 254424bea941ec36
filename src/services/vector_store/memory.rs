//! In-process backend with brute-force cosine search.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{VectorBackend, VectorMatch};
use crate::error::VectorStoreError;
use crate::models::{VectorDriver, VectorItem};

struct MemoryCollection {
    dimension: usize,
    items: Vec<VectorItem>,
}

#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> VectorStoreError {
        VectorStoreError::CollectionError("memory backend lock poisoned".to_string())
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        Ok(true)
    }

    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        items: Vec<VectorItem>,
    ) -> Result<(), VectorStoreError> {
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        collections.insert(name.to_string(), MemoryCollection { dimension, items });
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<(), VectorStoreError> {
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        collections.remove(name);
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorMatch>, VectorStoreError> {
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        let collection = collections
            .get(name)
            .ok_or_else(|| VectorStoreError::SearchError(format!("collection {name} not found")))?;

        if vector.len() != collection.dimension {
            return Err(VectorStoreError::SearchError(format!(
                "query dimension {} does not match collection dimension {}",
                vector.len(),
                collection.dimension
            )));
        }

        let mut scored: Vec<(f32, &VectorItem)> = collection
            .items
            .iter()
            .map(|item| (cosine_similarity(vector, &item.vector), item))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(score, item)| VectorMatch {
                chunk_id: item.chunk_id.clone(),
                score,
                text: item.text.clone(),
                metadata: item.metadata.clone(),
            })
            .collect())
    }

    async fn scroll(&self, name: &str) -> Result<Vec<VectorItem>, VectorStoreError> {
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        collections
            .get(name)
            .map(|c| c.items.clone())
            .ok_or_else(|| VectorStoreError::CollectionError(format!("collection {name} not found")))
    }

    async fn list_collections(&self, prefix: &str) -> Result<Vec<String>, VectorStoreError> {
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        let mut names: Vec<String> = collections
            .keys()
            .filter(|n| n.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    fn driver(&self) -> VectorDriver {
        VectorDriver::Memory
    }
}
