//! Per-project vector collections on top of a pluggable backend.
//!
//! A backend stores *physical* collections. Each project maps to at most one
//! active physical collection through a manifest guarded by a per-project
//! `RwLock`: a rebuild writes a fresh generation, swaps the manifest under
//! the write lock, then drops the old generation. Queries hold the read lock,
//! so they see either the old or the new collection in full.

mod memory;
mod qdrant;

pub use memory::MemoryBackend;
pub use qdrant::QdrantBackend;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::VectorStoreError;
use crate::models::{ChunkMetadata, VectorDriver, VectorItem, VectorStoreConfig};

/// A ranked hit from a physical collection.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub chunk_id: String,
    pub score: f32,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Storage engine holding physical collections.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn health_check(&self) -> Result<bool, VectorStoreError>;

    /// Create `name` holding exactly `items`, replacing any collection of the
    /// same name.
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        items: Vec<VectorItem>,
    ) -> Result<(), VectorStoreError>;

    /// Remove `name`. Removing an absent collection is not an error.
    async fn drop_collection(&self, name: &str) -> Result<(), VectorStoreError>;

    /// Up to `limit` matches ordered by descending cosine similarity.
    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorMatch>, VectorStoreError>;

    /// Every item of `name`, vectors included.
    async fn scroll(&self, name: &str) -> Result<Vec<VectorItem>, VectorStoreError>;

    /// Names of physical collections starting with `prefix`.
    async fn list_collections(&self, prefix: &str) -> Result<Vec<String>, VectorStoreError>;

    fn driver(&self) -> VectorDriver;
}

/// Create the backend selected by configuration.
pub fn create_backend(
    config: &VectorStoreConfig,
) -> Result<Arc<dyn VectorBackend>, VectorStoreError> {
    match config.driver {
        VectorDriver::Memory => Ok(Arc::new(MemoryBackend::new())),
        VectorDriver::Qdrant => Ok(Arc::new(QdrantBackend::new(config)?)),
    }
}

/// Public view of a project's collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub dimension: usize,
    /// Unix milliseconds
    pub indexed_at: i64,
    pub count: usize,
}

#[derive(Debug, Clone)]
struct Manifest {
    info: CollectionInfo,
    physical: String,
}

type Slot = Arc<RwLock<Option<Manifest>>>;

#[derive(Debug)]
pub struct QueryOutcome {
    pub collection: CollectionInfo,
    pub matches: Vec<VectorMatch>,
}

pub struct VectorStore {
    backend: Arc<dyn VectorBackend>,
    prefix: String,
    slots: Mutex<HashMap<String, Slot>>,
    /// Dimension of each build currently writing a new generation.
    building: Mutex<HashMap<String, usize>>,
    generation: AtomicU64,
}

/// Clears a project's in-progress build marker when the build ends.
struct BuildMarker<'a> {
    store: &'a VectorStore,
    project_id: String,
}

impl Drop for BuildMarker<'_> {
    fn drop(&mut self) {
        lock(&self.store.building).remove(&self.project_id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl VectorStore {
    pub fn new(backend: Arc<dyn VectorBackend>, prefix: impl Into<String>) -> Self {
        let seed = chrono::Utc::now().timestamp_millis().max(0) as u64;
        Self {
            backend,
            prefix: prefix.into(),
            slots: Mutex::new(HashMap::new()),
            building: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(seed),
        }
    }

    pub fn backend(&self) -> &Arc<dyn VectorBackend> {
        &self.backend
    }

    fn slot(&self, project_id: &str) -> Slot {
        lock(&self.slots)
            .entry(project_id.to_string())
            .or_default()
            .clone()
    }

    fn existing_slot(&self, project_id: &str) -> Option<Slot> {
        lock(&self.slots).get(project_id).cloned()
    }

    fn physical_name(&self, project_id: &str) -> String {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}_{}_g{}",
            self.prefix,
            sanitize_collection_name(project_id),
            generation
        )
    }

    /// Replace the project's whole collection with `items`.
    ///
    /// The previous collection stays queryable until the new one is fully
    /// written. On failure the previous collection is left untouched.
    pub async fn upsert_collection(
        &self,
        project_id: &str,
        dimension: usize,
        items: Vec<VectorItem>,
    ) -> Result<CollectionInfo, VectorStoreError> {
        let _marker = {
            let mut building = lock(&self.building);
            if let Some(&in_progress) = building.get(project_id) {
                if in_progress != dimension {
                    return Err(VectorStoreError::DimensionMismatch {
                        project: project_id.to_string(),
                        expected: in_progress,
                        actual: dimension,
                    });
                }
            }
            building.insert(project_id.to_string(), dimension);
            BuildMarker {
                store: self,
                project_id: project_id.to_string(),
            }
        };

        if let Some(bad) = items.iter().find(|i| i.vector.len() != dimension) {
            return Err(VectorStoreError::DimensionMismatch {
                project: project_id.to_string(),
                expected: dimension,
                actual: bad.vector.len(),
            });
        }

        let physical = self.physical_name(project_id);
        let count = items.len();

        if let Err(e) = self
            .backend
            .create_collection(&physical, dimension, items)
            .await
        {
            if let Err(cleanup) = self.backend.drop_collection(&physical).await {
                warn!(collection = %physical, error = %cleanup, "failed to remove partial collection");
            }
            return Err(e);
        }

        let info = CollectionInfo {
            dimension,
            indexed_at: chrono::Utc::now().timestamp_millis(),
            count,
        };

        let slot = self.slot(project_id);
        let previous = {
            let mut manifest = slot.write().await;
            manifest.replace(Manifest {
                info: info.clone(),
                physical: physical.clone(),
            })
        };

        if let Some(old) = previous {
            if let Err(e) = self.backend.drop_collection(&old.physical).await {
                warn!(collection = %old.physical, error = %e, "failed to drop replaced collection");
            }
        }

        info!(project = project_id, collection = %physical, chunks = count, dimension, "collection swapped");
        Ok(info)
    }

    /// Nearest neighbours in the project's active collection, or `None` when
    /// the project has no collection. `top_k` is clamped to the collection
    /// size.
    pub async fn query(
        &self,
        project_id: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Option<QueryOutcome>, VectorStoreError> {
        let Some(slot) = self.existing_slot(project_id) else {
            return Ok(None);
        };
        let manifest = slot.read().await;
        let Some(active) = manifest.as_ref() else {
            return Ok(None);
        };

        if vector.len() != active.info.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                project: project_id.to_string(),
                expected: active.info.dimension,
                actual: vector.len(),
            });
        }

        let limit = top_k.min(active.info.count);
        let mut matches = if limit == 0 {
            Vec::new()
        } else {
            self.backend.query(&active.physical, vector, limit).await?
        };
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(limit);

        Ok(Some(QueryOutcome {
            collection: active.info.clone(),
            matches,
        }))
    }

    pub async fn info(&self, project_id: &str) -> Option<CollectionInfo> {
        let slot = self.existing_slot(project_id)?;
        let manifest = slot.read().await;
        manifest.as_ref().map(|m| m.info.clone())
    }

    pub async fn dimension(&self, project_id: &str) -> Option<usize> {
        self.info(project_id).await.map(|i| i.dimension)
    }

    /// Full contents of the active collection.
    pub async fn dump(
        &self,
        project_id: &str,
    ) -> Result<Option<(CollectionInfo, Vec<VectorItem>)>, VectorStoreError> {
        let Some(slot) = self.existing_slot(project_id) else {
            return Ok(None);
        };
        let manifest = slot.read().await;
        match manifest.as_ref() {
            Some(active) => {
                let items = self.backend.scroll(&active.physical).await?;
                Ok(Some((active.info.clone(), items)))
            }
            None => Ok(None),
        }
    }

    /// Remove the project's collection. Returns whether one existed.
    pub async fn clear(&self, project_id: &str) -> Result<bool, VectorStoreError> {
        let Some(slot) = self.existing_slot(project_id) else {
            return Ok(false);
        };
        let mut manifest = slot.write().await;
        let Some(active) = manifest.as_ref() else {
            return Ok(false);
        };

        self.backend.drop_collection(&active.physical).await?;
        debug!(project = project_id, collection = %active.physical, "collection cleared");
        *manifest = None;
        Ok(true)
    }

    /// Clear the project's collection and forget its slot.
    pub async fn remove_project(&self, project_id: &str) -> Result<(), VectorStoreError> {
        self.clear(project_id).await?;
        lock(&self.slots).remove(project_id);
        Ok(())
    }

    /// Drop physical collections under this store's prefix that no project
    /// points at. Returns how many were dropped.
    pub async fn purge_orphans(&self) -> Result<usize, VectorStoreError> {
        let prefix = format!("{}_", self.prefix);
        let existing = self.backend.list_collections(&prefix).await?;

        let mut active = Vec::new();
        let slots: Vec<Slot> = lock(&self.slots).values().cloned().collect();
        for slot in slots {
            if let Some(m) = slot.read().await.as_ref() {
                active.push(m.physical.clone());
            }
        }

        let in_progress: Vec<String> = lock(&self.building)
            .keys()
            .map(|p| format!("{}{}_g", prefix, sanitize_collection_name(p)))
            .collect();

        let mut dropped = 0;
        for name in existing {
            if active.contains(&name) || in_progress.iter().any(|p| name.starts_with(p)) {
                continue;
            }
            self.backend.drop_collection(&name).await?;
            dropped += 1;
        }

        if dropped > 0 {
            info!(dropped, "purged orphaned collections");
        }
        Ok(dropped)
    }

    pub async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.backend.health_check().await
    }
}

/// Backend-safe form of a project id: lower-case `[a-z0-9_-]`, 3 to 63
/// characters, with a hash suffix when padding or truncating.
pub fn sanitize_collection_name(name: &str) -> String {
    let mut safe = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            safe.push(c.to_ascii_lowercase());
            in_run = false;
        } else if !in_run {
            safe.push('_');
            in_run = true;
        }
    }
    let mut safe = safe.trim_matches('_').to_string();

    if safe.is_empty() {
        safe = "project".to_string();
    }
    if safe.len() < 3 {
        safe = format!("{}_{}", safe, &digest_hex(name)[..6]);
    }
    if safe.len() > 63 {
        safe = format!("{}_{}", &safe[..50], &digest_hex(name)[..12]);
    }
    safe
}

fn digest_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}
