//! Full rebuilds of a project's collection from its current sources.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

use super::chunker::TextChunker;
use super::embedding::{EmbeddingProvider, EmbeddingRole};
use super::metrics::MetricsStore;
use super::projects::ProjectRegistry;
use super::source_cache::SourceCache;
use super::vector_store::VectorStore;
use crate::error::IndexError;
use crate::models::{ChunkMetadata, VectorItem};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub project_id: String,
    pub chunk_count: usize,
    pub dimension: usize,
    pub sources_indexed: usize,
    /// Sources cut at the configured character limit
    pub truncated_sources: usize,
    /// Unix milliseconds
    pub indexed_at: i64,
    pub duration_ms: u64,
}

/// Per-project async locks serializing every operation that rewrites a
/// project's collection.
#[derive(Default)]
pub struct ProjectGates {
    gates: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ProjectGates {
    pub async fn acquire(&self, project_id: &str) -> OwnedMutexGuard<()> {
        let gate = self
            .gates
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(project_id.to_string())
            .or_default()
            .clone();
        gate.lock_owned().await
    }

    pub fn remove(&self, project_id: &str) {
        self.gates
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(project_id);
    }
}

pub struct Indexer {
    sources: Arc<SourceCache>,
    projects: Arc<ProjectRegistry>,
    embeddings: Arc<EmbeddingProvider>,
    store: Arc<VectorStore>,
    gates: Arc<ProjectGates>,
    chunker: TextChunker,
    metrics: Option<Arc<MetricsStore>>,
}

impl Indexer {
    pub fn new(
        sources: Arc<SourceCache>,
        projects: Arc<ProjectRegistry>,
        embeddings: Arc<EmbeddingProvider>,
        store: Arc<VectorStore>,
        gates: Arc<ProjectGates>,
        chunker: TextChunker,
    ) -> Self {
        Self {
            sources,
            projects,
            embeddings,
            store,
            gates,
            chunker,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsStore>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn projects(&self) -> &Arc<ProjectRegistry> {
        &self.projects
    }

    /// Rebuild the project's collection from a snapshot of its successful
    /// sources. On any failure the previous collection stays active.
    pub async fn build(&self, project_id: &str) -> Result<IndexReport, IndexError> {
        let _gate = self.gates.acquire(project_id).await;
        if !self.projects.exists(project_id) {
            return Err(IndexError::ProjectNotFound(project_id.to_string()));
        }

        let started = Instant::now();
        let result = self.build_locked(project_id, started).await;
        let elapsed = started.elapsed().as_millis() as u64;

        if let Some(metrics) = &self.metrics {
            let chunks = result.as_ref().map(|r| r.chunk_count).unwrap_or(0);
            metrics.record_build(project_id, elapsed, chunks, result.is_ok());
        }

        match &result {
            Ok(report) => info!(
                project = project_id,
                chunks = report.chunk_count,
                sources = report.sources_indexed,
                dimension = report.dimension,
                duration_ms = elapsed,
                "index built"
            ),
            Err(e) => warn!(project = project_id, error = %e, duration_ms = elapsed, "index build failed"),
        }
        result
    }

    async fn build_locked(
        &self,
        project_id: &str,
        started: Instant,
    ) -> Result<IndexReport, IndexError> {
        let snapshot = self.sources.snapshot(project_id);

        let mut texts = Vec::new();
        let mut pending = Vec::new();
        let mut truncated_sources = 0;

        for (index, source) in snapshot.iter().enumerate() {
            let chunked = self.chunker.chunk(&source.id, &source.text);
            if chunked.truncated {
                truncated_sources += 1;
                warn!(project = project_id, source = %source.id, "source text truncated before chunking");
            }
            for chunk in chunked.chunks {
                let metadata = ChunkMetadata::new(source, index as u32, &chunk, chunked.truncated);
                texts.push(chunk.text);
                pending.push((chunk.id, metadata));
            }
        }

        let vectors = self
            .embeddings
            .embed(&texts, EmbeddingRole::Passage)
            .await?;

        let items: Vec<VectorItem> = pending
            .into_iter()
            .zip(texts)
            .zip(vectors)
            .map(|(((chunk_id, metadata), text), vector)| VectorItem {
                chunk_id,
                vector,
                text,
                metadata,
            })
            .collect();

        let info = self
            .store
            .upsert_collection(project_id, self.embeddings.dimension(), items)
            .await?;
        self.projects.set_needs_reindex(project_id, false);

        Ok(IndexReport {
            project_id: project_id.to_string(),
            chunk_count: info.count,
            dimension: info.dimension,
            sources_indexed: snapshot.len(),
            truncated_sources,
            indexed_at: info.indexed_at,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}
