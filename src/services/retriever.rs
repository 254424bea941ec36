use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use super::embedding::EmbeddingProvider;
use super::projects::ProjectRegistry;
use super::vector_store::VectorStore;
use crate::error::{SearchError, VectorStoreError};
use crate::models::{SearchHit, SearchQuery, SearchResults};

pub struct Retriever {
    projects: Arc<ProjectRegistry>,
    embeddings: Arc<EmbeddingProvider>,
    store: Arc<VectorStore>,
    default_top_k: u32,
    default_min_score: Option<f32>,
}

impl Retriever {
    pub fn new(
        projects: Arc<ProjectRegistry>,
        embeddings: Arc<EmbeddingProvider>,
        store: Arc<VectorStore>,
        default_top_k: u32,
        default_min_score: Option<f32>,
    ) -> Self {
        Self {
            projects,
            embeddings,
            store,
            default_top_k,
            default_min_score,
        }
    }

    fn validate(&self, query: &SearchQuery) -> Result<usize, SearchError> {
        if query.project_id.trim().is_empty() {
            return Err(SearchError::InvalidQuery(
                "project id must not be empty".to_string(),
            ));
        }
        if query.query.trim().is_empty() {
            return Err(SearchError::InvalidQuery(
                "query must not be empty".to_string(),
            ));
        }
        match query.top_k {
            Some(0) => Err(SearchError::InvalidQuery(
                "top_k must be at least 1".to_string(),
            )),
            Some(k) => Ok(k as usize),
            None => Ok(self.default_top_k.max(1) as usize),
        }
    }

    /// Ranked chunks for `query`. Hits carry the source metadata captured at
    /// build time.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResults, SearchError> {
        let top_k = self.validate(query)?;
        let project_id = query.project_id.as_str();

        if !self.projects.exists(project_id) {
            return Err(SearchError::ProjectNotFound(project_id.to_string()));
        }
        if self.store.info(project_id).await.is_none() {
            return Err(SearchError::IndexNotReady(project_id.to_string()));
        }

        let started = Instant::now();
        let vector = self.embeddings.embed_query(&query.query).await?;

        let outcome = match self.store.query(project_id, &vector, top_k).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return Err(SearchError::IndexNotReady(project_id.to_string())),
            Err(VectorStoreError::DimensionMismatch {
                expected, actual, ..
            }) => {
                return Err(SearchError::StaleIndex {
                    project: project_id.to_string(),
                    indexed: expected,
                    query: actual,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let min_score = query.min_score.or(self.default_min_score);
        let hits: Vec<SearchHit> = outcome
            .matches
            .into_iter()
            .filter(|m| min_score.is_none_or(|min| m.score >= min))
            .map(|m| SearchHit {
                chunk_id: m.chunk_id,
                score: m.score,
                text: m.text,
                source: m.metadata,
            })
            .collect();

        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(project = project_id, hits = hits.len(), duration_ms, "search complete");

        Ok(SearchResults {
            project_id: project_id.to_string(),
            query: query.query.clone(),
            hits,
            collection_size: outcome.collection.count as u64,
            duration_ms,
        })
    }
}
