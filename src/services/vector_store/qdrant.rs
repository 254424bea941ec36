//! Qdrant vector store backend implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_output::VectorsOptions;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointId, PointStruct, RetrievedPoint, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use tracing::debug;

use super::{VectorBackend, VectorMatch};
use crate::error::VectorStoreError;
use crate::models::{ChunkMetadata, VectorDriver, VectorItem, VectorStoreConfig};
use crate::utils::retry::{RetryPolicy, with_retry};

const UPSERT_BATCH: usize = 256;
const SCROLL_PAGE: u32 = 512;

pub struct QdrantBackend {
    client: Qdrant,
    retry: RetryPolicy,
}

impl QdrantBackend {
    pub fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            retry: RetryPolicy::default(),
        })
    }

    async fn exists(&self, name: &str) -> Result<bool, VectorStoreError> {
        with_retry(&self.retry, "qdrant collection_exists", || async {
            self.client
                .collection_exists(name)
                .await
                .map_err(|e| VectorStoreError::CollectionError(e.to_string()))
        })
        .await
    }

    fn to_point(item: VectorItem) -> Result<PointStruct, VectorStoreError> {
        let metadata = serde_json::to_string(&item.metadata)
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert("chunk_id".to_string(), item.chunk_id.clone().into());
        payload.insert("text".to_string(), item.text.into());
        payload.insert("metadata".to_string(), metadata.into());

        Ok(PointStruct::new(
            point_id(&item.chunk_id),
            item.vector,
            payload,
        ))
    }

    fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
        payload.get(key).and_then(|v| match &v.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        })
    }

    fn payload_metadata(
        payload: &HashMap<String, Value>,
    ) -> Result<ChunkMetadata, VectorStoreError> {
        let raw = Self::payload_string(payload, "metadata").ok_or_else(|| {
            VectorStoreError::SearchError("point is missing metadata payload".to_string())
        })?;
        serde_json::from_str(&raw).map_err(|e| VectorStoreError::SearchError(e.to_string()))
    }

    #[allow(deprecated)]
    fn point_vector(point: &RetrievedPoint) -> Vec<f32> {
        match point
            .vectors
            .as_ref()
            .and_then(|v| v.vectors_options.as_ref())
        {
            Some(VectorsOptions::Vector(v)) => v.data.clone(),
            _ => Vec::new(),
        }
    }
}

/// Qdrant only accepts UUID or integer point ids.
fn point_id(chunk_id: &str) -> PointId {
    match uuid::Uuid::parse_str(chunk_id) {
        Ok(id) => id.to_string().into(),
        Err(_) => uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, chunk_id.as_bytes())
            .to_string()
            .into(),
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        items: Vec<VectorItem>,
    ) -> Result<(), VectorStoreError> {
        if self.exists(name).await? {
            self.drop_collection(name).await?;
        }

        with_retry(&self.retry, "qdrant create_collection", || async {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(
                        dimension as u64,
                        Distance::Cosine,
                    )),
                )
                .await
                .map(|_| ())
                .map_err(|e| VectorStoreError::CollectionError(e.to_string()))
        })
        .await?;

        let points = items
            .into_iter()
            .map(Self::to_point)
            .collect::<Result<Vec<_>, _>>()?;

        for batch in points.chunks(UPSERT_BATCH) {
            with_retry(&self.retry, "qdrant upsert_points", || async {
                self.client
                    .upsert_points(UpsertPointsBuilder::new(name, batch.to_vec()).wait(true))
                    .await
                    .map(|_| ())
                    .map_err(|e| VectorStoreError::UpsertError(e.to_string()))
            })
            .await?;
        }

        debug!(collection = name, points = points.len(), "qdrant collection written");
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<(), VectorStoreError> {
        if !self.exists(name).await? {
            return Ok(());
        }

        with_retry(&self.retry, "qdrant delete_collection", || async {
            self.client
                .delete_collection(name)
                .await
                .map(|_| ())
                .map_err(|e| VectorStoreError::DeleteError(e.to_string()))
        })
        .await
    }

    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorMatch>, VectorStoreError> {
        let response = with_retry(&self.retry, "qdrant search_points", || async {
            self.client
                .search_points(
                    SearchPointsBuilder::new(name, vector.to_vec(), limit as u64)
                        .with_payload(true),
                )
                .await
                .map_err(|e| VectorStoreError::SearchError(e.to_string()))
        })
        .await?;

        response
            .result
            .into_iter()
            .map(|point| {
                Ok(VectorMatch {
                    chunk_id: Self::payload_string(&point.payload, "chunk_id").unwrap_or_default(),
                    score: point.score,
                    text: Self::payload_string(&point.payload, "text").unwrap_or_default(),
                    metadata: Self::payload_metadata(&point.payload)?,
                })
            })
            .collect()
    }

    async fn scroll(&self, name: &str) -> Result<Vec<VectorItem>, VectorStoreError> {
        let mut items = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(name)
                .limit(SCROLL_PAGE)
                .with_payload(true)
                .with_vectors(true);
            if let Some(off) = offset.take() {
                builder = builder.offset(off);
            }

            let response = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

            for point in &response.result {
                items.push(VectorItem {
                    chunk_id: Self::payload_string(&point.payload, "chunk_id").unwrap_or_default(),
                    vector: Self::point_vector(point),
                    text: Self::payload_string(&point.payload, "text").unwrap_or_default(),
                    metadata: Self::payload_metadata(&point.payload)?,
                });
            }

            offset = response.next_page_offset;
            if offset.is_none() || response.result.is_empty() {
                break;
            }
        }

        Ok(items)
    }

    async fn list_collections(&self, prefix: &str) -> Result<Vec<String>, VectorStoreError> {
        let response = with_retry(&self.retry, "qdrant list_collections", || async {
            self.client
                .list_collections()
                .await
                .map_err(|e| VectorStoreError::CollectionError(e.to_string()))
        })
        .await?;

        let mut names: Vec<String> = response
            .collections
            .into_iter()
            .map(|c| c.name)
            .filter(|n| n.starts_with(prefix))
            .collect();
        names.sort();
        Ok(names)
    }

    fn driver(&self) -> VectorDriver {
        VectorDriver::Qdrant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::point_id::PointIdOptions;

    #[test]
    fn test_point_id_keeps_uuid_chunk_ids() {
        let chunk_id = crate::models::Chunk::generate_id("src-1", 0);
        match point_id(&chunk_id).point_id_options {
            Some(PointIdOptions::Uuid(u)) => assert_eq!(u, chunk_id),
            other => panic!("unexpected point id: {:?}", other),
        }
    }

    #[test]
    fn test_point_id_maps_foreign_ids_deterministically() {
        let a = point_id("chunk-7");
        let b = point_id("chunk-7");
        assert_eq!(a, b);
        assert!(matches!(a.point_id_options, Some(PointIdOptions::Uuid(_))));
    }

    #[test]
    fn test_backend_creation() {
        let backend = QdrantBackend::new(&VectorStoreConfig::default());
        assert!(backend.is_ok());
    }
}
