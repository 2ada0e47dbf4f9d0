//! Qdrant vector index backend implementation.

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    CollectionInfo, CreateCollectionBuilder, Distance, PointStruct, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::{IndexInfo, VectorIndex, check_dimensions};
use crate::error::VectorIndexError;
use crate::models::{IndexConfig, UpsertEntry};

/// Qdrant vector index backend.
pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantBackend {
    /// Create a new Qdrant backend from configuration.
    pub fn new(config: &IndexConfig, dimension: usize) -> Result<Self, VectorIndexError> {
        let mut builder =
            Qdrant::from_url(config.effective_url()).timeout(Duration::from_secs(config.timeout_secs));

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorIndexError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.name.clone(),
            dimension,
        })
    }

    async fn collection_info(&self) -> Result<Option<CollectionInfo>, VectorIndexError> {
        match self.client.collection_info(&self.collection).await {
            Ok(info) => Ok(info.result),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("not found") || msg.contains("doesn't exist") {
                    Ok(None)
                } else {
                    Err(classify_error(msg, VectorIndexError::CollectionError))
                }
            }
        }
    }

    async fn create_collection(&self) -> Result<(), VectorIndexError> {
        let create_collection = CreateCollectionBuilder::new(&self.collection).vectors_config(
            VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
        );

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| classify_error(e.to_string(), VectorIndexError::CollectionError))?;

        info!(collection = %self.collection, dimension = self.dimension, "created collection");
        Ok(())
    }
}

fn info_from(info: &CollectionInfo) -> IndexInfo {
    let dimension = info
        .config
        .as_ref()
        .and_then(|c| c.params.as_ref())
        .and_then(|p| p.vectors_config.as_ref())
        .and_then(|v| v.config.as_ref())
        .and_then(|kind| match kind {
            VectorsConfigKind::Params(params) => Some(params.size as usize),
            VectorsConfigKind::ParamsMap(_) => None,
        });

    IndexInfo {
        dimension,
        vector_count: info.points_count.unwrap_or(0),
    }
}

/// Qdrant reports auth and dimension faults only through status messages.
fn classify_error(msg: String, fallback: fn(String) -> VectorIndexError) -> VectorIndexError {
    let lower = msg.to_lowercase();
    if lower.contains("unauthenticated") || lower.contains("permission denied") {
        VectorIndexError::Unauthorized(msg)
    } else if lower.contains("connect") || lower.contains("transport error") {
        VectorIndexError::ConnectionError(msg)
    } else {
        fallback(msg)
    }
}

#[async_trait]
impl VectorIndex for QdrantBackend {
    async fn health_check(&self) -> Result<bool, VectorIndexError> {
        self.client
            .health_check()
            .await
            .map(|_| true)
            .map_err(|e| VectorIndexError::ConnectionError(e.to_string()))
    }

    async fn describe(&self) -> Result<IndexInfo, VectorIndexError> {
        Ok(self
            .collection_info()
            .await?
            .as_ref()
            .map(info_from)
            .unwrap_or_default())
    }

    async fn prepare(&self) -> Result<IndexInfo, VectorIndexError> {
        match self.collection_info().await? {
            Some(info) => {
                let info = info_from(&info);
                if let Some(remote) = info.dimension
                    && remote != self.dimension
                {
                    return Err(VectorIndexError::DimensionMismatch {
                        expected: remote,
                        actual: self.dimension,
                    });
                }
                Ok(info)
            }
            None => {
                self.create_collection().await?;
                Ok(IndexInfo {
                    dimension: Some(self.dimension),
                    vector_count: 0,
                })
            }
        }
    }

    async fn upsert(&self, entries: Vec<UpsertEntry>) -> Result<(), VectorIndexError> {
        if entries.is_empty() {
            return Ok(());
        }
        check_dimensions(self.dimension, &entries)?;

        let points: Vec<PointStruct> = entries.into_iter().map(to_point).collect();
        debug!(collection = %self.collection, count = points.len(), "upserting points");

        let upsert = UpsertPointsBuilder::new(&self.collection, points).wait(true);

        self.client
            .upsert_points(upsert)
            .await
            .map_err(|e| classify_error(e.to_string(), VectorIndexError::UpsertError))?;

        Ok(())
    }

    fn name(&self) -> &str {
        &self.collection
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Point ids must be UUIDs, so the key travels in the payload.
fn to_point(entry: UpsertEntry) -> PointStruct {
    let id = entry.key.point_uuid();
    let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
    payload.insert("key".to_string(), entry.key.to_string().into());
    for (k, v) in entry.metadata {
        payload.insert(k, v.into());
    }
    PointStruct::new(id, entry.vector, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndexDriver, StableKey};
    use qdrant_client::qdrant::point_id::PointIdOptions;
    use qdrant_client::qdrant::value::Kind;
    use std::collections::BTreeMap;

    #[test]
    fn test_to_point_uses_deterministic_uuid() {
        let mut metadata = BTreeMap::new();
        metadata.insert("advice".to_string(), "Rest.".to_string());
        let key = StableKey::derive("Fatigue").unwrap();
        let expected_id = key.point_uuid();

        let point = to_point(UpsertEntry {
            key,
            vector: vec![0.1, 0.2],
            metadata,
        });

        let id = point.id.and_then(|id| id.point_id_options);
        assert_eq!(id, Some(PointIdOptions::Uuid(expected_id)));
        let key_value = point.payload.get("key").and_then(|v| v.kind.clone());
        assert_eq!(key_value, Some(Kind::StringValue("fatigue".to_string())));
        assert!(point.payload.contains_key("advice"));
    }

    #[test]
    fn test_classify_error() {
        assert!(matches!(
            classify_error(
                "status: Unauthenticated, message: \"Invalid api-key\"".to_string(),
                VectorIndexError::UpsertError
            ),
            VectorIndexError::Unauthorized(_)
        ));
        assert!(matches!(
            classify_error("bad payload".to_string(), VectorIndexError::UpsertError),
            VectorIndexError::UpsertError(_)
        ));
    }

    #[test]
    fn test_backend_creation() {
        let config = IndexConfig {
            driver: IndexDriver::Qdrant,
            name: "advice".to_string(),
            ..Default::default()
        };
        let backend = QdrantBackend::new(&config, 1536).unwrap();
        assert_eq!(backend.name(), "advice");
        assert_eq!(backend.dimension(), 1536);
    }
}
