//! Vector index abstraction layer.
//!
//! This module provides a trait-based abstraction over the supported index
//! backends (Pinecone, Qdrant, in-memory) so the ingestion loop never depends
//! on a concrete client.

mod memory;
mod pinecone;
mod qdrant;

pub use memory::MemoryIndex;
pub use pinecone::PineconeBackend;
pub use qdrant::QdrantBackend;

use async_trait::async_trait;
use tracing::info;

use crate::error::{AppError, VectorIndexError};
use crate::models::{IndexConfig, IndexDriver, UpsertEntry};

/// Index statistics reported by the backend.
#[derive(Debug, Clone, Default)]
pub struct IndexInfo {
    /// Dimension of the remote index, when the backend reports one.
    pub dimension: Option<usize>,
    pub vector_count: u64,
}

/// Abstract trait for vector index operations.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Check if the index is reachable.
    async fn health_check(&self) -> Result<bool, VectorIndexError>;

    /// Get dimension and size of the index.
    async fn describe(&self) -> Result<IndexInfo, VectorIndexError>;

    /// Make the index ready for writes and verify its dimension.
    ///
    /// Backends that can create their index on demand do so here.
    async fn prepare(&self) -> Result<IndexInfo, VectorIndexError> {
        let info = self.describe().await?;
        check_remote_dimension(self.dimension(), &info)?;
        Ok(info)
    }

    /// Insert or replace entries by key.
    async fn upsert(&self, entries: Vec<UpsertEntry>) -> Result<(), VectorIndexError>;

    /// Index or collection name.
    fn name(&self) -> &str;

    /// Dimension every upserted vector must have.
    fn dimension(&self) -> usize;
}

/// Reject any entry whose vector length differs from the configured dimension.
pub fn check_dimensions(expected: usize, entries: &[UpsertEntry]) -> Result<(), VectorIndexError> {
    match entries.iter().find(|e| e.vector.len() != expected) {
        Some(entry) => Err(VectorIndexError::DimensionMismatch {
            expected,
            actual: entry.vector.len(),
        }),
        None => Ok(()),
    }
}

fn check_remote_dimension(configured: usize, info: &IndexInfo) -> Result<(), VectorIndexError> {
    match info.dimension {
        Some(remote) if remote != configured => Err(VectorIndexError::DimensionMismatch {
            expected: remote,
            actual: configured,
        }),
        _ => Ok(()),
    }
}

/// Create a vector index backend based on configuration.
pub fn create_backend(
    config: &IndexConfig,
    dimension: usize,
) -> Result<Box<dyn VectorIndex>, AppError> {
    info!(driver = %config.driver, index = %config.name, dimension, "creating vector index client");
    match config.driver {
        IndexDriver::Pinecone => Ok(Box::new(PineconeBackend::new(config, dimension)?)),
        IndexDriver::Qdrant => Ok(Box::new(QdrantBackend::new(config, dimension)?)),
        IndexDriver::Memory => Ok(Box::new(MemoryIndex::new(&config.name, dimension))),
    }
}
