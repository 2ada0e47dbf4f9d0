mod embedding;
mod ingest;
pub mod vector_index;

pub use embedding::{EmbeddingProvider, OpenAiEmbedder};
pub use ingest::Ingestor;
pub use vector_index::{
    IndexInfo, MemoryIndex, PineconeBackend, QdrantBackend, VectorIndex, create_backend,
};
