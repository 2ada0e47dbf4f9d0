mod config;
mod record;
mod report;

pub use config::{
    Config, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_URL,
    DEFAULT_INDEX_NAME, DEFAULT_INTER_RECORD_DELAY_MS, DEFAULT_QDRANT_URL, EmbeddingConfig,
    IndexConfig, IndexDriver, IngestionConfig, OPENAI_API_KEY_ENV, PINECONE_API_KEY_ENV,
    PINECONE_INDEX_HOST_ENV, QDRANT_API_KEY_ENV, RetrySettings,
};
pub use record::{KEY_SEPARATOR, SourceRecord, StableKey, UpsertEntry, sample_records};
pub use report::{FailureKind, IngestionReport, Outcome, OutputFormat, RecordOutcome};
