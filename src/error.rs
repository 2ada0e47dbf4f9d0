//! Error types for the ingestion pipeline.

use std::time::Duration;

use thiserror::Error;

use crate::models::FailureKind;
use crate::utils::retry::Retryable;

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("rate limited by embedding provider after {attempts} attempt(s)")]
    RateLimited {
        attempts: u32,
        retry_after: Option<Duration>,
    },

    #[error("embedding provider error: {0}")]
    ProviderError(String),

    #[error("failed to connect to embedding provider: {0}")]
    ConnectionError(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding request timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("embedding provider rejected credentials: {0}")]
    Unauthorized(String),
}

impl EmbeddingError {
    /// Configuration-level faults that no retry or later record can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EmbeddingError::Unauthorized(_))
    }

    /// Rewrite the attempt counter once the retry loop has given up.
    pub(crate) fn with_attempts(self, attempts: u32) -> Self {
        match self {
            EmbeddingError::RateLimited { .. } => EmbeddingError::RateLimited {
                attempts,
                retry_after: None,
            },
            EmbeddingError::Timeout { .. } => EmbeddingError::Timeout { attempts },
            other => other,
        }
    }
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::RateLimited { .. } | EmbeddingError::Timeout { .. }
        )
    }

    fn retry_hint(&self) -> Option<Duration> {
        match self {
            EmbeddingError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Errors related to vector index operations.
#[derive(Debug, Error)]
pub enum VectorIndexError {
    #[error("failed to connect to vector index: {0}")]
    ConnectionError(String),

    #[error("collection error: {0}")]
    CollectionError(String),

    #[error("upsert error: {0}")]
    UpsertError(String),

    #[error("describe error: {0}")]
    DescribeError(String),

    #[error("vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector index rejected credentials: {0}")]
    Unauthorized(String),
}

impl VectorIndexError {
    /// Configuration-level faults that abort the whole batch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VectorIndexError::DimensionMismatch { .. } | VectorIndexError::Unauthorized(_)
        )
    }
}

/// Per-record failure, converted into a `Failed` outcome by the orchestrator.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] VectorIndexError),
}

impl RecordError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RecordError::InvalidRecord(_) => FailureKind::InvalidRecord,
            RecordError::Embedding(EmbeddingError::RateLimited { .. }) => FailureKind::RateLimited,
            RecordError::Embedding(EmbeddingError::Timeout { .. }) => FailureKind::Timeout,
            RecordError::Embedding(_) => FailureKind::ProviderError,
            RecordError::Index(_) => FailureKind::IndexError,
        }
    }

    pub fn is_fatal(&self) -> bool {
        match self {
            RecordError::InvalidRecord(_) => false,
            RecordError::Embedding(e) => e.is_fatal(),
            RecordError::Index(e) => e.is_fatal(),
        }
    }

    /// Split fatal errors from those that only fail this record.
    pub fn into_fatal(self) -> Result<FatalError, RecordError> {
        match self {
            RecordError::Embedding(e) if e.is_fatal() => Ok(FatalError::Embedding(e)),
            RecordError::Index(e) if e.is_fatal() => Ok(FatalError::Index(e)),
            other => Err(other),
        }
    }
}

/// The cause of a batch abort.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] VectorIndexError),
}

/// Errors that abort an entire ingestion batch.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("batch aborted at record #{position} ('{key}'): {cause}")]
    Aborted {
        position: usize,
        key: String,
        #[source]
        cause: FatalError,
    },

    #[error("vector index preflight failed: {0}")]
    Preflight(#[from] VectorIndexError),
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("missing credentials: set {0}")]
    MissingCredentials(&'static str),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector index error: {0}")]
    Index(#[from] VectorIndexError),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),
}
