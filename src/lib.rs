pub mod cli;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use cli::{Cli, Commands};
pub use error::{AppError, IngestError};
pub use models::{Config, IngestionReport, OutputFormat, SourceRecord};
pub use services::{EmbeddingProvider, Ingestor, VectorIndex};
