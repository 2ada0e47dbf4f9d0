use std::path::Path;

use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, IndexDriver, OutputFormat};
use crate::services::create_backend;

pub async fn handle_status(
    config_path: Option<&Path>,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let formatter = get_formatter(format);
    let dimension = config.embedding.dimension as usize;

    let (index_reachable, remote_dimension, vector_count, index_error) =
        match create_backend(&config.index, dimension) {
            Ok(index) => match index.describe().await {
                Ok(info) => (true, info.dimension, info.vector_count, None),
                Err(e) => (false, None, 0, Some(e.to_string())),
            },
            Err(e) => (false, None, 0, Some(e.to_string())),
        };

    let status = StatusInfo {
        embedding_url: config.embedding.url.clone(),
        embedding_model: config.embedding.model.clone(),
        dimension,
        embedding_key_present: config.embedding.api_key.is_some(),
        index_driver: config.index.driver.to_string(),
        index_name: config.index.name.clone(),
        index_url: config.index.effective_url().to_string(),
        index_key_present: config.index.api_key.is_some(),
        index_reachable,
        remote_dimension,
        vector_count,
        index_error,
    };

    print!("{}", formatter.format_status(&status));

    if !status.embedding_key_present || !status.index_reachable || !status.dimension_matches() {
        eprintln!();
        if !status.embedding_key_present {
            eprintln!("Hint: set OPENAI_API_KEY in the environment or a .env file.");
        }
        if !status.index_reachable {
            match config.index.driver {
                IndexDriver::Pinecone => {
                    eprintln!(
                        "Warning: Pinecone index not reachable. Check PINECONE_API_KEY and PINECONE_INDEX_HOST."
                    );
                }
                IndexDriver::Qdrant => {
                    eprintln!(
                        "Warning: Qdrant not running. Start with: docker run -p 6334:6334 qdrant/qdrant"
                    );
                }
                IndexDriver::Memory => {}
            }
        }
        if !status.dimension_matches() {
            eprintln!(
                "Warning: embedding.dimension does not match the index; ingestion will abort."
            );
        }
    }

    Ok(())
}
