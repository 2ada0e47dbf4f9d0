//! Ingest command implementation.

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::output::{RecordPreview, get_formatter};
use crate::error::IngestError;
use crate::models::{Config, IndexDriver, OutputFormat, SourceRecord, StableKey, sample_records};
use crate::services::{Ingestor, OpenAiEmbedder, create_backend};
use crate::utils::read_input;

/// Arguments for the ingest command.
#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Path to JSON or JSONL file (use - for stdin)
    #[arg(conflicts_with = "sample")]
    pub file: Option<PathBuf>,

    /// Ingest the built-in sample records
    #[arg(long)]
    pub sample: bool,

    /// Delay between records in milliseconds
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Vector index driver: pinecone, qdrant, or memory
    #[arg(long)]
    pub driver: Option<IndexDriver>,

    /// Only validate the input without embedding or upserting
    #[arg(long)]
    pub validate_only: bool,
}

/// Handle the ingest command.
pub async fn handle_ingest(
    args: IngestArgs,
    config_path: Option<&Path>,
    format: OutputFormat,
    verbose: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let mut config = Config::load(config_path).context("failed to load configuration")?;
    let driver_changed = args.driver.is_some_and(|d| d != config.index.driver);
    apply_overrides(&mut config, &args);
    if driver_changed {
        // Index credentials are picked per driver.
        config.index.api_key = None;
        config.apply_env(|key| std::env::var(key).ok());
    }
    let formatter = get_formatter(format);

    let records = if args.sample {
        sample_records()
    } else {
        let input = read_input(args.file.as_deref()).context("failed to read input")?;
        parse_records(&input)?
    };

    if records.is_empty() {
        println!("{}", formatter.format_message("No records found in input."));
        return Ok(());
    }

    if args.validate_only {
        let previews = preview_records(&records);
        let invalid = previews.iter().filter(|p| p.problem.is_some()).count();
        print!("{}", formatter.format_records(&previews));
        println!(
            "{}",
            formatter.format_message(&format!(
                "Validation finished: {} records, {} invalid",
                records.len(),
                invalid
            ))
        );
        return Ok(());
    }

    let embedder = OpenAiEmbedder::new(&config.embedding)?;
    let index = create_backend(&config.index, config.embedding.dimension as usize)?;

    let info = index.prepare().await.map_err(IngestError::Preflight)?;
    info!(
        index = index.name(),
        vectors = info.vector_count,
        "vector index ready"
    );

    let pb = ProgressBar::new(records.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let report = Ingestor::new(&embedder, index.as_ref(), &config.ingestion)
        .with_cancellation(cancel)
        .on_outcome(|outcome| {
            pb.inc(1);
            pb.set_message(outcome.name.clone());
            if verbose && !outcome.outcome.is_success() {
                pb.println(format!("Failed #{} {}", outcome.position, outcome.name));
            }
        })
        .ingest(&records)
        .await;
    pb.finish_and_clear();

    let report = report?;
    print!("{}", formatter.format_report(&report));

    Ok(())
}

fn apply_overrides(config: &mut Config, args: &IngestArgs) {
    if let Some(driver) = args.driver {
        config.index.driver = driver;
    }
    if let Some(delay) = args.delay_ms {
        config.ingestion.inter_record_delay_ms = delay;
    }
}

fn preview_records(records: &[SourceRecord]) -> Vec<RecordPreview> {
    records
        .iter()
        .enumerate()
        .map(|(position, record)| {
            let (key, problem) = match StableKey::derive(&record.name) {
                Ok(key) if record.description.trim().is_empty() => {
                    (Some(key.to_string()), Some("empty description".to_string()))
                }
                Ok(key) => (Some(key.to_string()), None),
                Err(e) => (None, Some(e.to_string())),
            };
            RecordPreview {
                position,
                name: record.name.clone(),
                key,
                problem,
            }
        })
        .collect()
}

/// Parse records from a JSON array or JSONL.
fn parse_records(input: &str) -> Result<Vec<SourceRecord>> {
    let input = input.trim();

    if input.is_empty() {
        return Ok(Vec::new());
    }

    if input.starts_with('[') {
        return serde_json::from_str(input).context("failed to parse JSON array");
    }

    let mut records = Vec::new();
    for (i, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: SourceRecord = serde_json::from_str(line)
            .with_context(|| format!("failed to parse JSON at line {}", i + 1))?;
        records.push(record);
    }

    Ok(records)
}
