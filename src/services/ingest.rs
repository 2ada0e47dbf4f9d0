//! Sequential ingestion of records into a vector index.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::error::{IngestError, RecordError};
use crate::models::{
    IngestionConfig, IngestionReport, Outcome, RecordOutcome, SourceRecord, StableKey, UpsertEntry,
};
use crate::services::{EmbeddingProvider, VectorIndex};

type Observer<'a> = Box<dyn Fn(&RecordOutcome) + Send + Sync + 'a>;

/// What happened to one record.
enum Step {
    Done(Option<StableKey>, Result<(), RecordError>),
    Cancelled,
}

/// Embeds and upserts records one at a time, pacing between them.
///
/// Per-record failures are collected into the report; only fatal
/// configuration faults end the batch early.
pub struct Ingestor<'a> {
    embedder: &'a dyn EmbeddingProvider,
    index: &'a dyn VectorIndex,
    inter_record_delay: Duration,
    cancel: CancellationToken,
    observer: Option<Observer<'a>>,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        embedder: &'a dyn EmbeddingProvider,
        index: &'a dyn VectorIndex,
        config: &IngestionConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            inter_record_delay: Duration::from_millis(config.inter_record_delay_ms),
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.inter_record_delay = delay;
        self
    }

    /// Called after every recorded outcome, in input order.
    #[must_use]
    pub fn on_outcome(mut self, observer: impl Fn(&RecordOutcome) + Send + Sync + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub async fn ingest(&self, records: &[SourceRecord]) -> Result<IngestionReport, IngestError> {
        let span = info_span!("ingest", records = records.len(), index = self.index.name());
        self.run(records).instrument(span).await
    }

    async fn run(&self, records: &[SourceRecord]) -> Result<IngestionReport, IngestError> {
        let started = Instant::now();
        let mut report = IngestionReport::new(records.len());

        for (position, record) in records.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let (key, result) = match self.process(record).await {
                Step::Done(key, result) => (key, result),
                Step::Cancelled => {
                    report.cancelled = true;
                    break;
                }
            };
            let key_str = key.as_ref().map(ToString::to_string);

            let outcome = match result {
                Ok(()) => {
                    info!(position, key = key_str.as_deref().unwrap_or(""), "upserted record");
                    Outcome::Success
                }
                Err(err) => match err.into_fatal() {
                    Ok(cause) => {
                        error!(position, name = %record.name, error = %cause, "aborting batch");
                        return Err(IngestError::Aborted {
                            position,
                            key: key_str.unwrap_or_default(),
                            cause,
                        });
                    }
                    Err(err) => {
                        warn!(position, name = %record.name, error = %err, "skipped record");
                        Outcome::Failed {
                            kind: err.kind(),
                            reason: err.to_string(),
                        }
                    }
                },
            };

            let record_outcome = RecordOutcome {
                position,
                name: record.name.clone(),
                key: key_str,
                outcome,
            };
            if let Some(observer) = &self.observer {
                observer(&record_outcome);
            }
            report.outcomes.push(record_outcome);

            if position + 1 < records.len() && !self.pace().await {
                report.cancelled = true;
                break;
            }
        }

        if report.cancelled {
            warn!(
                processed = report.outcomes.len(),
                remaining = report.unprocessed(),
                "ingestion cancelled"
            );
        }
        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    async fn process(&self, record: &SourceRecord) -> Step {
        let key = match StableKey::derive(&record.name) {
            Ok(key) => key,
            Err(e) => return Step::Done(None, Err(e)),
        };

        let vector = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Step::Cancelled,
            result = self.embedder.embed(&record.description) => match result {
                Ok(vector) => vector,
                Err(e) => return Step::Done(Some(key), Err(e.into())),
            },
        };

        let entry = UpsertEntry::from_record(key.clone(), vector, record);
        let result = self
            .index
            .upsert(vec![entry])
            .await
            .map_err(RecordError::from);
        Step::Done(Some(key), result)
    }

    /// Wait out the inter-record delay; false if cancelled meanwhile.
    async fn pace(&self) -> bool {
        if self.inter_record_delay.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = sleep(self.inter_record_delay) => true,
        }
    }
}
