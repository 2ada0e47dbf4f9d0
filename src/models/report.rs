//! Batch outcome models and output formats.

use serde::{Deserialize, Serialize};

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
    /// Documentation-friendly Markdown format
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// Classification of a per-record failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimited,
    ProviderError,
    Timeout,
    IndexError,
    InvalidRecord,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ProviderError => "provider_error",
            FailureKind::Timeout => "timeout",
            FailureKind::IndexError => "index_error",
            FailureKind::InvalidRecord => "invalid_record",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failed { kind: FailureKind, reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Result for one input record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    /// Zero-based position in the input.
    pub position: usize,
    pub name: String,
    /// Absent when the name could not produce a key.
    pub key: Option<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Accumulated outcomes of one `ingest` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionReport {
    pub outcomes: Vec<RecordOutcome>,
    pub total_records: usize,
    pub cancelled: bool,
    pub started_at: String,
    pub duration_ms: u64,
}

impl IngestionReport {
    pub fn new(total_records: usize) -> Self {
        Self {
            outcomes: Vec::with_capacity(total_records),
            total_records,
            cancelled: false,
            started_at: chrono::Utc::now().to_rfc3339(),
            duration_ms: 0,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Records never attempted because the batch was cancelled.
    pub fn unprocessed(&self) -> usize {
        self.total_records.saturating_sub(self.outcomes.len())
    }

    pub fn failures(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes.iter().filter(|o| !o.outcome.is_success())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.outcome.is_success())
            .filter_map(|o| o.key.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(position: usize, outcome: Outcome) -> RecordOutcome {
        RecordOutcome {
            position,
            name: format!("record {}", position),
            key: Some(format!("record-{}", position)),
            outcome,
        }
    }

    #[test]
    fn test_report_counts() {
        let mut report = IngestionReport::new(4);
        report.outcomes.push(outcome(0, Outcome::Success));
        report.outcomes.push(outcome(
            1,
            Outcome::Failed {
                kind: FailureKind::ProviderError,
                reason: "status 500".to_string(),
            },
        ));
        report.outcomes.push(outcome(2, Outcome::Success));

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.unprocessed(), 1);
        assert_eq!(report.keys().collect::<Vec<_>>(), vec!["record-0", "record-2"]);
        assert_eq!(report.failures().next().map(|o| o.position), Some(1));
    }

    #[test]
    fn test_outcome_serializes_flat() {
        let json = serde_json::to_value(outcome(
            3,
            Outcome::Failed {
                kind: FailureKind::RateLimited,
                reason: "rate limited".to_string(),
            },
        ))
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "rate_limited");
        assert_eq!(json["key"], "record-3");
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("md".parse::<OutputFormat>(), Ok(OutputFormat::Markdown));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
