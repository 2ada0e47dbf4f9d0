use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::{IngestionReport, Outcome, OutputFormat};

pub trait Formatter {
    fn format_report(&self, report: &IngestionReport) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_records(&self, records: &[RecordPreview]) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub embedding_url: String,
    pub embedding_model: String,
    pub dimension: usize,
    pub embedding_key_present: bool,
    pub index_driver: String,
    pub index_name: String,
    pub index_url: String,
    pub index_key_present: bool,
    pub index_reachable: bool,
    pub remote_dimension: Option<usize>,
    pub vector_count: u64,
    pub index_error: Option<String>,
}

impl StatusInfo {
    pub fn dimension_matches(&self) -> bool {
        self.remote_dimension.is_none_or(|d| d == self.dimension)
    }
}

/// One parsed input record, shown by `ingest --validate-only`.
#[derive(Debug, Clone, Serialize)]
pub struct RecordPreview {
    pub position: usize,
    pub name: String,
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

fn mark(ok: bool) -> &'static str {
    if ok { "[OK]" } else { "[MISSING]" }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_report(&self, report: &IngestionReport) -> String {
        let mut output = String::new();
        let title = if report.cancelled {
            "Ingestion Cancelled"
        } else {
            "Ingestion Complete"
        };
        let _ = writeln!(output, "{title}");
        let _ = writeln!(output, "{}", "-".repeat(title.len()));
        let _ = writeln!(output, "Records:     {}", report.total_records);
        let _ = writeln!(output, "Succeeded:   {}", report.succeeded());
        let _ = writeln!(output, "Failed:      {}", report.failed());
        if report.unprocessed() > 0 {
            let _ = writeln!(output, "Unprocessed: {}", report.unprocessed());
        }
        let _ = writeln!(output, "Duration:    {}ms", report.duration_ms);

        if report.failed() > 0 {
            let _ = writeln!(output, "\nFailures:");
            for failure in report.failures() {
                if let Outcome::Failed { kind, reason } = &failure.outcome {
                    let _ = writeln!(
                        output,
                        "  #{} {} [{}] {}",
                        failure.position, failure.name, kind, reason
                    );
                }
            }
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Status");
        let _ = writeln!(output, "------");
        let _ = writeln!(output, "Embedding:     {}", status.embedding_model);
        let _ = writeln!(output, "  URL:         {}", status.embedding_url);
        let _ = writeln!(output, "  Dimension:   {}", status.dimension);
        let _ = writeln!(
            output,
            "  API key:     {}",
            mark(status.embedding_key_present)
        );
        let _ = writeln!(output);

        let index_status = if status.index_reachable {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        let _ = writeln!(
            output,
            "Vector Index:  {} ({})",
            status.index_driver, index_status
        );
        let _ = writeln!(output, "  URL:         {}", status.index_url);
        let _ = writeln!(output, "  Index:       {}", status.index_name);
        if status.index_driver != "memory" {
            let _ = writeln!(output, "  API key:     {}", mark(status.index_key_present));
        }
        if status.index_reachable {
            if let Some(remote) = status.remote_dimension {
                let note = if status.dimension_matches() {
                    ""
                } else {
                    " (MISMATCH)"
                };
                let _ = writeln!(output, "  Dimension:   {remote}{note}");
            }
            let _ = writeln!(output, "  Vectors:     {}", status.vector_count);
        }
        if let Some(ref err) = status.index_error {
            let _ = writeln!(output, "  Error:       {err}");
        }
        output
    }

    fn format_records(&self, records: &[RecordPreview]) -> String {
        let mut output = String::new();
        for record in records {
            match (&record.key, &record.problem) {
                (Some(key), None) => {
                    let _ = writeln!(output, "  #{} {} -> {}", record.position, record.name, key);
                }
                (_, problem) => {
                    let _ = writeln!(
                        output,
                        "  #{} {:?} invalid: {}",
                        record.position,
                        record.name,
                        problem.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}

impl Formatter for JsonFormatter {
    fn format_report(&self, report: &IngestionReport) -> String {
        let json = serde_json::json!({
            "summary": {
                "total": report.total_records,
                "succeeded": report.succeeded(),
                "failed": report.failed(),
                "unprocessed": report.unprocessed(),
                "cancelled": report.cancelled,
            },
            "report": report,
        });
        self.render(&json)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let json = serde_json::json!({
            "embedding": {
                "url": status.embedding_url,
                "model": status.embedding_model,
                "dimension": status.dimension,
                "api_key_present": status.embedding_key_present,
            },
            "index": {
                "driver": status.index_driver,
                "name": status.index_name,
                "url": status.index_url,
                "api_key_present": status.index_key_present,
                "reachable": status.index_reachable,
                "dimension": status.remote_dimension,
                "dimension_matches": status.dimension_matches(),
                "vectors": status.vector_count,
                "error": status.index_error,
            }
        });
        self.render(&json)
    }

    fn format_records(&self, records: &[RecordPreview]) -> String {
        self.render(&serde_json::json!({ "records": records }))
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_report(&self, report: &IngestionReport) -> String {
        let mut output = String::new();
        if report.cancelled {
            let _ = writeln!(output, "## Ingestion Cancelled\n");
        } else {
            let _ = writeln!(output, "## Ingestion Complete\n");
        }
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Records | {} |", report.total_records);
        let _ = writeln!(output, "| Succeeded | {} |", report.succeeded());
        let _ = writeln!(output, "| Failed | {} |", report.failed());
        let _ = writeln!(output, "| Unprocessed | {} |", report.unprocessed());
        let _ = writeln!(output, "| Duration | {}ms |", report.duration_ms);

        if report.failed() > 0 {
            let _ = writeln!(output, "\n### Failures\n");
            let _ = writeln!(output, "| # | Name | Kind | Reason |");
            let _ = writeln!(output, "|---|------|------|--------|");
            for failure in report.failures() {
                if let Outcome::Failed { kind, reason } = &failure.outcome {
                    let _ = writeln!(
                        output,
                        "| {} | {} | `{}` | {} |",
                        failure.position,
                        failure.name,
                        kind,
                        reason.replace('|', "\\|")
                    );
                }
            }
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "## Status\n");

        let key = if status.embedding_key_present { "✅" } else { "❌" };
        let _ = writeln!(output, "### Embedding {}\n", key);
        let _ = writeln!(output, "- **Model:** {}", status.embedding_model);
        let _ = writeln!(output, "- **URL:** `{}`", status.embedding_url);
        let _ = writeln!(output, "- **Dimension:** {}", status.dimension);
        let _ = writeln!(output);

        let reachable = if status.index_reachable { "✅" } else { "❌" };
        let _ = writeln!(
            output,
            "### Vector Index ({}) {}\n",
            status.index_driver, reachable
        );
        let _ = writeln!(output, "- **URL:** `{}`", status.index_url);
        let _ = writeln!(output, "- **Index:** {}", status.index_name);
        if let Some(remote) = status.remote_dimension {
            let _ = writeln!(output, "- **Dimension:** {}", remote);
        }
        let _ = writeln!(output, "- **Vectors:** {}", status.vector_count);
        if let Some(ref err) = status.index_error {
            let _ = writeln!(output, "- **Error:** {}", err);
        }
        output
    }

    fn format_records(&self, records: &[RecordPreview]) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "| # | Name | Key |");
        let _ = writeln!(output, "|---|------|-----|");
        for record in records {
            let key = match (&record.key, &record.problem) {
                (Some(key), None) => format!("`{}`", key),
                (_, problem) => format!("⚠️ {}", problem.as_deref().unwrap_or("invalid")),
            };
            let _ = writeln!(output, "| {} | {} | {} |", record.position, record.name, key);
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}

/// Render a command failure, including its cause chain, in the chosen format.
pub fn render_failure(format: OutputFormat, error: &anyhow::Error) -> String {
    let rendered = get_formatter(format).format_error(&format!("{error:#}"));
    if rendered.ends_with('\n') {
        rendered
    } else {
        format!("{rendered}\n")
    }
}
