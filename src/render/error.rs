//! Error rendering for pvstat.
//!
//! Plain one-or-two line text for terminals and structured JSON for scripts.

use crate::cli::args::OutputFormat;
use crate::error::PvError;

/// Render an error for stderr in the requested format.
#[must_use]
pub fn render_error(error: &PvError, format: OutputFormat, pretty: bool) -> String {
    match format {
        OutputFormat::Json => render_error_json(error, pretty),
        OutputFormat::Human => render_simple(error),
    }
}

/// Render error as structured JSON for machine consumption.
#[must_use]
pub fn render_error_json(error: &PvError, pretty: bool) -> String {
    let error_json = ErrorJson::from_error(error);
    if pretty {
        serde_json::to_string_pretty(&error_json).unwrap_or_else(|_| render_simple(error))
    } else {
        serde_json::to_string(&error_json).unwrap_or_else(|_| render_simple(error))
    }
}

fn render_simple(error: &PvError) -> String {
    let mut lines = vec![format!("Error [{}]: {}", error.error_code(), error)];
    if let Some(hint) = fix_hint(error) {
        lines.push(format!("Fix: {hint}"));
    }
    lines.join("\n")
}

/// A short next step for errors the operator can act on.
const fn fix_hint(error: &PvError) -> Option<&'static str> {
    match error {
        PvError::SourceUnavailable { .. } | PvError::SourceTimeout { .. } => {
            Some("check [source] base_url in the config or pass --source-url")
        }
        PvError::CollectorDisabled => Some("pvstat collect --force"),
        PvError::ConfigParse { .. } | PvError::ConfigInvalid { .. } => {
            Some("fix the config file named above or pass --config")
        }
        PvError::Store(_) => Some("check that the database path is writable, or pass --db"),
        PvError::InvalidGranularity(_) => Some("use one of hour, day, month, year"),
        PvError::InvalidDateRange { .. } => {
            Some("pvstat backfill --days N, or --start YYYY-MM-DD --end YYYY-MM-DD")
        }
        PvError::PartialFailure { .. } => Some("re-run the backfill for the failed days"),
        _ => None,
    }
}

/// JSON representation of an error for machine consumption.
#[derive(serde::Serialize)]
struct ErrorJson {
    error_code: String,
    category: String,
    message: String,
    is_retryable: bool,
    exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
}

impl ErrorJson {
    fn from_error(error: &PvError) -> Self {
        Self {
            error_code: error.error_code().to_string(),
            category: error.category().to_string(),
            message: error.to_string(),
            is_retryable: error.is_retryable(),
            exit_code: i32::from(error.exit_code()),
            hint: fix_hint(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_render_includes_error_code() {
        let err = PvError::SourceTimeout { seconds: 10 };
        let output = render_error(&err, OutputFormat::Human, false);
        assert!(output.starts_with("Error [PVS-S002]"));
        assert!(output.contains("Fix:"));
    }

    #[test]
    fn simple_render_without_hint_is_one_line() {
        let err = PvError::Other(anyhow::anyhow!("boom"));
        assert_eq!(render_simple(&err).lines().count(), 1);
    }

    #[test]
    fn json_render_includes_all_fields() {
        let err = PvError::Store("database is locked".to_string());
        let output = render_error(&err, OutputFormat::Json, true);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["error_code"], "PVS-D001");
        assert_eq!(parsed["category"], "Storage error");
        assert_eq!(parsed["is_retryable"], true);
        assert_eq!(parsed["exit_code"], 6);
        assert!(parsed["message"].as_str().unwrap().contains("locked"));
    }
}
