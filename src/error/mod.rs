//! Error types for pvstat.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! - **Source**: the telemetry source was unreachable, timed out, or sent a
//!   payload we could not make sense of
//! - **Storage**: the bucket store rejected a read or write
//! - **Configuration**: config file parsing, validation, or missing values
//! - **Input**: bad CLI input such as an unknown granularity or date range
//! - **Internal**: unexpected errors, bugs, or unclassified issues
//!
//! Each error has a stable error code (e.g., `PVS-S001`) for programmatic handling.
//!
//! A gap in the data is never an error. Aggregators skip empty periods and
//! the query layer simply returns fewer buckets.

use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Telemetry source issues (unreachable, timeout, malformed payload).
    Source,
    /// Bucket store issues.
    Storage,
    /// Configuration issues (parse errors, invalid values).
    Configuration,
    /// Invalid user input.
    Input,
    /// Internal errors (bugs, unexpected state, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Source => "Telemetry source error",
            Self::Storage => "Storage error",
            Self::Configuration => "Configuration error",
            Self::Input => "Input error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Source => "S",
            Self::Storage => "D",
            Self::Configuration => "C",
            Self::Input => "I",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes for the batch commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Invalid configuration or CLI input
    ConfigError = 3,
    /// Telemetry source timed out
    Timeout = 4,
    /// Telemetry source unreachable or returned garbage
    SourceUnavailable = 5,
    /// Bucket store failure
    StorageError = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Main error type for pvstat operations.
#[derive(Error, Debug)]
pub enum PvError {
    // ==========================================================================
    // Source errors
    // ==========================================================================
    /// The telemetry source could not be reached or answered with a failure status.
    #[error("telemetry source unavailable: {message}")]
    SourceUnavailable { message: String },

    /// The telemetry request exceeded the fixed timeout.
    #[error("telemetry source timed out after {seconds}s")]
    SourceTimeout { seconds: u64 },

    /// The telemetry payload could not be decoded or normalized.
    #[error("malformed telemetry response: {0}")]
    MalformedResponse(String),

    /// A batch run finished but some of its days failed.
    #[error("partial failure: {failed} day(s) failed")]
    PartialFailure { failed: usize },

    // ==========================================================================
    // Storage errors
    // ==========================================================================
    /// A store read or write failed.
    #[error("store error: {0}")]
    Store(String),

    // ==========================================================================
    // Configuration errors
    // ==========================================================================
    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    /// Collection is disabled in the config and was not forced.
    #[error("collector is disabled (set general.enabled = true or pass --force)")]
    CollectorDisabled,

    // ==========================================================================
    // Input errors
    // ==========================================================================
    /// Unknown bucket granularity.
    #[error("invalid granularity '{0}' (expected hour, day, month, or year)")]
    InvalidGranularity(String),

    /// Backfill range was empty or unparsable.
    #[error("invalid date range {start}..{end}: {message}")]
    InvalidDateRange {
        start: String,
        end: String,
        message: String,
    },

    // ==========================================================================
    // Wrappers
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for PvError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl PvError {
    /// Map error to process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::SourceTimeout { .. } => ExitCode::Timeout,

            Self::SourceUnavailable { .. } | Self::MalformedResponse(_) => {
                ExitCode::SourceUnavailable
            }

            Self::Store(_) => ExitCode::StorageError,

            Self::Config(_)
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::CollectorDisabled
            | Self::InvalidGranularity(_)
            | Self::InvalidDateRange { .. } => ExitCode::ConfigError,

            Self::PartialFailure { .. } | Self::Io(_) | Self::Json(_) | Self::Other(_) => {
                ExitCode::GeneralError
            }
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::SourceUnavailable { .. }
            | Self::SourceTimeout { .. }
            | Self::MalformedResponse(_)
            | Self::PartialFailure { .. } => ErrorCategory::Source,
            Self::Store(_) => ErrorCategory::Storage,
            Self::Config(_)
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::CollectorDisabled => ErrorCategory::Configuration,
            Self::InvalidGranularity(_) | Self::InvalidDateRange { .. } => ErrorCategory::Input,
            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `PVS-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "PVS-S001",
            Self::SourceTimeout { .. } => "PVS-S002",
            Self::MalformedResponse(_) => "PVS-S003",
            Self::PartialFailure { .. } => "PVS-S010",

            Self::Store(_) => "PVS-D001",

            Self::Config(_) => "PVS-C001",
            Self::ConfigParse { .. } => "PVS-C002",
            Self::ConfigInvalid { .. } => "PVS-C003",
            Self::CollectorDisabled => "PVS-C010",

            Self::InvalidGranularity(_) => "PVS-I001",
            Self::InvalidDateRange { .. } => "PVS-I002",

            Self::Io(_) => "PVS-X001",
            Self::Json(_) => "PVS-X002",
            Self::Other(_) => "PVS-X099",
        }
    }

    /// Whether the next scheduled tick is expected to succeed where this one failed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. }
                | Self::SourceTimeout { .. }
                | Self::MalformedResponse(_)
                | Self::Store(_)
        )
    }
}

/// Result type alias for pvstat operations.
pub type Result<T> = std::result::Result<T, PvError>;
