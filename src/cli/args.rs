//! CLI argument definitions using clap.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

use crate::core::backfill::last_n_days;
use crate::core::models::Granularity;
use crate::error::{PvError, Result};

/// PV telemetry collector - hour/day/month/year rollups and range queries.
#[derive(Parser, Debug)]
#[command(name = "pvstat")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    // === Global flags ===
    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Telemetry database path
    #[arg(long, value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    /// Telemetry source base URL
    #[arg(long, value_name = "URL", global = true)]
    pub source_url: Option<String>,

    /// IANA timezone for day, month and year boundaries
    #[arg(long, value_name = "TZ", global = true)]
    pub timezone: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub const fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll the source once, store the sample and run the aggregation cascade
    Collect(CollectArgs),

    /// Import past days from the source's interval history
    Backfill(BackfillArgs),

    /// Run the aggregation cascade without polling
    Aggregate(AggregateArgs),

    /// Show the most recent buckets of one granularity
    Query(QueryArgs),

    /// Show the latest collected reading
    Current,

    /// Show table sizes and watermarks
    Stats,

    /// Collect on a fixed interval until interrupted
    Run(RunArgs),
}

/// Arguments for the `collect` command.
#[derive(Parser, Debug, Default)]
pub struct CollectArgs {
    /// Bypass the enable switch and the minimum interval
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `backfill` command.
#[derive(Parser, Debug, Default)]
pub struct BackfillArgs {
    /// Import the last N complete days
    #[arg(long, value_name = "N", conflicts_with_all = ["start", "end"])]
    pub days: Option<u32>,

    /// First day to import (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", requires = "end")]
    pub start: Option<NaiveDate>,

    /// Last day to import, inclusive (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", requires = "start")]
    pub end: Option<NaiveDate>,

    /// Fetch and compute without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Overwrite days that already have a bucket
    #[arg(long)]
    pub force: bool,
}

impl BackfillArgs {
    /// The inclusive day range to import, with `--days` counted back from `today`.
    ///
    /// # Errors
    /// Returns `InvalidDateRange` when no range is given, `--days` is zero, or
    /// `start` is after `end`.
    pub fn range(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
        match (self.days, self.start, self.end) {
            (Some(0), _, _) => Err(PvError::InvalidDateRange {
                start: String::new(),
                end: String::new(),
                message: "--days must be at least 1".to_string(),
            }),
            (Some(n), _, _) => Ok(last_n_days(today, n)),
            (None, Some(start), Some(end)) if start > end => Err(PvError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
                message: "start is after end".to_string(),
            }),
            (None, Some(start), Some(end)) => Ok((start, end)),
            _ => Err(PvError::InvalidDateRange {
                start: self.start.map(|d| d.to_string()).unwrap_or_default(),
                end: self.end.map(|d| d.to_string()).unwrap_or_default(),
                message: "pass --days N or both --start and --end".to_string(),
            }),
        }
    }
}

/// Arguments for the `aggregate` command.
#[derive(Parser, Debug, Default)]
pub struct AggregateArgs {
    /// Recompute daily, monthly and yearly buckets across the lookback windows
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `query` command.
#[derive(Parser, Debug)]
pub struct QueryArgs {
    /// Bucket granularity (hour, day, month, year)
    #[arg(long, short, default_value = "day")]
    pub granularity: Granularity,

    /// Number of buckets, clamped to the granularity's maximum
    #[arg(long, short, default_value = "7")]
    pub count: usize,
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Seconds between collections
    #[arg(long, default_value = "300")]
    pub interval: u64,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain-text tables
    #[default]
    Human,
    /// JSON output
    Json,
}
