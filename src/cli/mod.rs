//! CLI argument parsing and command dispatch.

pub mod aggregate;
pub mod args;
pub mod backfill;
pub mod collect;
pub mod query;
pub mod run;
pub mod stats;

use serde::Serialize;

pub use args::{Cli, Commands, OutputFormat};

use crate::core::aggregate::AggregationSettings;
use crate::core::calendar::Calendar;
use crate::error::Result;
use crate::render::robot;
use crate::storage::{ResolvedConfig, TelemetryStore};
use crate::util::should_use_color;

/// Resolved configuration plus the open store, shared by every command.
pub struct Context {
    pub resolved: ResolvedConfig,
    pub store: TelemetryStore,
    pub format: OutputFormat,
    pub pretty: bool,
    pub no_color: bool,
}

impl Context {
    /// Resolve configuration for `cli` and open the telemetry database.
    ///
    /// # Errors
    /// Returns config errors from resolution and validation, or a store error
    /// if the database cannot be opened or migrated.
    pub fn open(cli: &Cli) -> Result<Self> {
        let resolved = ResolvedConfig::resolve(cli)?;
        tracing::debug!(
            config = %resolved.config_path.display(),
            config_source = %resolved.sources.config_path,
            db = %resolved.db_path.display(),
            db_source = %resolved.sources.db_path,
            timezone = %resolved.config.general.timezone,
            "Configuration resolved"
        );
        let store = TelemetryStore::open(&resolved.db_path)?;
        Ok(Self {
            resolved,
            store,
            format: cli.effective_format(),
            pretty: cli.pretty,
            no_color: !should_use_color(cli.no_color),
        })
    }

    #[must_use]
    pub const fn calendar(&self) -> Calendar {
        self.resolved.calendar
    }

    #[must_use]
    pub const fn aggregation(&self) -> AggregationSettings {
        AggregationSettings::from_config(&self.resolved.config)
    }

    /// Print `value` as JSON or through the given human renderer.
    ///
    /// # Errors
    /// Returns an error if JSON serialization fails.
    pub fn emit<T, F>(&self, value: &T, human: F) -> Result<()>
    where
        T: Serialize,
        F: FnOnce(&T) -> String,
    {
        match self.format {
            OutputFormat::Json => println!("{}", robot::render(value, self.pretty)?),
            OutputFormat::Human => print!("{}", human(value)),
        }
        Ok(())
    }
}
