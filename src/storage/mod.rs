//! Storage for configuration and telemetry buckets.

pub mod config;
pub mod paths;
pub mod schema;
pub mod store;

pub use config::{
    Config, ConfigOverrides, ConfigSource, ConfigSources, ENV_CAPACITY_KW, ENV_CONFIG, ENV_DB,
    ENV_SOURCE_URL, ENV_TIMEZONE, ResolvedConfig,
};
pub use paths::AppPaths;
pub use schema::{SCHEMA_VERSION, run_migrations};
pub use store::{TelemetryStore, Watermark};
