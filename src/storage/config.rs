//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux: `~/.config/pvstat/config.toml`
//! - macOS: `~/Library/Application Support/com.pvstat.pvstat/config.toml`
//! - Windows: `%APPDATA%/pvstat/config/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `PVSTAT_CONFIG`: Override config file path
//! - `PVSTAT_DB`: Override database path
//! - `PVSTAT_SOURCE_URL`: Telemetry source base URL
//! - `PVSTAT_TIMEZONE`: IANA timezone for day/month/year boundaries
//! - `PVSTAT_CAPACITY_KW`: Rated system capacity in kW

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::cli::args::Cli;
use crate::core::calendar::Calendar;
use crate::error::{PvError, Result};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "PVSTAT_CONFIG";
/// Environment variable to override the database path.
pub const ENV_DB: &str = "PVSTAT_DB";
/// Environment variable for the telemetry source base URL.
pub const ENV_SOURCE_URL: &str = "PVSTAT_SOURCE_URL";
/// Environment variable for the boundary timezone.
pub const ENV_TIMEZONE: &str = "PVSTAT_TIMEZONE";
/// Environment variable for rated capacity in kW.
pub const ENV_CAPACITY_KW: &str = "PVSTAT_CAPACITY_KW";

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Values given on the command line that take precedence over everything else.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub source_url: Option<String>,
    pub timezone: Option<String>,
}

impl From<&Cli> for ConfigOverrides {
    fn from(cli: &Cli) -> Self {
        Self {
            config_path: cli.config.clone(),
            db_path: cli.db.clone(),
            source_url: cli.source_url.clone(),
            timezone: cli.timezone.clone(),
        }
    }
}

/// Fully resolved configuration after merging CLI, env vars, and config file.
///
/// `config` holds the effective values, with overrides already folded into
/// the matching sections.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: Config,
    /// File the config was read from (it may not exist).
    pub config_path: PathBuf,
    /// Telemetry database location.
    pub db_path: PathBuf,
    /// Boundary calculator for the configured timezone.
    pub calendar: Calendar,
    /// Telemetry request timeout.
    pub timeout: Duration,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub config_path: ConfigSource,
    pub db_path: ConfigSource,
    pub source_url: ConfigSource,
    pub timezone: ConfigSource,
    pub rated_capacity_kw: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve final configuration from CLI args, environment variables, and config file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file exists but is invalid
    /// - Any resolved value is invalid (e.g., unknown timezone)
    pub fn resolve(cli: &Cli) -> Result<Self> {
        Self::resolve_with(&ConfigOverrides::from(cli), |key| std::env::var(key).ok())
    }

    /// Resolve against an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ResolvedConfig::resolve`].
    pub fn resolve_with<F>(overrides: &ConfigOverrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut sources = ConfigSources::default();

        let config_path = Self::resolve_config_path(overrides, &env, &mut sources.config_path);
        let mut config = Config::load_from(&config_path)?;

        let db_path = Self::resolve_db_path(overrides, &env, &config, &mut sources.db_path);
        Self::resolve_source_url(overrides, &env, &mut config, &mut sources.source_url);
        Self::resolve_timezone(overrides, &env, &mut config, &mut sources.timezone);
        Self::resolve_capacity(&env, &mut config, &mut sources.rated_capacity_kw)?;

        config.validate()?;
        let calendar = Calendar::from_name(&config.general.timezone)?;
        let timeout = Duration::from_secs(config.general.timeout_seconds);

        Ok(Self {
            config,
            config_path,
            db_path,
            calendar,
            timeout,
            sources,
        })
    }

    fn resolve_config_path<F>(
        overrides: &ConfigOverrides,
        env: &F,
        source: &mut ConfigSource,
    ) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = &overrides.config_path {
            *source = ConfigSource::Cli;
            return path.clone();
        }
        if let Some(path) = env(ENV_CONFIG) {
            *source = ConfigSource::Env;
            return PathBuf::from(path);
        }
        *source = ConfigSource::Default;
        Config::config_path()
    }

    fn resolve_db_path<F>(
        overrides: &ConfigOverrides,
        env: &F,
        config: &Config,
        source: &mut ConfigSource,
    ) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = &overrides.db_path {
            *source = ConfigSource::Cli;
            return path.clone();
        }
        if let Some(path) = env(ENV_DB) {
            *source = ConfigSource::Env;
            return PathBuf::from(path);
        }
        if let Some(path) = &config.storage.db_path {
            *source = ConfigSource::ConfigFile;
            return path.clone();
        }
        *source = ConfigSource::Default;
        AppPaths::new().telemetry_db_file()
    }

    fn resolve_source_url<F>(
        overrides: &ConfigOverrides,
        env: &F,
        config: &mut Config,
        source: &mut ConfigSource,
    ) where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = &overrides.source_url {
            *source = ConfigSource::Cli;
            config.source.base_url = Some(url.clone());
        } else if let Some(url) = env(ENV_SOURCE_URL) {
            *source = ConfigSource::Env;
            config.source.base_url = Some(url);
        } else if config.source.base_url.is_some() {
            *source = ConfigSource::ConfigFile;
        } else {
            *source = ConfigSource::Default;
        }
    }

    fn resolve_timezone<F>(
        overrides: &ConfigOverrides,
        env: &F,
        config: &mut Config,
        source: &mut ConfigSource,
    ) where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(tz) = &overrides.timezone {
            *source = ConfigSource::Cli;
            config.general.timezone.clone_from(tz);
        } else if let Some(tz) = env(ENV_TIMEZONE) {
            *source = ConfigSource::Env;
            config.general.timezone = tz;
        } else if config.general.timezone == GeneralConfig::default().timezone {
            *source = ConfigSource::Default;
        } else {
            *source = ConfigSource::ConfigFile;
        }
    }

    fn resolve_capacity<F>(env: &F, config: &mut Config, source: &mut ConfigSource) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = env(ENV_CAPACITY_KW) {
            let kw = raw.trim().parse::<f64>().map_err(|_| PvError::ConfigInvalid {
                key: ENV_CAPACITY_KW.to_string(),
                value: raw.clone(),
                message: "expected a number of kW".to_string(),
            })?;
            *source = ConfigSource::Env;
            config.system.rated_capacity_kw = kw;
        } else if (config.system.rated_capacity_kw - SystemConfig::default().rated_capacity_kw)
            .abs()
            > f64::EPSILON
        {
            *source = ConfigSource::ConfigFile;
        } else {
            *source = ConfigSource::Default;
        }
        Ok(())
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub system: SystemConfig,
    pub collector: CollectorConfig,
    pub aggregation: AggregationConfig,
    pub source: SourceConfig,
    pub backfill: BackfillConfig,
    pub storage: StorageConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Master switch for the collector. `--force` ignores it.
    pub enabled: bool,
    /// IANA timezone used for day, month and year boundaries.
    pub timezone: String,
    /// Timeout for telemetry requests in seconds.
    pub timeout_seconds: u64,
}

/// The monitored installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Rated output in kW, the capacity factor denominator.
    pub rated_capacity_kw: f64,
}

/// Collector scheduling and retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Collections closer together than this are skipped unless forced.
    pub min_interval_seconds: u64,
    /// Raw samples older than this are pruned.
    pub retention_days: u32,
    /// How far back the hourly aggregator starts when it has no watermark.
    pub hourly_lookback_hours: u32,
    /// How far back the daily aggregator starts when it has no watermark.
    pub daily_lookback_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Average power above which an hour (or interval) counts as sunlight.
    pub productive_threshold_w: f64,
}

/// Telemetry source endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: Option<String>,
    /// Sent as a bearer token when set.
    pub api_token: Option<String>,
    /// Historical interval length assumed when the source omits it.
    pub interval_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    /// Pause between per-day history calls.
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timezone: "UTC".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            rated_capacity_kw: 5.0,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            min_interval_seconds: 300,
            retention_days: 7,
            hourly_lookback_hours: 48,
            daily_lookback_days: 14,
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            productive_threshold_w: 10.0,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_token: None,
            interval_minutes: 20,
        }
    }
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self { delay_ms: 1000 }
    }
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    /// Returns an error only if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| PvError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_path() -> PathBuf {
        AppPaths::new().config_file()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<()> {
        if self.general.timeout_seconds == 0 || self.general.timeout_seconds > 60 {
            return Err(invalid(
                "general.timeout_seconds",
                self.general.timeout_seconds,
                "must be between 1 and 60 seconds",
            ));
        }

        Calendar::from_name(&self.general.timezone)?;

        let kw = self.system.rated_capacity_kw;
        if !kw.is_finite() || kw <= 0.0 {
            return Err(invalid(
                "system.rated_capacity_kw",
                kw,
                "must be a positive number",
            ));
        }

        if self.collector.retention_days == 0 {
            return Err(invalid(
                "collector.retention_days",
                self.collector.retention_days,
                "must be at least 1",
            ));
        }
        if self.collector.hourly_lookback_hours == 0 {
            return Err(invalid(
                "collector.hourly_lookback_hours",
                self.collector.hourly_lookback_hours,
                "must be at least 1",
            ));
        }
        if self.collector.daily_lookback_days == 0 {
            return Err(invalid(
                "collector.daily_lookback_days",
                self.collector.daily_lookback_days,
                "must be at least 1",
            ));
        }

        let threshold = self.aggregation.productive_threshold_w;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(invalid(
                "aggregation.productive_threshold_w",
                threshold,
                "must be zero or positive",
            ));
        }

        let minutes = self.source.interval_minutes;
        if minutes == 0 || minutes > 60 || 60 % minutes != 0 {
            return Err(invalid(
                "source.interval_minutes",
                minutes,
                "must divide an hour evenly",
            ));
        }

        if let Some(url) = &self.source.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid(
                    "source.base_url",
                    url,
                    "must start with http:// or https://",
                ));
            }
        }

        Ok(())
    }
}

fn invalid(key: &str, value: impl std::fmt::Display, message: &str) -> PvError {
    PvError::ConfigInvalid {
        key: key.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    }
}
