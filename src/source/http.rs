//! JSON-over-HTTP telemetry source.
//!
//! Endpoints, relative to the configured base URL:
//!
//! - `GET /current` returns the live reading
//! - `GET /history?date=YYYY-MM-DD` returns one day of interval samples
//!
//! Vendor-specific signing is expected to live in a proxy in front of this;
//! the adapter only knows an optional bearer token.

use std::future::Future;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;

use super::TelemetrySource;
use crate::core::http::{build_client, fetch_json};
use crate::core::models::{DayIntervals, IntervalSample, Reading};
use crate::core::units::{EnergyUnit, PowerUnit, energy_to_watt_hours, power_to_watts};
use crate::error::{PvError, Result};
use crate::storage::ResolvedConfig;

#[derive(Debug, Deserialize)]
struct CurrentPayload {
    timestamp: Option<i64>,
    #[serde(default)]
    status: i64,
    power: f64,
    power_unit: Option<String>,
    energy_today: f64,
    energy_month: f64,
    energy_total: f64,
    energy_unit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryPayload {
    interval_minutes: Option<u32>,
    power_unit: Option<String>,
    #[serde(default)]
    samples: Vec<SamplePayload>,
}

#[derive(Debug, Deserialize)]
struct SamplePayload {
    timestamp: i64,
    power: f64,
}

/// Telemetry source reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    timeout: Duration,
    default_interval_minutes: u32,
}

impl HttpSource {
    /// Create a source for `base_url`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        timeout: Duration,
        default_interval_minutes: u32,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            timeout,
            default_interval_minutes,
        })
    }

    /// Create a source from resolved configuration.
    ///
    /// # Errors
    /// Returns a config error if no base URL is configured.
    pub fn from_config(resolved: &ResolvedConfig) -> Result<Self> {
        let source = &resolved.config.source;
        let base_url = source.base_url.as_deref().ok_or_else(|| {
            PvError::Config(
                "source.base_url is not set (use --source-url or PVSTAT_SOURCE_URL)".to_string(),
            )
        })?;
        Self::new(
            base_url,
            source.api_token.clone(),
            resolved.timeout,
            source.interval_minutes,
        )
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn current(&self) -> Result<Reading> {
        let url = format!("{}/current", self.base_url);
        tracing::debug!(%url, "Fetching current reading");
        let payload: CurrentPayload =
            fetch_json(&self.client, &url, self.api_token.as_deref(), self.timeout).await?;
        normalize_current(&payload)
    }

    async fn history(&self, date: NaiveDate) -> Result<DayIntervals> {
        let url = format!("{}/history?date={}", self.base_url, date.format("%Y-%m-%d"));
        tracing::debug!(%url, %date, "Fetching day intervals");
        let payload: HistoryPayload =
            fetch_json(&self.client, &url, self.api_token.as_deref(), self.timeout).await?;
        normalize_history(payload, self.default_interval_minutes)
    }
}

impl TelemetrySource for HttpSource {
    fn fetch_current(&self) -> impl Future<Output = Result<Reading>> + Send {
        self.current()
    }

    fn fetch_day_intervals(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<DayIntervals>> + Send {
        self.history(date)
    }
}

fn parse_power_unit(label: Option<&str>) -> Result<PowerUnit> {
    label.map_or_else(|| Ok(PowerUnit::default()), PowerUnit::parse)
}

fn normalize_current(payload: &CurrentPayload) -> Result<Reading> {
    let power_unit = parse_power_unit(payload.power_unit.as_deref())?;
    let energy_unit = payload
        .energy_unit
        .as_deref()
        .map_or_else(|| Ok(EnergyUnit::default()), EnergyUnit::parse)?;

    Ok(Reading {
        timestamp: payload.timestamp,
        power_w: power_to_watts(payload.power, power_unit, "power")?,
        energy_today_wh: energy_to_watt_hours(payload.energy_today, energy_unit, "energy_today")?,
        energy_month_wh: energy_to_watt_hours(payload.energy_month, energy_unit, "energy_month")?,
        energy_total_wh: energy_to_watt_hours(payload.energy_total, energy_unit, "energy_total")?,
        status: payload.status,
    })
}

fn normalize_history(payload: HistoryPayload, default_interval: u32) -> Result<DayIntervals> {
    let interval_minutes = payload.interval_minutes.unwrap_or(default_interval);
    if interval_minutes == 0 || interval_minutes > 60 || 60 % interval_minutes != 0 {
        return Err(PvError::MalformedResponse(format!(
            "interval_minutes {interval_minutes} does not divide an hour"
        )));
    }

    let unit = parse_power_unit(payload.power_unit.as_deref())?;
    let mut samples = payload
        .samples
        .into_iter()
        .map(|s| {
            Ok(IntervalSample {
                timestamp: s.timestamp,
                power_w: power_to_watts(s.power, unit, "samples.power")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    samples.sort_by_key(|s| s.timestamp);

    Ok(DayIntervals {
        interval_minutes,
        samples,
    })
}
