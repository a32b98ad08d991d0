//! Core data models for telemetry samples and aggregate buckets.
//!
//! All timestamps are epoch seconds. All power values are W and all energy
//! values are Wh once they leave the source adapter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PvError;

// =============================================================================
// Source readings
// =============================================================================

/// One normalized live reading from the telemetry source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Source-reported measurement time, if the source provides one.
    pub timestamp: Option<i64>,
    /// Instantaneous output power (W).
    pub power_w: f64,
    /// Counter that resets at local midnight (Wh).
    pub energy_today_wh: f64,
    /// Counter that resets at the start of each month (Wh).
    pub energy_month_wh: f64,
    /// Lifetime counter (Wh).
    pub energy_total_wh: f64,
    /// Vendor status code.
    pub status: i64,
}

/// One historical sub-hour power sample used by backfill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalSample {
    pub timestamp: i64,
    pub power_w: f64,
}

/// Historical interval data for one calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayIntervals {
    pub interval_minutes: u32,
    pub samples: Vec<IntervalSample>,
}

// =============================================================================
// Stored rows
// =============================================================================

/// A raw sample as persisted, keyed by `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub timestamp: i64,
    pub power_w: f64,
    pub energy_today_wh: f64,
    pub energy_month_wh: f64,
    pub energy_total_wh: f64,
    pub status: i64,
    pub collected_at: i64,
}

impl RawSample {
    /// Build a sample from a reading collected at `collected_at`.
    #[must_use]
    pub fn from_reading(reading: &Reading, collected_at: i64) -> Self {
        Self {
            timestamp: reading.timestamp.unwrap_or(collected_at),
            power_w: reading.power_w,
            energy_today_wh: reading.energy_today_wh,
            energy_month_wh: reading.energy_month_wh,
            energy_total_wh: reading.energy_total_wh,
            status: reading.status,
            collected_at,
        }
    }
}

/// One completed clock hour, keyed by `start_timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourBucket {
    pub start_timestamp: i64,
    pub energy_delta_wh: f64,
    pub power_avg_w: f64,
    pub power_max_w: f64,
    pub power_min_w: f64,
    pub sample_count: i64,
}

/// One completed local calendar day, keyed by `date` (`YYYY-MM-DD`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayBucket {
    pub date: String,
    pub start_timestamp: i64,
    pub energy_total_wh: f64,
    pub power_peak_w: f64,
    pub power_peak_time: i64,
    pub sunlight_hours: f64,
    pub capacity_factor: f64,
}

/// One completed local calendar month, keyed by `(year, month)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
    pub start_timestamp: i64,
    pub energy_total_wh: f64,
    pub power_peak_w: f64,
    pub days_with_data: i64,
    pub avg_daily_wh: f64,
    pub capacity_factor: f64,
}

/// One completed local calendar year, keyed by `year`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearBucket {
    pub year: i32,
    pub start_timestamp: i64,
    pub energy_total_wh: f64,
    pub power_peak_w: f64,
    pub months_with_data: i64,
    pub avg_monthly_wh: f64,
    pub capacity_factor: f64,
}

// =============================================================================
// Granularity
// =============================================================================

/// Bucket tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Month,
    Year,
}

impl Granularity {
    pub const ALL: &'static [Self] = &[Self::Hour, Self::Day, Self::Month, Self::Year];

    /// Largest `count` a range query may ask for.
    #[must_use]
    pub const fn max_count(self) -> usize {
        match self {
            Self::Hour => 168,
            Self::Day => 365,
            Self::Month => 24,
            Self::Year => 10,
        }
    }

    /// Nominal hours per bucket, used for the summary capacity factor.
    #[must_use]
    pub const fn hours_per_bucket(self) -> f64 {
        match self {
            Self::Hour => 1.0,
            Self::Day => 24.0,
            Self::Month => 730.5,
            Self::Year => 8766.0,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = PvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hour" | "hours" | "hourly" => Ok(Self::Hour),
            "day" | "days" | "daily" => Ok(Self::Day),
            "month" | "months" | "monthly" => Ok(Self::Month),
            "year" | "years" | "yearly" => Ok(Self::Year),
            other => Err(PvError::InvalidGranularity(other.to_string())),
        }
    }
}

/// Capacity factor in percent for `energy_wh` produced over `hours` by a
/// system rated at `rated_kw`. Not clamped to 100.
#[must_use]
pub fn capacity_factor(energy_wh: f64, rated_kw: f64, hours: f64) -> f64 {
    let theoretical_wh = rated_kw * 1000.0 * hours;
    if theoretical_wh <= 0.0 {
        return 0.0;
    }
    energy_wh / theoretical_wh * 100.0
}
