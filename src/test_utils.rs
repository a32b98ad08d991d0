//! Test utilities for pvstat.
//!
//! Provides shared helpers, test data factories and a scripted telemetry
//! source for use across all test modules.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pvstat::test_utils::*;
//!
//! let source = FakeSource::new().with_reading(reading(1500.0, 4200.0));
//! let sample = raw_sample(utc_ts(2024, 6, 1, 12, 0), 1500.0, 4200.0);
//! ```

use std::collections::VecDeque;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;

use crate::core::calendar::Calendar;
use crate::core::models::{
    DayBucket, DayIntervals, HourBucket, IntervalSample, RawSample, Reading, capacity_factor,
};
use crate::error::{PvError, Result};
use crate::source::TelemetrySource;

// =============================================================================
// Time helpers
// =============================================================================

/// Epoch seconds for a UTC wall-clock time.
///
/// # Panics
///
/// Panics on an invalid date or time.
#[must_use]
pub fn utc_ts(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> i64 {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .expect("valid UTC timestamp")
        .and_utc()
        .timestamp()
}

// =============================================================================
// Test Data Factories
// =============================================================================

/// A live reading without a source timestamp. Month and lifetime counters are
/// derived from `energy_today_wh`.
#[must_use]
pub fn reading(power_w: f64, energy_today_wh: f64) -> Reading {
    Reading {
        timestamp: None,
        power_w,
        energy_today_wh,
        energy_month_wh: energy_today_wh * 10.0,
        energy_total_wh: energy_today_wh * 100.0,
        status: 1,
    }
}

/// A raw sample collected at its own timestamp.
#[must_use]
pub fn raw_sample(timestamp: i64, power_w: f64, energy_today_wh: f64) -> RawSample {
    RawSample {
        timestamp,
        power_w,
        energy_today_wh,
        energy_month_wh: energy_today_wh * 10.0,
        energy_total_wh: energy_today_wh * 100.0,
        status: 1,
        collected_at: timestamp,
    }
}

/// An hour bucket built from three samples; `power_min_w` is half the average.
#[must_use]
pub fn hour_bucket_at(start: i64, energy_wh: f64, avg_w: f64, max_w: f64) -> HourBucket {
    HourBucket {
        start_timestamp: start,
        energy_delta_wh: energy_wh,
        power_avg_w: avg_w,
        power_max_w: max_w,
        power_min_w: avg_w / 2.0,
        sample_count: 3,
    }
}

/// A day bucket peaking at local noon of `date`, rated against 5 kW.
#[must_use]
pub fn day_bucket_for(
    calendar: &Calendar,
    date: NaiveDate,
    energy_wh: f64,
    peak_w: f64,
) -> DayBucket {
    let start = calendar.day_start(date);
    DayBucket {
        date: date.format("%Y-%m-%d").to_string(),
        start_timestamp: start,
        energy_total_wh: energy_wh,
        power_peak_w: peak_w,
        power_peak_time: start + 12 * 3600,
        sunlight_hours: 8.0,
        capacity_factor: capacity_factor(energy_wh, 5.0, 24.0),
    }
}

/// Interval samples covering every slot of a local day at constant power.
#[must_use]
pub fn flat_day(
    calendar: &Calendar,
    date: NaiveDate,
    interval_minutes: u32,
    power_w: f64,
) -> DayIntervals {
    let step = i64::from(interval_minutes) * 60;
    let end = calendar.day_end(date);
    let mut samples = Vec::new();
    let mut ts = calendar.day_start(date);
    while ts < end {
        samples.push(IntervalSample {
            timestamp: ts,
            power_w,
        });
        ts += step;
    }
    DayIntervals {
        interval_minutes,
        samples,
    }
}

/// Sample config file content.
#[must_use]
pub fn make_test_config_toml() -> String {
    r#"[general]
enabled = true
timezone = "UTC"
timeout_seconds = 5

[system]
rated_capacity_kw = 5.0

[collector]
min_interval_seconds = 300
retention_days = 7

[source]
interval_minutes = 20

[backfill]
delay_ms = 0
"#
    .to_string()
}

// =============================================================================
// Scripted telemetry source
// =============================================================================

type HistoryFn = Box<dyn Fn(NaiveDate) -> Result<DayIntervals> + Send + Sync>;

/// In-process telemetry source with scripted answers and call counters.
#[derive(Default)]
pub struct FakeSource {
    readings: Mutex<VecDeque<Reading>>,
    fail_current: bool,
    history: Option<HistoryFn>,
    current_calls: AtomicUsize,
    history_calls: AtomicUsize,
}

impl FakeSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every live request with `reading`.
    #[must_use]
    pub fn with_reading(self, reading: Reading) -> Self {
        self.with_readings(vec![reading])
    }

    /// Answer live requests in order; the last reading repeats.
    #[must_use]
    pub fn with_readings(self, readings: Vec<Reading>) -> Self {
        Self {
            readings: Mutex::new(readings.into()),
            ..self
        }
    }

    /// Fail every live request as unreachable.
    #[must_use]
    pub fn failing_current(self) -> Self {
        Self {
            fail_current: true,
            ..self
        }
    }

    /// Answer history requests with `f`.
    #[must_use]
    pub fn with_history_fn<F>(self, f: F) -> Self
    where
        F: Fn(NaiveDate) -> Result<DayIntervals> + Send + Sync + 'static,
    {
        Self {
            history: Some(Box::new(f)),
            ..self
        }
    }

    #[must_use]
    pub fn current_calls(&self) -> usize {
        self.current_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    fn next_current(&self) -> Result<Reading> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_current {
            return Err(PvError::SourceUnavailable {
                message: "scripted failure".to_string(),
            });
        }
        let mut queue = self
            .readings
            .lock()
            .map_err(|_| PvError::Store("fake source lock poisoned".to_string()))?;
        match queue.len() {
            0 => Err(PvError::MalformedResponse("no reading scripted".to_string())),
            1 => Ok(queue[0].clone()),
            _ => queue
                .pop_front()
                .ok_or_else(|| PvError::MalformedResponse("no reading scripted".to_string())),
        }
    }

    fn next_history(&self, date: NaiveDate) -> Result<DayIntervals> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.history.as_ref().map_or_else(
            || {
                Err(PvError::SourceUnavailable {
                    message: "no history scripted".to_string(),
                })
            },
            |f| f(date),
        )
    }
}

impl TelemetrySource for FakeSource {
    fn fetch_current(&self) -> impl Future<Output = Result<Reading>> + Send {
        let result = self.next_current();
        async move { result }
    }

    fn fetch_day_intervals(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<DayIntervals>> + Send {
        let result = self.next_history(date);
        async move { result }
    }
}

// =============================================================================
// Temporary directories
// =============================================================================

/// An isolated temporary directory that is removed on drop.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// Create a new isolated temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file with the given content, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(&path, content).expect("Failed to write test file");
        path
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_source_repeats_last_reading_and_counts() {
        let source = FakeSource::new().with_readings(vec![reading(1.0, 1.0), reading(2.0, 2.0)]);
        let first = source.fetch_current().await.unwrap();
        let second = source.fetch_current().await.unwrap();
        let third = source.fetch_current().await.unwrap();
        assert!((first.power_w - 1.0).abs() < f64::EPSILON);
        assert!((second.power_w - 2.0).abs() < f64::EPSILON);
        assert!((third.power_w - 2.0).abs() < f64::EPSILON);
        assert_eq!(source.current_calls(), 3);
    }

    #[test]
    fn flat_day_covers_the_whole_day() {
        let cal = Calendar::default();
        let day = flat_day(&cal, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), 20, 100.0);
        assert_eq!(day.samples.len(), 72);
    }

    #[test]
    fn test_dir_writes_files() {
        let dir = TestDir::new();
        let path = dir.create_file("nested/config.toml", &make_test_config_toml());
        assert!(path.exists());
        assert_eq!(path, dir.file_path("nested/config.toml"));
    }
}
