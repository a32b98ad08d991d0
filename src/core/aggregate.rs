//! Hour, day, month and year rollups.
//!
//! The `*_bucket` functions are pure: given the rows of the tier below they
//! return the bucket, or `None` when there is nothing to aggregate. A missing
//! bucket means "no data" and is never replaced by a zero row.
//!
//! [`Aggregator`] drives those functions against the store. Every stage only
//! touches periods that have fully elapsed relative to the `now` it is given.

use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;

use crate::core::calendar::{
    Calendar, HOUR_SECS, days_in_month, days_in_year, last_of_month, next_day, next_month,
    year_month,
};
use crate::core::models::{
    DayBucket, Granularity, HourBucket, MonthBucket, RawSample, YearBucket, capacity_factor,
};
use crate::error::Result;
use crate::storage::config::Config;
use crate::storage::{TelemetryStore, Watermark};

/// Knobs shared by the live aggregators and the backfill importer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationSettings {
    pub rated_capacity_kw: f64,
    pub productive_threshold_w: f64,
    pub hourly_lookback_hours: u32,
    pub daily_lookback_days: u32,
}

impl AggregationSettings {
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            rated_capacity_kw: config.system.rated_capacity_kw,
            productive_threshold_w: config.aggregation.productive_threshold_w,
            hourly_lookback_hours: config.collector.hourly_lookback_hours,
            daily_lookback_days: config.collector.daily_lookback_days,
        }
    }
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

// =============================================================================
// Pure rollups
// =============================================================================

/// Energy produced between two readings of a monotonic counter.
///
/// A counter that went down (reset, replaced meter) counts as zero.
#[must_use]
pub fn energy_delta(first_wh: f64, last_wh: f64) -> f64 {
    (last_wh - first_wh).max(0.0)
}

/// Roll raw samples of one hour into a bucket. `samples` must be ordered by
/// timestamp.
#[must_use]
pub fn hour_bucket(start: i64, samples: &[RawSample]) -> Option<HourBucket> {
    let first = samples.first()?;
    let last = samples.last()?;

    let mut sum = 0.0;
    let mut max = f64::MIN;
    let mut min = f64::MAX;
    for sample in samples {
        sum += sample.power_w;
        max = max.max(sample.power_w);
        min = min.min(sample.power_w);
    }

    #[allow(clippy::cast_precision_loss)] // a handful of samples per hour
    let avg = sum / samples.len() as f64;

    Some(HourBucket {
        start_timestamp: start,
        energy_delta_wh: energy_delta(first.energy_today_wh, last.energy_today_wh),
        power_avg_w: avg,
        power_max_w: max,
        power_min_w: min,
        sample_count: count(samples.len()),
    })
}

/// Roll the hour buckets of one local day into a day bucket.
///
/// Hours are summed in the order given. The peak time is the start of the
/// first hour that reached the peak.
#[must_use]
pub fn day_bucket(
    date: NaiveDate,
    calendar: &Calendar,
    hours: &[HourBucket],
    settings: &AggregationSettings,
) -> Option<DayBucket> {
    let mut peak = hours.first()?;
    let mut total = 0.0;
    let mut sunlight_hours = 0.0;

    for hour in hours {
        total += hour.energy_delta_wh;
        if hour.power_max_w > peak.power_max_w {
            peak = hour;
        }
        if hour.power_avg_w > settings.productive_threshold_w {
            sunlight_hours += 1.0;
        }
    }

    Some(DayBucket {
        date: date.format("%Y-%m-%d").to_string(),
        start_timestamp: calendar.day_start(date),
        energy_total_wh: total,
        power_peak_w: peak.power_max_w,
        power_peak_time: peak.start_timestamp,
        sunlight_hours,
        capacity_factor: capacity_factor(total, settings.rated_capacity_kw, 24.0),
    })
}

/// Roll the day buckets of one local month into a month bucket.
#[must_use]
pub fn month_bucket(
    year: i32,
    month: u32,
    calendar: &Calendar,
    days: &[DayBucket],
    rated_capacity_kw: f64,
) -> Option<MonthBucket> {
    if days.is_empty() {
        return None;
    }

    let total: f64 = days.iter().map(|d| d.energy_total_wh).sum();
    let peak = days
        .iter()
        .map(|d| d.power_peak_w)
        .fold(f64::MIN, f64::max);
    #[allow(clippy::cast_precision_loss)] // at most 31
    let avg = total / days.len() as f64;
    let hours = 24.0 * f64::from(days_in_month(year, month));

    Some(MonthBucket {
        year,
        month,
        start_timestamp: calendar.month_start(year, month),
        energy_total_wh: total,
        power_peak_w: peak,
        days_with_data: count(days.len()),
        avg_daily_wh: avg,
        capacity_factor: capacity_factor(total, rated_capacity_kw, hours),
    })
}

/// Roll the month buckets of one local year into a year bucket.
#[must_use]
pub fn year_bucket(
    year: i32,
    calendar: &Calendar,
    months: &[MonthBucket],
    rated_capacity_kw: f64,
) -> Option<YearBucket> {
    if months.is_empty() {
        return None;
    }

    let total: f64 = months.iter().map(|m| m.energy_total_wh).sum();
    let peak = months
        .iter()
        .map(|m| m.power_peak_w)
        .fold(f64::MIN, f64::max);
    #[allow(clippy::cast_precision_loss)] // at most 12
    let avg = total / months.len() as f64;
    let hours = 24.0 * f64::from(days_in_year(year));

    Some(YearBucket {
        year,
        start_timestamp: calendar.year_start(year),
        energy_total_wh: total,
        power_peak_w: peak,
        months_with_data: count(months.len()),
        avg_monthly_wh: avg,
        capacity_factor: capacity_factor(total, rated_capacity_kw, hours),
    })
}

fn count(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

// =============================================================================
// Store-driving runners
// =============================================================================

/// What one stage did during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: Granularity,
    /// Elapsed periods visited.
    pub examined: usize,
    /// Buckets upserted.
    pub written: usize,
    /// Periods left alone because a bucket already existed.
    pub skipped_existing: usize,
    /// Start of the first period whose input tier was not complete yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_at: Option<i64>,
}

impl StageReport {
    const fn new(stage: Granularity) -> Self {
        Self {
            stage,
            examined: 0,
            written: 0,
            skipped_existing: 0,
            blocked_at: None,
        }
    }
}

/// Runs the rollup stages against a store.
pub struct Aggregator<'a> {
    store: &'a TelemetryStore,
    calendar: Calendar,
    settings: AggregationSettings,
}

impl<'a> Aggregator<'a> {
    #[must_use]
    pub const fn new(
        store: &'a TelemetryStore,
        calendar: Calendar,
        settings: AggregationSettings,
    ) -> Self {
        Self {
            store,
            calendar,
            settings,
        }
    }

    #[must_use]
    pub const fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    #[must_use]
    pub const fn settings(&self) -> &AggregationSettings {
        &self.settings
    }

    /// Roll every elapsed hour after the hourly watermark.
    ///
    /// Without a watermark the stage starts `hourly_lookback_hours` back.
    /// Empty hours write nothing but still move the watermark.
    ///
    /// # Errors
    /// Returns the first store error. Hours committed before it stay committed.
    pub fn aggregate_hours(&self, now: i64) -> Result<StageReport> {
        let current = Calendar::hour_floor(now);
        let lookback = i64::from(self.settings.hourly_lookback_hours) * HOUR_SECS;
        let mut hour = match self.store.watermark(Watermark::Hour)? {
            Some(last) => Calendar::hour_floor(last) + HOUR_SECS,
            None => current - lookback,
        };

        let mut report = StageReport::new(Granularity::Hour);
        while hour < current {
            let samples = self.store.samples_in_range(hour, hour + HOUR_SECS)?;
            let bucket = hour_bucket(hour, &samples);
            self.store.commit_hour(hour, bucket.as_ref())?;

            report.examined += 1;
            if let Some(bucket) = &bucket {
                report.written += 1;
                tracing::debug!(
                    hour,
                    samples = bucket.sample_count,
                    energy_wh = bucket.energy_delta_wh,
                    "Hour aggregated"
                );
            }
            hour += HOUR_SECS;
        }

        Ok(report)
    }

    /// Roll elapsed days from their hour buckets.
    ///
    /// An incremental run starts after the day watermark, stops at the first
    /// day whose last hour the hourly stage has not processed, and leaves days
    /// that already have a bucket alone. `force` recomputes every elapsed day
    /// of the lookback window.
    ///
    /// # Errors
    /// Returns the first store error.
    pub fn aggregate_days(&self, now: i64, force: bool) -> Result<StageReport> {
        let today = self.calendar.local_date(now);
        let floor = today
            .checked_sub_days(Days::new(u64::from(self.settings.daily_lookback_days)))
            .unwrap_or(today);
        let mut date = if force {
            floor
        } else {
            self.store
                .watermark(Watermark::Day)?
                .map_or(floor, |ts| next_day(self.calendar.local_date(ts)))
        };
        let hour_mark = self.store.watermark(Watermark::Hour)?;

        let mut report = StageReport::new(Granularity::Day);
        while date < today {
            let start = self.calendar.day_start(date);
            let end = self.calendar.day_end(date);
            if !force && !covers(hour_mark, Calendar::hour_floor(end - 1)) {
                report.blocked_at = Some(start);
                break;
            }

            report.examined += 1;
            let key = date.format("%Y-%m-%d").to_string();
            if !force && self.store.day(&key)?.is_some() {
                report.skipped_existing += 1;
            } else if let Some(bucket) = self.recompute_day(date)? {
                report.written += 1;
                tracing::debug!(
                    date = %bucket.date,
                    energy_wh = bucket.energy_total_wh,
                    "Day aggregated"
                );
            }
            self.advance(Watermark::Day, start)?;
            date = next_day(date);
        }

        Ok(report)
    }

    /// Roll elapsed months from their day buckets.
    ///
    /// # Errors
    /// Returns the first store error.
    pub fn aggregate_months(&self, now: i64, force: bool) -> Result<StageReport> {
        let today = self.calendar.local_date(now);
        let current = year_month(today);
        let floor = year_month(self.lookback_floor(today));
        let mut ym = if force {
            floor
        } else {
            self.store.watermark(Watermark::Month)?.map_or(floor, |ts| {
                let (year, month) = year_month(self.calendar.local_date(ts));
                next_month(year, month)
            })
        };
        let day_mark = self.store.watermark(Watermark::Day)?;

        let mut report = StageReport::new(Granularity::Month);
        while ym < current {
            let (year, month) = ym;
            let start = self.calendar.month_start(year, month);
            let last_day = self.calendar.day_start(last_of_month(year, month));
            if !force && !covers(day_mark, last_day) {
                report.blocked_at = Some(start);
                break;
            }

            report.examined += 1;
            if !force && self.store.month(year, month)?.is_some() {
                report.skipped_existing += 1;
            } else if let Some(bucket) = self.recompute_month(year, month)? {
                report.written += 1;
                tracing::debug!(
                    year,
                    month,
                    days = bucket.days_with_data,
                    energy_wh = bucket.energy_total_wh,
                    "Month aggregated"
                );
            }
            self.advance(Watermark::Month, start)?;
            ym = next_month(year, month);
        }

        Ok(report)
    }

    /// Roll elapsed years from their month buckets.
    ///
    /// # Errors
    /// Returns the first store error.
    pub fn aggregate_years(&self, now: i64, force: bool) -> Result<StageReport> {
        let today = self.calendar.local_date(now);
        let floor = self.lookback_floor(today).year();
        let mut year = if force {
            floor
        } else {
            self.store
                .watermark(Watermark::Year)?
                .map_or(floor, |ts| self.calendar.local_date(ts).year() + 1)
        };
        let month_mark = self.store.watermark(Watermark::Month)?;

        let mut report = StageReport::new(Granularity::Year);
        while year < today.year() {
            let start = self.calendar.year_start(year);
            if !force && !covers(month_mark, self.calendar.month_start(year, 12)) {
                report.blocked_at = Some(start);
                break;
            }

            report.examined += 1;
            if !force && self.store.year(year)?.is_some() {
                report.skipped_existing += 1;
            } else if let Some(bucket) = self.recompute_year(year)? {
                report.written += 1;
                tracing::debug!(
                    year,
                    months = bucket.months_with_data,
                    energy_wh = bucket.energy_total_wh,
                    "Year aggregated"
                );
            }
            self.advance(Watermark::Year, start)?;
            year += 1;
        }

        Ok(report)
    }

    /// Recompute one month if it has fully elapsed at `now`.
    ///
    /// # Errors
    /// Returns store errors.
    pub fn force_month(&self, year: i32, month: u32, now: i64) -> Result<Option<MonthBucket>> {
        if self.calendar.month_end(year, month) > now {
            return Ok(None);
        }
        self.recompute_month(year, month)
    }

    /// Recompute one year if it has fully elapsed at `now`.
    ///
    /// # Errors
    /// Returns store errors.
    pub fn force_year(&self, year: i32, now: i64) -> Result<Option<YearBucket>> {
        if self.calendar.year_end(year) > now {
            return Ok(None);
        }
        self.recompute_year(year)
    }

    fn recompute_day(&self, date: NaiveDate) -> Result<Option<DayBucket>> {
        let hours = self
            .store
            .hours_in_range(self.calendar.day_start(date), self.calendar.day_end(date))?;
        let bucket = day_bucket(date, &self.calendar, &hours, &self.settings);
        if let Some(bucket) = &bucket {
            self.store.upsert_day(bucket)?;
        }
        Ok(bucket)
    }

    fn recompute_month(&self, year: i32, month: u32) -> Result<Option<MonthBucket>> {
        let days = self.store.days_in_range(
            self.calendar.month_start(year, month),
            self.calendar.month_end(year, month),
        )?;
        let bucket = month_bucket(
            year,
            month,
            &self.calendar,
            &days,
            self.settings.rated_capacity_kw,
        );
        if let Some(bucket) = &bucket {
            self.store.upsert_month(bucket)?;
        }
        Ok(bucket)
    }

    fn recompute_year(&self, year: i32) -> Result<Option<YearBucket>> {
        let months = self.store.months_of_year(year)?;
        let bucket = year_bucket(year, &self.calendar, &months, self.settings.rated_capacity_kw);
        if let Some(bucket) = &bucket {
            self.store.upsert_year(bucket)?;
        }
        Ok(bucket)
    }

    fn lookback_floor(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.settings.daily_lookback_days)))
            .unwrap_or(today)
    }

    /// Move a watermark forward. Never moves it back.
    fn advance(&self, mark: Watermark, value: i64) -> Result<()> {
        match self.store.watermark(mark)? {
            Some(current) if current >= value => Ok(()),
            _ => self.store.set_watermark(mark, value),
        }
    }
}

fn covers(mark: Option<i64>, needed: i64) -> bool {
    mark.is_some_and(|m| m >= needed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{day_bucket_for, hour_bucket_at, raw_sample, utc_ts};

    fn store() -> TelemetryStore {
        TelemetryStore::open_in_memory().unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn hour_bucket_matches_worked_example() {
        let start = utc_ts(2024, 6, 1, 12, 0);
        let samples = vec![
            raw_sample(start + 60, 100.0, 5000.0),
            raw_sample(start + 1260, 200.0, 5050.0),
            raw_sample(start + 2460, 300.0, 5100.0),
        ];

        let bucket = hour_bucket(start, &samples).unwrap();
        assert_eq!(bucket.start_timestamp, start);
        assert!((bucket.power_avg_w - 200.0).abs() < 1e-9);
        assert!((bucket.power_max_w - 300.0).abs() < f64::EPSILON);
        assert!((bucket.power_min_w - 100.0).abs() < f64::EPSILON);
        assert!((bucket.energy_delta_wh - 100.0).abs() < 1e-9);
        assert_eq!(bucket.sample_count, 3);
    }

    #[test]
    fn counter_reset_yields_zero_delta() {
        let start = utc_ts(2024, 6, 1, 0, 0);
        let samples = vec![
            raw_sample(start, 50.0, 8000.0),
            raw_sample(start + 1800, 40.0, 20.0),
        ];
        let bucket = hour_bucket(start, &samples).unwrap();
        assert!(bucket.energy_delta_wh.abs() < f64::EPSILON);
        assert!(energy_delta(10.0, 5.0) >= 0.0);
    }

    #[test]
    fn empty_inputs_produce_no_bucket() {
        let cal = Calendar::default();
        let settings = AggregationSettings::default();
        assert!(hour_bucket(0, &[]).is_none());
        assert!(day_bucket(date(2024, 6, 1), &cal, &[], &settings).is_none());
        assert!(month_bucket(2024, 6, &cal, &[], 5.0).is_none());
        assert!(year_bucket(2024, &cal, &[], 5.0).is_none());
    }

    #[test]
    fn day_bucket_matches_worked_example() {
        let cal = Calendar::default();
        let settings = AggregationSettings::default();
        let day = date(2024, 6, 1);
        let start = cal.day_start(day);

        let deltas = [0.0, 0.0, 50.0, 150.0, 200.0, 150.0, 50.0, 0.0];
        let hours: Vec<HourBucket> = deltas
            .iter()
            .enumerate()
            .map(|(i, &energy)| {
                // Average power mirrors the energy for a one-hour bucket.
                let offset = i64::try_from(i).unwrap() * HOUR_SECS;
                hour_bucket_at(start + offset, energy, energy, energy * 1.5)
            })
            .collect();

        let bucket = day_bucket(day, &cal, &hours, &settings).unwrap();
        assert!((bucket.energy_total_wh - 600.0).abs() < 1e-9);
        assert!((bucket.power_peak_w - 300.0).abs() < 1e-9);
        assert_eq!(bucket.power_peak_time, start + 4 * HOUR_SECS);
        assert!((bucket.sunlight_hours - 5.0).abs() < f64::EPSILON);
        // 600 Wh against 5 kW * 24 h.
        assert!((bucket.capacity_factor - 0.5).abs() < 1e-9);
        assert_eq!(bucket.date, "2024-06-01");
    }

    #[test]
    fn month_and_year_capacity_factor_use_calendar_length() {
        let cal = Calendar::default();
        let days = vec![
            day_bucket_for(&cal, date(2024, 2, 1), 10_000.0, 3000.0),
            day_bucket_for(&cal, date(2024, 2, 2), 20_000.0, 4000.0),
        ];
        let month = month_bucket(2024, 2, &cal, &days, 5.0).unwrap();
        assert!((month.energy_total_wh - 30_000.0).abs() < 1e-9);
        assert!((month.power_peak_w - 4000.0).abs() < f64::EPSILON);
        assert_eq!(month.days_with_data, 2);
        assert!((month.avg_daily_wh - 15_000.0).abs() < 1e-9);
        let expected = 30_000.0 / (5.0 * 1000.0 * 24.0 * 29.0) * 100.0;
        assert!((month.capacity_factor - expected).abs() < 1e-9);

        let year = year_bucket(2024, &cal, &[month.clone()], 5.0).unwrap();
        assert_eq!(year.months_with_data, 1);
        let expected = 30_000.0 / (5.0 * 1000.0 * 24.0 * 366.0) * 100.0;
        assert!((year.capacity_factor - expected).abs() < 1e-9);
    }

    #[test]
    fn hours_never_include_the_current_hour() {
        let store = store();
        let agg = Aggregator::new(&store, Calendar::default(), AggregationSettings::default());
        let now = utc_ts(2024, 6, 1, 12, 30);
        store
            .record_sample(&raw_sample(utc_ts(2024, 6, 1, 11, 10), 100.0, 10.0), 0)
            .unwrap();
        store
            .record_sample(&raw_sample(utc_ts(2024, 6, 1, 12, 10), 100.0, 20.0), 0)
            .unwrap();

        let report = agg.aggregate_hours(now).unwrap();
        assert_eq!(report.examined, 48);
        assert_eq!(report.written, 1);

        let hours = store.hours_in_range(0, i64::MAX).unwrap();
        assert_eq!(hours.len(), 1);
        assert_eq!(hours[0].start_timestamp, utc_ts(2024, 6, 1, 11, 0));
        assert_eq!(
            store.watermark(Watermark::Hour).unwrap(),
            Some(utc_ts(2024, 6, 1, 11, 0))
        );
    }

    #[test]
    fn rerunning_hours_is_idempotent() {
        let store = store();
        let agg = Aggregator::new(&store, Calendar::default(), AggregationSettings::default());
        let hour = utc_ts(2024, 6, 1, 10, 0);
        for (i, power) in [100.0, 200.0, 300.0].into_iter().enumerate() {
            let offset = i64::try_from(i).unwrap() * 1200;
            store
                .record_sample(&raw_sample(hour + offset, power, power), 0)
                .unwrap();
        }

        agg.aggregate_hours(hour + 2 * HOUR_SECS).unwrap();
        let first = store.hours_in_range(hour, hour + HOUR_SECS).unwrap();

        // Rewind the watermark so the same hour is processed again.
        store.set_watermark(Watermark::Hour, hour - HOUR_SECS).unwrap();
        agg.aggregate_hours(hour + 2 * HOUR_SECS).unwrap();
        let second = store.hours_in_range(hour, hour + HOUR_SECS).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.count_rows("hour_buckets").unwrap(), 1);
    }

    #[test]
    fn days_wait_for_their_last_hour() {
        let store = store();
        let agg = Aggregator::new(&store, Calendar::default(), AggregationSettings::default());
        let day = date(2024, 6, 1);
        let start = Calendar::default().day_start(day);
        store
            .upsert_hour(&hour_bucket_at(start + 10 * HOUR_SECS, 500.0, 500.0, 800.0))
            .unwrap();
        store
            .set_watermark(Watermark::Day, start - 86_400)
            .unwrap();

        // Hourly stage stopped at 22:00, so 23:00 is not rolled yet.
        store
            .set_watermark(Watermark::Hour, start + 22 * HOUR_SECS)
            .unwrap();
        let now = start + 86_400 + 600;
        let report = agg.aggregate_days(now, false).unwrap();
        assert_eq!(report.blocked_at, Some(start));
        assert_eq!(store.count_rows("day_buckets").unwrap(), 0);

        store
            .set_watermark(Watermark::Hour, start + 23 * HOUR_SECS)
            .unwrap();
        let report = agg.aggregate_days(now, false).unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(store.watermark(Watermark::Day).unwrap(), Some(start));
    }

    #[test]
    fn incremental_days_skip_existing_but_force_recomputes() {
        let store = store();
        let cal = Calendar::default();
        let agg = Aggregator::new(&store, cal, AggregationSettings::default());
        let day = date(2024, 6, 1);
        let start = cal.day_start(day);
        store
            .upsert_hour(&hour_bucket_at(start + 12 * HOUR_SECS, 700.0, 700.0, 900.0))
            .unwrap();
        store.upsert_day(&day_bucket_for(&cal, day, 1.0, 1.0)).unwrap();
        store.set_watermark(Watermark::Day, start - 86_400).unwrap();
        store.set_watermark(Watermark::Hour, start + 86_400).unwrap();

        let now = start + 86_400 + 60;
        let report = agg.aggregate_days(now, false).unwrap();
        assert_eq!(report.skipped_existing, 1);
        let stale = store.day("2024-06-01").unwrap().unwrap();
        assert!((stale.energy_total_wh - 1.0).abs() < f64::EPSILON);

        agg.aggregate_days(now, true).unwrap();
        let fresh = store.day("2024-06-01").unwrap().unwrap();
        assert!((fresh.energy_total_wh - 700.0).abs() < f64::EPSILON);
    }

    #[test]
    fn months_and_years_roll_after_their_last_day() {
        let store = store();
        let cal = Calendar::default();
        let agg = Aggregator::new(&store, cal, AggregationSettings::default());
        store
            .upsert_day(&day_bucket_for(&cal, date(2023, 12, 5), 12_000.0, 3500.0))
            .unwrap();
        store
            .upsert_day(&day_bucket_for(&cal, date(2023, 12, 31), 8_000.0, 2500.0))
            .unwrap();
        store
            .set_watermark(Watermark::Day, cal.day_start(date(2023, 12, 31)))
            .unwrap();

        let now = utc_ts(2024, 1, 1, 0, 5);
        let months = agg.aggregate_months(now, false).unwrap();
        assert_eq!(months.written, 1);
        let dec = store.month(2023, 12).unwrap().unwrap();
        assert!((dec.energy_total_wh - 20_000.0).abs() < 1e-9);
        assert_eq!(dec.days_with_data, 2);

        let years = agg.aggregate_years(now, false).unwrap();
        assert_eq!(years.written, 1);
        let y2023 = store.year(2023).unwrap().unwrap();
        assert!((y2023.energy_total_wh - 20_000.0).abs() < 1e-9);
        assert!((y2023.power_peak_w - 3500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn force_month_refuses_the_running_month() {
        let store = store();
        let cal = Calendar::default();
        let agg = Aggregator::new(&store, cal, AggregationSettings::default());
        store
            .upsert_day(&day_bucket_for(&cal, date(2024, 6, 1), 1000.0, 500.0))
            .unwrap();

        let mid_june = utc_ts(2024, 6, 15, 12, 0);
        assert!(agg.force_month(2024, 6, mid_june).unwrap().is_none());
        assert_eq!(store.count_rows("month_buckets").unwrap(), 0);

        let july = utc_ts(2024, 7, 1, 0, 0);
        assert!(agg.force_month(2024, 6, july).unwrap().is_some());
        assert!(agg.force_year(2024, july).unwrap().is_none());
    }
}
