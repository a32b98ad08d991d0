//! Historical import straight into the hour and day tiers.
//!
//! Each day's interval samples are folded into hour buckets of the same shape
//! the live hourly aggregator writes, and the day bucket is derived from those
//! hours. Both go through the natural-key upserts, so a backfill can run next
//! to a live collector on the same database.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;

use super::aggregate::{AggregationSettings, Aggregator};
use super::calendar::{Calendar, next_day, year_month};
use super::models::{DayBucket, DayIntervals, HourBucket, capacity_factor};
use super::rate_limit::RatePolicy;
use crate::error::{PvError, Result};
use crate::source::TelemetrySource;
use crate::storage::TelemetryStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillOptions {
    /// Re-import days that already have a day bucket.
    pub overwrite: bool,
    /// Fetch and compute, but write nothing.
    pub dry_run: bool,
}

/// What happened to one day of the range.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DayStatus {
    Written,
    DryRun,
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillDay {
    pub date: String,
    #[serde(flatten)]
    pub status: DayStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_wh: Option<f64>,
    pub hours: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub start: String,
    pub end: String,
    pub dry_run: bool,
    pub days: Vec<BackfillDay>,
    pub external_calls: usize,
    pub days_written: usize,
    pub days_failed: usize,
    pub days_skipped: usize,
    pub energy_total_wh: f64,
    pub months_recomputed: Vec<String>,
    pub years_recomputed: Vec<i32>,
}

impl BackfillReport {
    fn new(start: NaiveDate, end: NaiveDate, dry_run: bool) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
            dry_run,
            days: Vec::new(),
            external_calls: 0,
            days_written: 0,
            days_failed: 0,
            days_skipped: 0,
            energy_total_wh: 0.0,
            months_recomputed: Vec::new(),
            years_recomputed: Vec::new(),
        }
    }

    fn push(&mut self, day: BackfillDay) {
        match &day.status {
            DayStatus::Written | DayStatus::DryRun => {
                self.days_written += 1;
                self.energy_total_wh += day.energy_wh.unwrap_or(0.0);
            }
            DayStatus::Skipped { .. } => self.days_skipped += 1,
            DayStatus::Failed { .. } => self.days_failed += 1,
        }
        self.days.push(day);
    }
}

/// The `n` complete days before `today`, oldest first.
#[must_use]
pub fn last_n_days(today: NaiveDate, n: u32) -> (NaiveDate, NaiveDate) {
    let end = today.pred_opt().unwrap_or(today);
    let start = today
        .checked_sub_days(Days::new(u64::from(n.max(1))))
        .unwrap_or(end);
    (start, end)
}

#[derive(Debug, Clone, Copy)]
struct HourAcc {
    energy_wh: f64,
    power_sum: f64,
    power_max: f64,
    power_min: f64,
    intervals: u32,
}

/// Fold one day of interval samples into hour buckets and a day bucket.
///
/// Samples outside the local day are ignored. Returns `None` when no sample
/// falls inside it.
#[must_use]
pub fn compute_day(
    date: NaiveDate,
    calendar: &Calendar,
    intervals: &DayIntervals,
    settings: &AggregationSettings,
) -> Option<(DayBucket, Vec<HourBucket>)> {
    let day_start = calendar.day_start(date);
    let day_end = calendar.day_end(date);
    let interval_hours = f64::from(intervals.interval_minutes) / 60.0;

    let mut hours: BTreeMap<i64, HourAcc> = BTreeMap::new();
    let mut peak: Option<(f64, i64)> = None;
    let mut productive_intervals = 0_u32;

    for sample in intervals
        .samples
        .iter()
        .filter(|s| s.timestamp >= day_start && s.timestamp < day_end)
    {
        let hour = Calendar::hour_floor(sample.timestamp);
        let acc = hours.entry(hour).or_insert(HourAcc {
            energy_wh: 0.0,
            power_sum: 0.0,
            power_max: f64::MIN,
            power_min: f64::MAX,
            intervals: 0,
        });
        acc.energy_wh += sample.power_w * interval_hours;
        acc.power_sum += sample.power_w;
        acc.power_max = acc.power_max.max(sample.power_w);
        acc.power_min = acc.power_min.min(sample.power_w);
        acc.intervals += 1;

        if peak.is_none_or(|(power, _)| sample.power_w > power) {
            peak = Some((sample.power_w, hour));
        }
        if sample.power_w > settings.productive_threshold_w {
            productive_intervals += 1;
        }
    }

    let (peak_power, peak_hour) = peak?;

    let hour_buckets: Vec<HourBucket> = hours
        .into_iter()
        .map(|(start, acc)| HourBucket {
            start_timestamp: start,
            energy_delta_wh: acc.energy_wh,
            power_avg_w: acc.power_sum / f64::from(acc.intervals),
            power_max_w: acc.power_max,
            power_min_w: acc.power_min,
            sample_count: i64::from(acc.intervals),
        })
        .collect();

    let total: f64 = hour_buckets.iter().map(|h| h.energy_delta_wh).sum();
    let day = DayBucket {
        date: date.format("%Y-%m-%d").to_string(),
        start_timestamp: day_start,
        energy_total_wh: total,
        power_peak_w: peak_power,
        power_peak_time: peak_hour,
        sunlight_hours: f64::from(productive_intervals) * interval_hours,
        capacity_factor: capacity_factor(total, settings.rated_capacity_kw, 24.0),
    };

    Some((day, hour_buckets))
}

/// Imports history from a source, one external call per day.
pub struct Backfiller<'a, S, R> {
    store: &'a TelemetryStore,
    source: S,
    rate: R,
    calendar: Calendar,
    settings: AggregationSettings,
}

impl<'a, S: TelemetrySource, R: RatePolicy> Backfiller<'a, S, R> {
    pub const fn new(
        store: &'a TelemetryStore,
        source: S,
        rate: R,
        calendar: Calendar,
        settings: AggregationSettings,
    ) -> Self {
        Self {
            store,
            source,
            rate,
            calendar,
            settings,
        }
    }

    /// Backfill the inclusive range `start..=end` as of the current time.
    ///
    /// # Errors
    /// See [`Backfiller::backfill_at`].
    pub async fn backfill(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        options: BackfillOptions,
    ) -> Result<BackfillReport> {
        self.backfill_at(start, end, options, Utc::now().timestamp())
            .await
    }

    /// Backfill the inclusive range `start..=end` as if the clock read `now`.
    ///
    /// Per-day problems are recorded in the report and never abort the run.
    ///
    /// # Errors
    /// - `InvalidDateRange` when `start` is after `end`
    /// - store errors from the month and year recompute after the day loop
    pub async fn backfill_at(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        options: BackfillOptions,
        now: i64,
    ) -> Result<BackfillReport> {
        if start > end {
            return Err(PvError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
                message: "start is after end".to_string(),
            });
        }

        tracing::info!(
            %start,
            %end,
            overwrite = options.overwrite,
            dry_run = options.dry_run,
            "Backfill started"
        );

        let mut report = BackfillReport::new(start, end, options.dry_run);
        let mut touched_months = BTreeSet::new();
        let mut date = start;

        while date <= end {
            let day = self.import_day(date, options, now, &mut report).await;
            if matches!(day.status, DayStatus::Written) {
                touched_months.insert(year_month(date));
            }
            if let DayStatus::Failed { error } = &day.status {
                tracing::warn!(date = %day.date, %error, "Backfill day failed");
            }
            report.push(day);

            let next = next_day(date);
            if next == date {
                break;
            }
            date = next;
        }

        if !options.dry_run {
            self.recompute_touched(&touched_months, now, &mut report)?;
        }

        tracing::info!(
            written = report.days_written,
            failed = report.days_failed,
            skipped = report.days_skipped,
            calls = report.external_calls,
            energy_wh = report.energy_total_wh,
            "Backfill finished"
        );
        Ok(report)
    }

    async fn import_day(
        &self,
        date: NaiveDate,
        options: BackfillOptions,
        now: i64,
        report: &mut BackfillReport,
    ) -> BackfillDay {
        let key = date.format("%Y-%m-%d").to_string();
        let outcome = |status: DayStatus| BackfillDay {
            date: key.clone(),
            status,
            energy_wh: None,
            hours: 0,
        };

        if self.calendar.day_end(date) > now {
            return outcome(DayStatus::Skipped {
                reason: "day has not ended yet".to_string(),
            });
        }

        if !options.overwrite {
            match self.store.day(&key) {
                Ok(Some(_)) => {
                    return outcome(DayStatus::Skipped {
                        reason: "already aggregated".to_string(),
                    });
                }
                Ok(None) => {}
                Err(e) => return outcome(DayStatus::Failed { error: e.to_string() }),
            }
        }

        if report.external_calls > 0 {
            self.rate.pause().await;
        }
        report.external_calls += 1;

        let intervals = match self.source.fetch_day_intervals(date).await {
            Ok(intervals) => intervals,
            Err(e) => return outcome(DayStatus::Failed { error: e.to_string() }),
        };

        let Some((day, hours)) = compute_day(date, &self.calendar, &intervals, &self.settings)
        else {
            return outcome(DayStatus::Failed {
                error: "no interval data".to_string(),
            });
        };

        let status = if options.dry_run {
            DayStatus::DryRun
        } else {
            let day_end = self.calendar.day_end(date);
            match self.store.write_day_with_hours(&day, day_end, &hours) {
                Ok(()) => DayStatus::Written,
                Err(e) => DayStatus::Failed { error: e.to_string() },
            }
        };

        tracing::debug!(
            date = %key,
            energy_wh = day.energy_total_wh,
            hours = hours.len(),
            "Backfill day computed"
        );
        BackfillDay {
            date: key,
            status,
            energy_wh: Some(day.energy_total_wh),
            hours: hours.len(),
        }
    }

    fn recompute_touched(
        &self,
        months: &BTreeSet<(i32, u32)>,
        now: i64,
        report: &mut BackfillReport,
    ) -> Result<()> {
        let aggregator = Aggregator::new(self.store, self.calendar, self.settings);
        let mut years = BTreeSet::new();

        for &(year, month) in months {
            if aggregator.force_month(year, month, now)?.is_some() {
                report.months_recomputed.push(format!("{year}-{month:02}"));
                years.insert(year);
            }
        }
        for year in years {
            if aggregator.force_year(year, now)?.is_some() {
                report.years_recomputed.push(year);
            }
        }

        Ok(())
    }
}
