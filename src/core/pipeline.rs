//! Aggregation cascade executor.
//!
//! Runs the rollup stages in their fixed order. Ordering alone is not relied
//! on for correctness: each stage re-checks that the stage below it has
//! covered the period before rolling it.

use std::time::Instant;

use serde::Serialize;

use super::aggregate::{AggregationSettings, Aggregator, StageReport};
use super::calendar::Calendar;
use super::models::Granularity;
use crate::error::Result;
use crate::storage::TelemetryStore;

/// Outcome of one pass through every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
    pub duration_ms: u64,
}

impl PipelineReport {
    /// Total buckets written across stages.
    #[must_use]
    pub fn written(&self) -> usize {
        self.stages.iter().map(|s| s.written).sum()
    }

    #[must_use]
    pub fn stage(&self, stage: Granularity) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

/// The ordered `hour -> day -> month -> year` cascade.
pub struct Pipeline<'a> {
    aggregator: Aggregator<'a>,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub const fn new(
        store: &'a TelemetryStore,
        calendar: Calendar,
        settings: AggregationSettings,
    ) -> Self {
        Self {
            aggregator: Aggregator::new(store, calendar, settings),
        }
    }

    #[must_use]
    pub const fn aggregator(&self) -> &Aggregator<'a> {
        &self.aggregator
    }

    /// Run every stage once for `now`.
    ///
    /// `force` makes the day, month and year stages recompute their lookback
    /// window instead of skipping periods that already have a bucket.
    ///
    /// # Errors
    /// Stops at the first stage that fails. Earlier stages stay committed.
    pub fn run(&self, now: i64, force: bool) -> Result<PipelineReport> {
        let start = Instant::now();
        let mut stages = Vec::with_capacity(Granularity::ALL.len());

        for &stage in Granularity::ALL {
            let report = match stage {
                Granularity::Hour => self.aggregator.aggregate_hours(now),
                Granularity::Day => self.aggregator.aggregate_days(now, force),
                Granularity::Month => self.aggregator.aggregate_months(now, force),
                Granularity::Year => self.aggregator.aggregate_years(now, force),
            }
            .inspect_err(|e| tracing::warn!(stage = %stage, error = %e, "Stage failed"))?;

            tracing::debug!(
                stage = %stage,
                examined = report.examined,
                written = report.written,
                skipped = report.skipped_existing,
                blocked_at = ?report.blocked_at,
                "Stage finished"
            );
            stages.push(report);
        }

        #[allow(clippy::cast_possible_truncation)] // a cascade never runs for 584 million years
        let duration_ms = start.elapsed().as_millis() as u64;
        let report = PipelineReport {
            stages,
            duration_ms,
        };
        tracing::info!(written = report.written(), duration_ms, "Aggregation cascade finished");
        Ok(report)
    }
}
