//! Live sample collection.
//!
//! One `collect` call polls the source once, stores the sample, prunes old raw
//! samples and runs the aggregation cascade. The minimum-interval gate is
//! checked against the persisted collection watermark, so it holds across
//! process restarts and overlapping cron invocations.

use chrono::Utc;
use serde::Serialize;

use super::aggregate::AggregationSettings;
use super::calendar::Calendar;
use super::models::RawSample;
use super::pipeline::{Pipeline, PipelineReport};
use crate::error::{PvError, Result};
use crate::source::TelemetrySource;
use crate::storage::config::Config;
use crate::storage::{TelemetryStore, Watermark};

const DAY_SECS: i64 = 86_400;

/// Early arrival tolerated by the minimum-interval gate. Timestamps are whole
/// seconds, so a scheduler tick of exactly `min_interval` can land one second
/// short of it.
pub const GATE_SLACK_SECS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorSettings {
    pub enabled: bool,
    pub min_interval_seconds: u64,
    pub retention_days: u32,
}

impl CollectorSettings {
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.general.enabled,
            min_interval_seconds: config.collector.min_interval_seconds,
            retention_days: config.collector.retention_days,
        }
    }
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Result of a collection attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CollectOutcome {
    Collected {
        sample: RawSample,
        pruned: usize,
        aggregation: PipelineReport,
    },
    /// The previous collection is too recent.
    Skipped {
        last_collection: i64,
        next_due: i64,
    },
}

impl CollectOutcome {
    #[must_use]
    pub const fn is_collected(&self) -> bool {
        matches!(self, Self::Collected { .. })
    }
}

/// Polls a telemetry source into a store.
pub struct Collector<'a, S> {
    store: &'a TelemetryStore,
    source: S,
    calendar: Calendar,
    settings: CollectorSettings,
    aggregation: AggregationSettings,
}

impl<'a, S: TelemetrySource> Collector<'a, S> {
    pub const fn new(
        store: &'a TelemetryStore,
        source: S,
        calendar: Calendar,
        settings: CollectorSettings,
        aggregation: AggregationSettings,
    ) -> Self {
        Self {
            store,
            source,
            calendar,
            settings,
            aggregation,
        }
    }

    /// Collect one sample now.
    ///
    /// # Errors
    /// See [`Collector::collect_at`].
    pub async fn collect(&self, force: bool) -> Result<CollectOutcome> {
        self.collect_at(Utc::now().timestamp(), force).await
    }

    /// Collect one sample as if the clock read `now`.
    ///
    /// `force` bypasses both the enable switch and the minimum-interval gate.
    ///
    /// # Errors
    /// - `CollectorDisabled` when collection is switched off and not forced
    /// - source errors, in which case nothing is written and the collection
    ///   watermark does not move
    /// - store errors from the write, prune or cascade
    pub async fn collect_at(&self, now: i64, force: bool) -> Result<CollectOutcome> {
        if !force && !self.settings.enabled {
            return Err(PvError::CollectorDisabled);
        }

        if !force {
            if let Some(last) = self.store.watermark(Watermark::RawCollection)? {
                let min_interval = i64::try_from(self.settings.min_interval_seconds)
                    .unwrap_or(i64::MAX);
                let next_due = last
                    .saturating_add(min_interval)
                    .saturating_sub(GATE_SLACK_SECS);
                if now < next_due {
                    tracing::info!(last, next_due, "Collection skipped, previous one too recent");
                    return Ok(CollectOutcome::Skipped {
                        last_collection: last,
                        next_due,
                    });
                }
            }
        }

        let reading = self
            .source
            .fetch_current()
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Telemetry fetch failed"))?;

        let sample = RawSample::from_reading(&reading, now);
        self.store.record_sample(&sample, now)?;
        tracing::info!(
            timestamp = sample.timestamp,
            power_w = sample.power_w,
            energy_today_wh = sample.energy_today_wh,
            "Sample collected"
        );

        let cutoff = now - i64::from(self.settings.retention_days) * DAY_SECS;
        let pruned = self.store.prune_samples_before(cutoff)?;
        if pruned > 0 {
            tracing::debug!(pruned, cutoff, "Pruned raw samples");
        }

        let aggregation =
            Pipeline::new(self.store, self.calendar, self.aggregation).run(now, false)?;

        Ok(CollectOutcome::Collected {
            sample,
            pruned,
            aggregation,
        })
    }
}
