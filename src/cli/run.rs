//! Foreground scheduler.
//!
//! Calls `collect` on a fixed interval until Ctrl+C. A failed tick is logged
//! and counted; the next tick tries again.

use chrono::Utc;
use serde::Serialize;
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::cli::Context;
use crate::cli::args::RunArgs;
use crate::core::ingest::{CollectOutcome, Collector, CollectorSettings};
use crate::error::{PvError, Result};
use crate::render::human;
use crate::source::HttpSource;

/// Counters across scheduler ticks.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub ticks: u64,
    pub collected: u64,
    pub skipped: u64,
    pub failed: u64,
    pub last_error: Option<String>,
}

impl RunState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of one tick.
    pub fn update(&mut self, result: &Result<CollectOutcome>) {
        self.ticks += 1;
        match result {
            Ok(CollectOutcome::Collected { .. }) => {
                self.collected += 1;
                self.last_error = None;
            }
            Ok(CollectOutcome::Skipped { .. }) => self.skipped += 1,
            Err(e) => {
                self.failed += 1;
                self.last_error = Some(e.to_string());
            }
        }
    }
}

/// Execute the run command.
///
/// # Errors
/// Returns an error for a zero interval, a disabled collector, a missing
/// source URL, or a rendering failure. Per-tick collection errors are not
/// returned.
pub async fn execute(ctx: &Context, args: &RunArgs) -> Result<()> {
    if args.interval == 0 {
        return Err(PvError::Config(
            "Run interval must be greater than 0 seconds".to_string(),
        ));
    }

    let settings = CollectorSettings::from_config(&ctx.resolved.config);
    if !settings.enabled {
        return Err(PvError::CollectorDisabled);
    }

    let source = HttpSource::from_config(&ctx.resolved)?;
    let collector = Collector::new(
        &ctx.store,
        source,
        ctx.calendar(),
        settings,
        ctx.aggregation(),
    );
    let calendar = ctx.calendar();

    let mut state = RunState::new();
    let mut ticker = interval(Duration::from_secs(args.interval));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Ctrl+C handler for clean shutdown.
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(());
    });

    tracing::info!(interval_secs = args.interval, "Scheduler started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let result = collector.collect(false).await;
                state.update(&result);
                match result {
                    Ok(outcome) => {
                        let now = Utc::now().timestamp();
                        ctx.emit(&outcome, |o| {
                            human::render_collect(o, &calendar, now, ctx.no_color)
                        })?;
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            code = e.error_code(),
                            retryable = e.is_retryable(),
                            "Collection tick failed"
                        );
                    }
                }
            }
            _ = &mut shutdown_rx => {
                tracing::info!(ticks = state.ticks, failed = state.failed, "Scheduler stopped");
                ctx.emit(&state, |s| human::render_run_summary(s, ctx.no_color))?;
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{raw_sample, utc_ts};

    #[test]
    fn run_state_counts_each_outcome() {
        let mut state = RunState::new();
        let ts = utc_ts(2024, 6, 1, 12, 0);

        state.update(&Err(PvError::SourceTimeout { seconds: 10 }));
        assert_eq!(state.failed, 1);
        assert!(state.last_error.as_deref().unwrap().contains("timed out"));

        state.update(&Ok(CollectOutcome::Skipped {
            last_collection: ts,
            next_due: ts + 300,
        }));
        assert!(state.last_error.is_some());

        state.update(&Ok(CollectOutcome::Collected {
            sample: raw_sample(ts, 100.0, 10.0),
            pruned: 0,
            aggregation: crate::core::pipeline::PipelineReport {
                stages: Vec::new(),
                duration_ms: 0,
            },
        }));

        assert_eq!(state.ticks, 3);
        assert_eq!(state.collected, 1);
        assert_eq!(state.skipped, 1);
        assert_eq!(state.failed, 1);
        assert!(state.last_error.is_none());
    }
}
