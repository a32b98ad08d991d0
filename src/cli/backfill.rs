//! Backfill command implementation.

use chrono::Utc;

use crate::cli::Context;
use crate::cli::args::BackfillArgs;
use crate::core::backfill::{BackfillOptions, Backfiller};
use crate::core::rate_limit::FixedDelay;
use crate::error::{PvError, Result};
use crate::render::human;
use crate::source::HttpSource;

/// Execute the backfill command.
///
/// Days that fail are listed in the report; the command then exits with a
/// partial-failure error.
pub async fn execute(ctx: &Context, args: &BackfillArgs) -> Result<()> {
    let calendar = ctx.calendar();
    let today = calendar.local_date(Utc::now().timestamp());
    let (start, end) = args.range(today)?;

    let source = HttpSource::from_config(&ctx.resolved)?;
    let rate = FixedDelay::from_millis(ctx.resolved.config.backfill.delay_ms);
    tracing::debug!(
        %start,
        %end,
        delay_ms = rate.delay().as_millis(),
        "Starting backfill"
    );

    let backfiller = Backfiller::new(&ctx.store, source, rate, calendar, ctx.aggregation());
    let options = BackfillOptions {
        overwrite: args.force,
        dry_run: args.dry_run,
    };
    let report = backfiller.backfill(start, end, options).await?;

    ctx.emit(&report, |r| human::render_backfill(r, ctx.no_color))?;

    if report.days_failed > 0 {
        return Err(PvError::PartialFailure {
            failed: report.days_failed,
        });
    }
    Ok(())
}
