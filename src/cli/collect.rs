//! Collect command implementation.

use chrono::Utc;

use crate::cli::Context;
use crate::cli::args::CollectArgs;
use crate::core::ingest::{Collector, CollectorSettings};
use crate::error::Result;
use crate::render::human;
use crate::source::HttpSource;

/// Execute the collect command.
pub async fn execute(ctx: &Context, args: &CollectArgs) -> Result<()> {
    let source = HttpSource::from_config(&ctx.resolved)?;
    tracing::debug!(source = source.base_url(), force = args.force, "Starting collection");

    let collector = Collector::new(
        &ctx.store,
        source,
        ctx.calendar(),
        CollectorSettings::from_config(&ctx.resolved.config),
        ctx.aggregation(),
    );
    let outcome = collector.collect(args.force).await?;

    let calendar = ctx.calendar();
    let now = Utc::now().timestamp();
    ctx.emit(&outcome, |o| human::render_collect(o, &calendar, now, ctx.no_color))
}
