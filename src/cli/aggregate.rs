//! Aggregate command implementation.

use chrono::Utc;

use crate::cli::Context;
use crate::cli::args::AggregateArgs;
use crate::core::pipeline::Pipeline;
use crate::error::Result;
use crate::render::human;

/// Execute the aggregate command.
pub fn execute(ctx: &Context, args: &AggregateArgs) -> Result<()> {
    let pipeline = Pipeline::new(&ctx.store, ctx.calendar(), ctx.aggregation());
    let report = pipeline.run(Utc::now().timestamp(), args.force)?;
    ctx.emit(&report, |r| human::render_pipeline(r, ctx.no_color))
}
