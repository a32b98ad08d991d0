//! Query and current command implementations.
//!
//! Both always print a valid response. A store failure shows up in the
//! response's `error` field rather than as a failing exit status.

use crate::cli::Context;
use crate::cli::args::QueryArgs;
use crate::core::query::QueryService;
use crate::error::Result;
use crate::render::human;

fn service(ctx: &Context) -> QueryService<'_> {
    QueryService::new(
        &ctx.store,
        ctx.calendar(),
        ctx.resolved.config.system.rated_capacity_kw,
    )
}

/// Execute the query command.
pub fn execute(ctx: &Context, args: &QueryArgs) -> Result<()> {
    let response = service(ctx).query(args.granularity, args.count);
    ctx.emit(&response, |r| human::render_historical(r, ctx.no_color))
}

/// Execute the current command.
pub fn execute_current(ctx: &Context) -> Result<()> {
    let response = service(ctx).current();
    let calendar = ctx.calendar();
    ctx.emit(&response, |r| human::render_current(r, &calendar, ctx.no_color))
}
