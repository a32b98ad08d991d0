//! pvstat - PV inverter telemetry collector
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use pvstat::cli::{Cli, Commands, Context};
use pvstat::core::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = cli
        .log_level
        .as_deref()
        .and_then(logging::LogLevel::from_arg)
        .or_else(|| logging::parse_log_level_from_env().map(logging::LogLevel::from_tracing_level))
        .unwrap_or_default();
    let log_format = if cli.json_output {
        logging::LogFormat::Json
    } else {
        logging::parse_log_format_from_env().unwrap_or_default()
    };
    let log_file = logging::parse_log_file_from_env();
    logging::init(log_level, log_format, log_file, cli.verbose);

    let format = cli.effective_format();
    let pretty = cli.pretty;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            eprintln!("{}", pvstat::render::render_error(&e, format, pretty));
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> pvstat::Result<()> {
    let Some(command) = &cli.command else {
        print_quickstart();
        return Ok(());
    };

    let ctx = Context::open(&cli)?;

    match command {
        Commands::Collect(args) => pvstat::cli::collect::execute(&ctx, args).await,
        Commands::Backfill(args) => pvstat::cli::backfill::execute(&ctx, args).await,
        Commands::Aggregate(args) => pvstat::cli::aggregate::execute(&ctx, args),
        Commands::Query(args) => pvstat::cli::query::execute(&ctx, args),
        Commands::Current => pvstat::cli::query::execute_current(&ctx),
        Commands::Stats => pvstat::cli::stats::execute(&ctx),
        Commands::Run(args) => pvstat::cli::run::execute(&ctx, args).await,
    }
}

/// Print quickstart help when no command is given.
fn print_quickstart() {
    println!(
        r"pvstat - PV inverter telemetry collector

USAGE:
    pvstat [OPTIONS] <COMMAND>

COMMANDS:
    collect     Poll the source once and run the aggregation cascade
    backfill    Import past days from the source's interval history
    aggregate   Run the aggregation cascade without polling
    query       Show the most recent hour/day/month/year buckets
    current     Show the latest collected reading
    stats       Show table sizes and watermarks
    run         Collect on a fixed interval until Ctrl+C

QUICK START:
    pvstat --source-url http://inverter.local/api collect
    pvstat backfill --days 7
    pvstat query --granularity day --count 7
    pvstat --json query --granularity month --count 12

For more help: pvstat --help
"
    );
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
}
