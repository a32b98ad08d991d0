//! Human-readable output using rich_rust.
//!
//! Query, backfill, stats and pipeline results render as `Table`s and single
//! readings as `Panel`s. Styles are dropped when color is disabled.

use rich_rust::prelude::*;
use rich_rust::{Color, ColorSystem, Segment, Style};

use crate::cli::run::RunState;
use crate::cli::stats::StoreStats;
use crate::core::backfill::{BackfillReport, DayStatus};
use crate::core::calendar::Calendar;
use crate::core::ingest::CollectOutcome;
use crate::core::pipeline::PipelineReport;
use crate::core::query::{Average, CurrentResponse, HistoricalResponse, PointDetail};
use crate::util::{
    format_bytes, format_countdown, format_energy, format_percent, format_power,
    format_relative_time,
};

const TABLE_WIDTH: usize = 110;
const PANEL_WIDTH: usize = 60;

/// Convert segments to a string, with ANSI codes unless `no_color`.
fn segments_to_string(segments: &[Segment], no_color: bool) -> String {
    segments
        .iter()
        .map(|seg| match &seg.style {
            Some(style) if !no_color => style.render(&seg.text, ColorSystem::TrueColor),
            _ => seg.text.to_string(),
        })
        .collect()
}

/// `base` in the named color, or unchanged if the name does not parse.
fn with_color(base: Style, name: &str) -> Style {
    match Color::parse(name) {
        Ok(color) => base.color(color),
        Err(_) => base,
    }
}

fn styled_line(text: String, style: Style, no_color: bool) -> String {
    segments_to_string(&[Segment::styled(text, style)], no_color)
}

/// Lay out `rows` under `header` as a rich table.
fn render_table<const N: usize>(header: [&str; N], rows: &[[String; N]], no_color: bool) -> String {
    let mut table = Table::new();
    table.add_row_cells(header);
    for row in rows {
        table.add_row_cells(row.each_ref().map(String::as_str));
    }
    let text = segments_to_string(&table.render(TABLE_WIDTH), no_color);
    text.trim_end_matches('\n').to_string()
}

/// Frame labelled values in a titled panel.
fn render_panel(title: &str, fields: &[(&str, String)], no_color: bool) -> String {
    let label_style = Style::new().bold();
    let content: Vec<Vec<Segment>> = fields
        .iter()
        .map(|(label, value)| {
            vec![
                Segment::styled(format!("{label:<10}"), label_style.clone()),
                Segment::plain(value.clone()),
            ]
        })
        .collect();
    let title = if no_color {
        Text::new(title)
    } else {
        Text::styled(title, with_color(Style::new().bold(), "cyan"))
    };
    let mut panel = Panel::new(content).title(title).padding((0, 1));
    if !no_color {
        panel = panel.border_style(with_color(Style::new(), "blue"));
    }
    let text = segments_to_string(&panel.render(PANEL_WIDTH), no_color);
    text.trim_end_matches('\n').to_string()
}

fn finish(lines: &[String]) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Render one collection attempt.
#[must_use]
pub fn render_collect(
    outcome: &CollectOutcome,
    calendar: &Calendar,
    now: i64,
    no_color: bool,
) -> String {
    match outcome {
        CollectOutcome::Collected {
            sample,
            pruned,
            aggregation,
        } => {
            let mut fields = vec![
                ("Power", format_power(sample.power_w)),
                ("Today", format_energy(sample.energy_today_wh)),
                ("Month", format_energy(sample.energy_month_wh)),
                ("Lifetime", format_energy(sample.energy_total_wh)),
            ];
            if *pruned > 0 {
                fields.push(("Pruned", format!("{pruned} old raw sample(s)")));
            }
            let title = format!("Collected at {}", calendar.format_rfc3339(sample.timestamp));
            let mut lines = vec![render_panel(&title, &fields, no_color)];
            if aggregation.written() > 0 {
                lines.push(render_pipeline(aggregation, no_color).trim_end().to_string());
            }
            finish(&lines)
        }
        CollectOutcome::Skipped {
            last_collection,
            next_due,
        } => {
            let text = format!(
                "Skipped: last collection {}, next due {}",
                format_relative_time(*last_collection, now),
                format_countdown(*next_due, now)
            );
            finish(&[styled_line(text, Style::new().dim(), no_color)])
        }
    }
}

/// Render the per-stage summary of one cascade run.
#[must_use]
pub fn render_pipeline(report: &PipelineReport, no_color: bool) -> String {
    let rows: Vec<[String; 5]> = report
        .stages
        .iter()
        .map(|stage| {
            [
                stage.stage.as_str().to_string(),
                stage.examined.to_string(),
                stage.written.to_string(),
                stage.skipped_existing.to_string(),
                stage
                    .blocked_at
                    .map_or_else(|| "-".to_string(), |ts| ts.to_string()),
            ]
        })
        .collect();
    finish(&[
        render_table(["Stage", "Examined", "Written", "Existing", "Blocked"], &rows, no_color),
        format!(
            "{} bucket(s) written in {} ms",
            report.written(),
            report.duration_ms
        ),
    ])
}

/// Render a backfill report, one row per day.
#[must_use]
pub fn render_backfill(report: &BackfillReport, no_color: bool) -> String {
    let mode = if report.dry_run { " (dry run)" } else { "" };
    let heading = format!("Backfill {} .. {}{mode}", report.start, report.end);

    let rows: Vec<[String; 5]> = report
        .days
        .iter()
        .map(|day| {
            let (status, note) = match &day.status {
                DayStatus::Written => ("written", ""),
                DayStatus::DryRun => ("dry_run", ""),
                DayStatus::Skipped { reason } => ("skipped", reason.as_str()),
                DayStatus::Failed { error } => ("failed", error.as_str()),
            };
            [
                day.date.clone(),
                status.to_string(),
                day.energy_wh.map_or_else(|| "-".to_string(), format_energy),
                day.hours.to_string(),
                note.to_string(),
            ]
        })
        .collect();

    let mut lines = vec![
        styled_line(heading, Style::new().bold(), no_color),
        render_table(["Date", "Status", "Energy", "Hours", "Note"], &rows, no_color),
        format!(
            "{} written, {} skipped, {} failed, {} external call(s), {} total",
            report.days_written,
            report.days_skipped,
            report.days_failed,
            report.external_calls,
            format_energy(report.energy_total_wh)
        ),
    ];
    if !report.months_recomputed.is_empty() {
        lines.push(format!("Months recomputed: {}", report.months_recomputed.join(", ")));
    }
    if !report.years_recomputed.is_empty() {
        let years: Vec<String> = report.years_recomputed.iter().map(ToString::to_string).collect();
        lines.push(format!("Years recomputed: {}", years.join(", ")));
    }
    finish(&lines)
}

/// Render the latest reading.
#[must_use]
pub fn render_current(response: &CurrentResponse, calendar: &Calendar, no_color: bool) -> String {
    if let Some(error) = &response.error {
        return finish(&[styled_line(
            format!("No current reading: {error}"),
            with_color(Style::new(), "yellow"),
            no_color,
        )]);
    }
    let fields = [
        ("Power", format_power(response.power)),
        ("Today", format_energy(response.energy_today)),
        ("Month", format_energy(response.energy_month)),
        ("Lifetime", format_energy(response.energy)),
        ("Status", response.status.to_string()),
        ("As of", calendar.format_rfc3339(response.timestamp)),
    ];
    finish(&[render_panel("Current reading", &fields, no_color)])
}

fn detail_note(detail: &PointDetail) -> String {
    match detail {
        PointDetail::Hour { sample_count, .. } => format!("{sample_count} samples"),
        PointDetail::Day {
            sunlight_hours,
            capacity_factor,
            ..
        } => format!(
            "{sunlight_hours:.1} h sun, CF {}",
            format_percent(*capacity_factor)
        ),
        PointDetail::Month {
            days_with_data,
            capacity_factor,
            ..
        } => format!("{days_with_data} days, CF {}", format_percent(*capacity_factor)),
        PointDetail::Year {
            months_with_data,
            capacity_factor,
            ..
        } => format!(
            "{months_with_data} months, CF {}",
            format_percent(*capacity_factor)
        ),
    }
}

/// Render a range query as a table followed by its summary.
#[must_use]
pub fn render_historical(response: &HistoricalResponse, no_color: bool) -> String {
    let mut lines = Vec::new();
    if let Some(error) = &response.error {
        lines.push(styled_line(
            format!("Query failed: {error}"),
            with_color(Style::new(), "red"),
            no_color,
        ));
    }
    if response.chart_data.is_empty() {
        lines.push(format!("No {} buckets yet.", response.period));
        return finish(&lines);
    }

    let rows: Vec<[String; 5]> = response
        .chart_data
        .iter()
        .map(|point| {
            [
                point.timestamp.clone(),
                format_energy(point.production),
                format_power(point.power),
                format_power(point.power_max),
                detail_note(&point.detail),
            ]
        })
        .collect();
    lines.push(render_table(
        ["Start", "Production", "Power", "Peak", "Detail"],
        &rows,
        no_color,
    ));

    let stats = &response.stats;
    let average = match stats.average {
        Average::Power(w) => format!("avg power {}", format_power(w)),
        Average::Daily(wh) => format!("avg/day {}", format_energy(wh)),
        Average::Monthly(wh) => format!("avg/month {}", format_energy(wh)),
        Average::Yearly(wh) => format!("avg/year {}", format_energy(wh)),
    };
    let peak_time = stats.peak_power.time.as_deref().unwrap_or("-");
    lines.push(format!(
        "{} bucket(s): total {}, {average}, peak {} at {peak_time}, CF {}",
        response.chart_data.len(),
        format_energy(stats.total_energy),
        format_power(stats.peak_power.value),
        format_percent(stats.capacity_factor)
    ));
    finish(&lines)
}

/// Render database statistics.
#[must_use]
pub fn render_stats(stats: &StoreStats, now: i64, no_color: bool) -> String {
    let tables: Vec<[String; 2]> = stats
        .tables
        .iter()
        .map(|t| [t.table.to_string(), t.rows.to_string()])
        .collect();
    let marks: Vec<[String; 2]> = stats
        .watermarks
        .iter()
        .map(|mark| {
            let value = match (&mark.time, mark.value) {
                (Some(time), Some(ts)) => format!("{time} ({})", format_relative_time(ts, now)),
                _ => "never".to_string(),
            };
            [mark.key.to_string(), value]
        })
        .collect();

    finish(&[
        styled_line(
            format!("Database: {} ({})", stats.db_path, format_bytes(stats.db_size_bytes)),
            Style::new().bold(),
            no_color,
        ),
        format!("Timezone: {}", stats.timezone),
        render_table(["Table", "Rows"], &tables, no_color),
        render_table(["Watermark", "Value"], &marks, no_color),
    ])
}

/// Render the scheduler's final counters.
#[must_use]
pub fn render_run_summary(state: &RunState, no_color: bool) -> String {
    let mut lines = vec![format!(
        "Stopped after {} tick(s): {} collected, {} skipped, {} failed",
        state.ticks, state.collected, state.skipped, state.failed
    )];
    if let Some(error) = &state.last_error {
        lines.push(styled_line(
            format!("Last error: {error}"),
            with_color(Style::new(), "red"),
            no_color,
        ));
    }
    finish(&lines)
}
