//! Core data models, bucket arithmetic and the collection pipeline.

pub mod aggregate;
pub mod backfill;
pub mod calendar;
pub mod http;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod rate_limit;
pub mod units;

pub use aggregate::{AggregationSettings, Aggregator, StageReport};
pub use backfill::{BackfillDay, BackfillOptions, BackfillReport, Backfiller, DayStatus};
pub use calendar::Calendar;
pub use ingest::{CollectOutcome, Collector, CollectorSettings};
pub use models::{
    DayBucket, DayIntervals, Granularity, HourBucket, IntervalSample, MonthBucket, RawSample,
    Reading, YearBucket,
};
pub use pipeline::{Pipeline, PipelineReport};
pub use query::{CurrentResponse, HistoricalResponse, QueryService};
pub use rate_limit::{FixedDelay, NoDelay, RatePolicy};
