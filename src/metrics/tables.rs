//! Physical table selection for metric queries.
//!
//! Samples live in a raw table plus 5m and 30m rollups; series metadata in
//! four time-series tables bucketed by 1h, 6h, 1d and 1w. Longer windows read
//! coarser tables. All functions here are pure.

use crate::error::{BuildResult, QueryBuildError};
use crate::pipeline::{column_for, SamplesTablePolicy, SamplesTier};
use crate::types::{MetricAggregation, MetricType, TableHints, Temporality, TimeAggregation};

pub const DB_NAME: &str = "signoz_metrics";

pub const SAMPLES_TABLE: &str = "distributed_samples_v4";
pub const SAMPLES_AGG_5M_TABLE: &str = "distributed_samples_v4_agg_5m";
pub const SAMPLES_AGG_30M_TABLE: &str = "distributed_samples_v4_agg_30m";
pub const EXP_HIST_TABLE: &str = "distributed_exp_hist";

pub const TIME_SERIES_TABLE: &str = "distributed_time_series_v4";
pub const TIME_SERIES_6HRS_TABLE: &str = "distributed_time_series_v4_6hrs";
pub const TIME_SERIES_1DAY_TABLE: &str = "distributed_time_series_v4_1day";
pub const TIME_SERIES_1WEEK_TABLE: &str = "distributed_time_series_v4_1week";

pub const HOUR_MS: u64 = 60 * 60 * 1000;
pub const SIX_HOURS_MS: u64 = 6 * HOUR_MS;
pub const DAY_MS: u64 = 24 * HOUR_MS;
pub const WEEK_MS: u64 = 7 * DAY_MS;

/// Added to the samples thresholds so a step-aligned window just over a day
/// or a week stays on the finer tier.
const OFFSET_BUCKET_MS: u64 = HOUR_MS;

fn hinted(hint: Option<&String>) -> Option<&str> {
    hint.map(String::as_str).filter(|t| !t.is_empty())
}

/// Samples table for a window.
pub fn samples_table<'a>(
    start: u64,
    end: u64,
    metric_type: MetricType,
    time_aggregation: TimeAggregation,
    hints: Option<&'a TableHints>,
) -> &'a str {
    if let Some(table) = hints.and_then(|h| hinted(h.samples_table.as_ref())) {
        return table;
    }
    if metric_type == MetricType::ExponentialHistogram {
        return EXP_HIST_TABLE;
    }
    if time_aggregation == TimeAggregation::CountDistinct {
        return SAMPLES_TABLE;
    }

    let window = end.saturating_sub(start);
    if window < DAY_MS + OFFSET_BUCKET_MS {
        SAMPLES_TABLE
    } else if window < WEEK_MS + OFFSET_BUCKET_MS {
        SAMPLES_AGG_5M_TABLE
    } else {
        SAMPLES_AGG_30M_TABLE
    }
}

/// Tier of a samples table. Rollup tables carry `_agg_` in their name.
pub fn samples_tier(table: &str) -> SamplesTier {
    if table.contains("_agg_") {
        SamplesTier::Rollup
    } else {
        SamplesTier::Raw
    }
}

/// Bucket size of a time-series table, if it is one of ours.
fn time_series_bucket(table: &str) -> Option<u64> {
    match table {
        TIME_SERIES_TABLE => Some(HOUR_MS),
        TIME_SERIES_6HRS_TABLE => Some(SIX_HOURS_MS),
        TIME_SERIES_1DAY_TABLE => Some(DAY_MS),
        TIME_SERIES_1WEEK_TABLE => Some(WEEK_MS),
        _ => None,
    }
}

/// Time-series table for a window, with start floored to the table's bucket.
pub fn time_series_table<'a>(
    start: u64,
    end: u64,
    hints: Option<&'a TableHints>,
) -> (u64, u64, &'a str) {
    if let Some(table) = hints.and_then(|h| hinted(h.time_series_table.as_ref())) {
        let start = match time_series_bucket(table) {
            Some(bucket) => start - start % bucket,
            None => start,
        };
        return (start, end, table);
    }

    let window = end.saturating_sub(start);
    let (table, bucket) = if window < SIX_HOURS_MS {
        (TIME_SERIES_TABLE, HOUR_MS)
    } else if window < DAY_MS {
        (TIME_SERIES_6HRS_TABLE, SIX_HOURS_MS)
    } else if window < WEEK_MS {
        (TIME_SERIES_1DAY_TABLE, DAY_MS)
    } else {
        (TIME_SERIES_1WEEK_TABLE, WEEK_MS)
    };
    (start - start % bucket, end, table)
}

/// Column expression read from the samples table for a window.
pub fn aggregation_column(
    start: u64,
    end: u64,
    metric_type: MetricType,
    temporality: Temporality,
    time_aggregation: TimeAggregation,
    hints: Option<&TableHints>,
) -> BuildResult<String> {
    let table = samples_table(start, end, metric_type, time_aggregation, hints);
    column_for(temporality, samples_tier(table), time_aggregation)
        .map(str::to_string)
        .ok_or_else(|| {
            QueryBuildError::InvalidInput(format!(
                "time aggregation `{}` is not supported on table `{}`",
                time_aggregation.as_str(),
                table
            ))
        })
}

/// Table policy for the metrics signal.
#[derive(Debug, Clone)]
pub struct MetricsTables {
    database: String,
}

impl MetricsTables {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
        }
    }
}

impl Default for MetricsTables {
    fn default() -> Self {
        Self::new(DB_NAME)
    }
}

impl SamplesTablePolicy for MetricsTables {
    fn database(&self) -> &str {
        &self.database
    }

    fn samples_table(&self, start: u64, end: u64, agg: &MetricAggregation) -> (String, SamplesTier) {
        let table = samples_table(
            start,
            end,
            agg.metric_type,
            agg.time_aggregation,
            agg.table_hints.as_ref(),
        );
        (table.to_string(), samples_tier(table))
    }
}
