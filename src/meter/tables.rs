//! Physical table selection for meter queries.
//!
//! Meter samples are coarse usage counters kept in a raw table and a daily
//! rollup. There is no separate time-series table.

use crate::pipeline::{SamplesTablePolicy, SamplesTier};
use crate::types::{MetricAggregation, TableHints};

pub const DB_NAME: &str = "signoz_meter";

pub const SAMPLES_TABLE: &str = "distributed_samples";
pub const SAMPLES_AGG_1D_TABLE: &str = "distributed_samples_agg_1d";

const HOUR_MS: u64 = 60 * 60 * 1000;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Windows shorter than this read the raw table.
pub const RAW_THRESHOLD_MS: u64 = 30 * DAY_MS + HOUR_MS;

/// Samples table for a window.
pub fn samples_table<'a>(start: u64, end: u64, hints: Option<&'a TableHints>) -> &'a str {
    if let Some(table) = hints
        .and_then(|h| h.samples_table.as_deref())
        .filter(|t| !t.is_empty())
    {
        return table;
    }
    if end.saturating_sub(start) < RAW_THRESHOLD_MS {
        SAMPLES_TABLE
    } else {
        SAMPLES_AGG_1D_TABLE
    }
}

/// Table policy for the meter signal.
#[derive(Debug, Clone)]
pub struct MeterTables {
    database: String,
}

impl MeterTables {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
        }
    }
}

impl Default for MeterTables {
    fn default() -> Self {
        Self::new(DB_NAME)
    }
}

impl SamplesTablePolicy for MeterTables {
    fn database(&self) -> &str {
        &self.database
    }

    fn samples_table(&self, start: u64, end: u64, agg: &MetricAggregation) -> (String, SamplesTier) {
        let table = samples_table(start, end, agg.table_hints.as_ref());
        let tier = if table == SAMPLES_TABLE {
            SamplesTier::Raw
        } else {
            SamplesTier::Rollup
        };
        (table.to_string(), tier)
    }
}
