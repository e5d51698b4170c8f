//! Aggregation column lookup.
//!
//! Maps (temporality, samples tier, time aggregation) to the column
//! expression read from the samples table. Raw tables hold one `value` per
//! sample; rollup tables pre-aggregate into `sum`, `count`, `min`, `max` and
//! `last` columns.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::types::{Temporality, TimeAggregation};

/// Granularity class of a samples table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplesTier {
    Raw,
    Rollup,
}

type ColumnKey = (Temporality, SamplesTier, TimeAggregation);

static COLUMN_MAP: Lazy<HashMap<ColumnKey, &'static str>> = Lazy::new(|| {
    use SamplesTier::*;
    use TimeAggregation as T;

    let mut map = HashMap::new();
    for temporality in [
        Temporality::Delta,
        Temporality::Cumulative,
        Temporality::Unspecified,
    ] {
        // Counters only grow under cumulative temporality, so the last
        // reading in a bucket is its max.
        let (raw_rate, rollup_rate) = match temporality {
            Temporality::Cumulative => ("max(value)", "max(max)"),
            _ => ("sum(value)", "sum(sum)"),
        };

        let raw = [
            (T::Latest, "anyLast(value)"),
            (T::Sum, "sum(value)"),
            (T::Avg, "avg(value)"),
            (T::Min, "min(value)"),
            (T::Max, "max(value)"),
            (T::Count, "count(value)"),
            (T::CountDistinct, "countDistinct(value)"),
            (T::Rate, raw_rate),
            (T::Increase, raw_rate),
        ];
        let rollup = [
            (T::Latest, "anyLast(last)"),
            (T::Sum, "sum(sum)"),
            (T::Avg, "sum(sum)/sum(count)"),
            (T::Min, "min(min)"),
            (T::Max, "max(max)"),
            (T::Count, "sum(count)"),
            (T::Rate, rollup_rate),
            (T::Increase, rollup_rate),
        ];

        for (agg, col) in raw {
            map.insert((temporality, Raw, agg), col);
        }
        for (agg, col) in rollup {
            map.insert((temporality, Rollup, agg), col);
        }
    }
    map
});

/// Column expression for a cell, or `None` if the cell has no column
/// (distinct counts on rollups, unspecified time aggregation).
///
/// `Unknown` temporality reads the `Unspecified` cells.
pub fn column_for(
    temporality: Temporality,
    tier: SamplesTier,
    time_aggregation: TimeAggregation,
) -> Option<&'static str> {
    let temporality = match temporality {
        Temporality::Unknown => Temporality::Unspecified,
        t => t,
    };
    COLUMN_MAP.get(&(temporality, tier, time_aggregation)).copied()
}
