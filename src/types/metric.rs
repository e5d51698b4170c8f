//! Metric aggregation model: what to read and how to fold it.

use serde::{Deserialize, Serialize};

/// Instrument kind of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Gauge,
    Sum,
    Histogram,
    Summary,
    ExponentialHistogram,
    #[default]
    Unspecified,
}

/// How successive samples of a series relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Temporality {
    Delta,
    Cumulative,
    #[default]
    Unspecified,
    /// Mixed or not yet known. No temporality predicate is emitted.
    Unknown,
}

impl Temporality {
    /// Value stored in the `temporality` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Temporality::Delta => "delta",
            Temporality::Cumulative => "cumulative",
            Temporality::Unspecified => "unspecified",
            Temporality::Unknown => "unknown",
        }
    }
}

/// Per-series aggregation over one step bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeAggregation {
    Latest,
    Sum,
    Avg,
    Min,
    Max,
    Count,
    CountDistinct,
    Rate,
    Increase,
    #[default]
    Unspecified,
}

impl TimeAggregation {
    pub fn is_rate_or_increase(&self) -> bool {
        matches!(self, TimeAggregation::Rate | TimeAggregation::Increase)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeAggregation::Latest => "latest",
            TimeAggregation::Sum => "sum",
            TimeAggregation::Avg => "avg",
            TimeAggregation::Min => "min",
            TimeAggregation::Max => "max",
            TimeAggregation::Count => "count",
            TimeAggregation::CountDistinct => "count_distinct",
            TimeAggregation::Rate => "rate",
            TimeAggregation::Increase => "increase",
            TimeAggregation::Unspecified => "unspecified",
        }
    }
}

/// Cross-series aggregation within one step bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceAggregation {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    P50,
    P75,
    P90,
    P95,
    P99,
    #[default]
    Unspecified,
}

impl SpaceAggregation {
    pub fn is_percentile(&self) -> bool {
        self.percentile().is_some()
    }

    /// Quantile in `[0, 1]` for percentile aggregations.
    pub fn percentile(&self) -> Option<f64> {
        match self {
            SpaceAggregation::P50 => Some(0.5),
            SpaceAggregation::P75 => Some(0.75),
            SpaceAggregation::P90 => Some(0.9),
            SpaceAggregation::P95 => Some(0.95),
            SpaceAggregation::P99 => Some(0.99),
            _ => None,
        }
    }

    /// ClickHouse aggregate applied to `per_series_value` in the spatial stage.
    pub fn function_name(&self) -> Option<String> {
        let name = match self {
            SpaceAggregation::Sum => "sum",
            SpaceAggregation::Avg => "avg",
            SpaceAggregation::Min => "min",
            SpaceAggregation::Max => "max",
            SpaceAggregation::Count => "count",
            SpaceAggregation::Unspecified => return None,
            _ => return self.percentile().map(|q| format!("quantile({:.3})", q)),
        };
        Some(name.to_string())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpaceAggregation::Sum => "sum",
            SpaceAggregation::Avg => "avg",
            SpaceAggregation::Min => "min",
            SpaceAggregation::Max => "max",
            SpaceAggregation::Count => "count",
            SpaceAggregation::P50 => "p50",
            SpaceAggregation::P75 => "p75",
            SpaceAggregation::P90 => "p90",
            SpaceAggregation::P95 => "p95",
            SpaceAggregation::P99 => "p99",
            SpaceAggregation::Unspecified => "unspecified",
        }
    }
}

/// Explicit table overrides. Bypass the tiering policy when set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableHints {
    pub time_series_table: Option<String>,
    pub samples_table: Option<String>,
}

/// Keep only series values equal to `value` after temporal aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueFilter {
    pub value: f64,
}

/// One metric aggregation of a query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricAggregation {
    pub metric_name: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub temporality: Temporality,
    pub time_aggregation: TimeAggregation,
    pub space_aggregation: SpaceAggregation,
    pub table_hints: Option<TableHints>,
    pub value_filter: Option<ValueFilter>,
}

impl MetricAggregation {
    pub fn new(metric_name: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, metric_type: MetricType) -> Self {
        self.metric_type = metric_type;
        self
    }

    pub fn with_temporality(mut self, temporality: Temporality) -> Self {
        self.temporality = temporality;
        self
    }

    pub fn with_time_aggregation(mut self, agg: TimeAggregation) -> Self {
        self.time_aggregation = agg;
        self
    }

    pub fn with_space_aggregation(mut self, agg: SpaceAggregation) -> Self {
        self.space_aggregation = agg;
        self
    }

    pub fn with_table_hints(mut self, hints: TableHints) -> Self {
        self.table_hints = Some(hints);
        self
    }

    pub fn with_value_filter(mut self, value: f64) -> Self {
        self.value_filter = Some(ValueFilter { value });
        self
    }
}
