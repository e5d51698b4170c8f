//! Aggregation pipeline shared by the metric and meter statement builders.
//!
//! Every statement is a chain of CTEs over a samples table:
//!
//! ```text
//!   samples (+ series filter)
//!        │
//!        ▼
//!   __temporal_aggregation_cte   one value per (fingerprint, ts bucket)
//!        │                       rate/increase via lagInFrame for counters
//!        ▼
//!   __spatial_aggregation_cte    fold series into (ts, group-by dims)
//!        │
//!        ▼
//!   final SELECT                 pass-through or histogramQuantile
//! ```
//!
//! Delta queries whose two aggregations commute skip the temporal stage and
//! aggregate samples straight into `__spatial_aggregation_cte`.
//!
//! The two builders differ in table tiering and in how samples are filtered.
//! Tiering is behind [`SamplesTablePolicy`]; filtering is carried by
//! [`SamplesSource`].

pub mod columns;

use crate::error::{BuildResult, QueryBuildError};
use crate::filter;
use crate::having;
use crate::sql::{combine_ctes, Cond, Cte, Dialect, Fragment, SelectBuilder, SqlDialect};
use crate::types::{
    FieldContext, FieldDataType, FieldKey, FieldKeySelector, GroupByKey, MetricAggregation,
    MetricType, Query, SelectorMatchType, Signal, SpaceAggregation, Statement, Temporality,
    TimeAggregation,
};

pub use columns::{column_for, SamplesTier};

pub const TEMPORAL_CTE: &str = "__temporal_aggregation_cte";
pub const SPATIAL_CTE: &str = "__spatial_aggregation_cte";

const RATE_WINDOW: &str = "PARTITION BY fingerprint ORDER BY fingerprint, ts";

const RATE_WITH_INTERPOLATION: &str = "CASE WHEN row_number() OVER rate_window = 1 THEN CASE WHEN leadInFrame(per_series_value, 1) OVER rate_window IS NOT NULL THEN (leadInFrame(per_series_value, 1) OVER rate_window - per_series_value) / (leadInFrame(ts, 1) OVER rate_window - ts) ELSE 0 END WHEN (per_series_value - lagInFrame(per_series_value, 1) OVER rate_window) < 0 THEN per_series_value / (ts - lagInFrame(ts, 1) OVER rate_window) ELSE (per_series_value - lagInFrame(per_series_value, 1) OVER rate_window) / (ts - lagInFrame(ts, 1) OVER rate_window) END";

const INCREASE_WITH_INTERPOLATION: &str = "CASE WHEN row_number() OVER rate_window = 1 THEN CASE WHEN leadInFrame(per_series_value, 1) OVER rate_window IS NOT NULL THEN ((leadInFrame(per_series_value, 1) OVER rate_window - per_series_value) / (leadInFrame(ts, 1) OVER rate_window - ts)) * (leadInFrame(ts, 1) OVER rate_window - ts) ELSE 0 END WHEN (per_series_value - lagInFrame(per_series_value, 1) OVER rate_window) < 0 THEN per_series_value ELSE (per_series_value - lagInFrame(per_series_value, 1) OVER rate_window) END";

// =============================================================================
// Table policy
// =============================================================================

/// Chooses the samples table for a time window.
pub trait SamplesTablePolicy: Send + Sync {
    /// Database holding the samples tables.
    fn database(&self) -> &str;

    /// Samples table name (without database) and its tier.
    fn samples_table(&self, start: u64, end: u64, agg: &MetricAggregation) -> (String, SamplesTier);

    /// Column expression read from the chosen samples table.
    ///
    /// Sketch percentiles merge the stored sketches instead of reading a
    /// column from the lookup table.
    fn aggregation_column(&self, start: u64, end: u64, agg: &MetricAggregation) -> BuildResult<String> {
        if let Some(expr) = sketch_quantile_column(agg) {
            return Ok(expr);
        }
        let (table, tier) = self.samples_table(start, end, agg);
        column_for(agg.temporality, tier, agg.time_aggregation)
            .map(str::to_string)
            .ok_or_else(|| {
                QueryBuildError::InvalidInput(format!(
                    "time aggregation `{}` is not supported on table `{}`",
                    agg.time_aggregation.as_str(),
                    table
                ))
            })
    }
}

// =============================================================================
// Validation and time range
// =============================================================================

/// Reject queries with no valid plan.
///
/// `percentile_rewrite` says whether the builder turns histogram percentiles
/// into rate/sum, which lets them omit the time aggregation. Without it only
/// exponential histograms take percentiles.
pub fn validate(start: u64, end: u64, query: &Query, percentile_rewrite: bool) -> BuildResult<()> {
    if query.aggregations.len() != 1 {
        return Err(QueryBuildError::InvalidInput(format!(
            "exactly one aggregation is required, got {}",
            query.aggregations.len()
        )));
    }
    let agg = &query.aggregations[0];

    if agg.metric_name.trim().is_empty() {
        return Err(QueryBuildError::invalid("metric name is required"));
    }
    if start >= end {
        return Err(QueryBuildError::InvalidInput(format!(
            "start ({}) must be before end ({})",
            start, end
        )));
    }
    if query.step_interval == 0 {
        return Err(QueryBuildError::invalid("step interval must be positive"));
    }

    if agg.space_aggregation == SpaceAggregation::Unspecified {
        return Err(QueryBuildError::invalid("space aggregation is required"));
    }
    if agg.space_aggregation.is_percentile()
        && !matches!(
            agg.metric_type,
            MetricType::Histogram | MetricType::ExponentialHistogram | MetricType::Summary
        )
    {
        return Err(QueryBuildError::InvalidInput(format!(
            "space aggregation `{}` needs a histogram or summary metric",
            agg.space_aggregation.as_str()
        )));
    }

    // Without the rewrite there is no `le` dimension for histogramQuantile.
    if !percentile_rewrite
        && agg.space_aggregation.is_percentile()
        && agg.metric_type != MetricType::ExponentialHistogram
    {
        return Err(QueryBuildError::InvalidInput(format!(
            "space aggregation `{}` is only supported for exponential histograms",
            agg.space_aggregation.as_str()
        )));
    }

    if agg.time_aggregation == TimeAggregation::Unspecified {
        let rewritten = percentile_rewrite
            && agg.space_aggregation.is_percentile()
            && agg.metric_type != MetricType::ExponentialHistogram;
        let sketch = agg.space_aggregation.is_percentile()
            && agg.metric_type == MetricType::ExponentialHistogram;
        if !rewritten && !sketch {
            return Err(QueryBuildError::invalid("time aggregation is required"));
        }
    }
    Ok(())
}

/// Align the window to the step.
///
/// Start floors to the step. Counter rates need the bucket before the first
/// one, so non-delta rate/increase start one step earlier. End floors to
/// `min(step, 60s)`. A step too large to express in milliseconds is rejected.
pub fn adjusted_time_range(
    start: u64,
    end: u64,
    step_secs: u64,
    agg: &MetricAggregation,
) -> BuildResult<(u64, u64)> {
    let step_ms = step_secs.checked_mul(1000).ok_or_else(|| {
        QueryBuildError::InvalidInput(format!("step interval {}s is too large", step_secs))
    })?;
    if step_ms == 0 {
        return Ok((start, end));
    }

    let mut start = start - start % step_ms;
    if agg.time_aggregation.is_rate_or_increase() && agg.temporality != Temporality::Delta {
        start = start.saturating_sub(step_ms);
    }

    let end_step_ms = step_secs.min(60) * 1000;
    let end = end - end % end_step_ms;
    Ok((start, end))
}

// =============================================================================
// Key selectors
// =============================================================================

/// Metadata selectors for every key a query mentions: filter keys, group-by
/// keys and order keys.
pub fn key_selectors(query: &Query, signal: Signal) -> Vec<FieldKeySelector> {
    let mut selectors = Vec::new();

    if let Some(expression) = query.filter_expression() {
        selectors.extend(filter::key_selectors(expression));
    }
    for g in &query.group_by {
        selectors.push(FieldKeySelector::from_key(&requested_key(&g.key)));
    }
    for o in &query.order {
        selectors.push(FieldKeySelector::from_key(&o.key));
    }

    let metric_name = query.aggregations.first().map(|a| a.metric_name.clone());
    for s in &mut selectors {
        s.signal = signal;
        s.match_type = SelectorMatchType::Exact;
        s.metric_name = metric_name.clone();
    }
    selectors
}

/// A key as requested: the name may carry its own context and type.
fn requested_key(key: &FieldKey) -> FieldKey {
    let mut parsed = FieldKey::parse(&key.name);
    if key.field_context != FieldContext::Unspecified {
        parsed.field_context = key.field_context;
    }
    if key.field_data_type != FieldDataType::Unspecified {
        parsed.field_data_type = key.field_data_type;
    }
    parsed
}

// =============================================================================
// Planning context
// =============================================================================

/// What one `build` call plans with. Derived from the query, never written back.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanContext {
    /// Aggregation driving the temporal and spatial stages.
    pub aggregation: MetricAggregation,
    /// Dimensions carried through the CTE stages, with any `context.` prefix
    /// and `:type` suffix moved off the name.
    pub group_by: Vec<GroupByKey>,
    /// Dimensions of the final projection.
    pub final_group_by: Vec<GroupByKey>,
    /// Quantile for the final `histogramQuantile`, if any.
    pub histogram_quantile: Option<f64>,
    /// HAVING condition over `value`, already rewritten.
    pub having: Option<String>,
    pub step_secs: u64,
}

impl PlanContext {
    /// Plan the query as written.
    pub fn new(query: &Query) -> BuildResult<Self> {
        let aggregation = query
            .aggregations
            .first()
            .cloned()
            .ok_or_else(|| QueryBuildError::invalid("exactly one aggregation is required"))?;
        let histogram_quantile = aggregation
            .space_aggregation
            .percentile()
            .filter(|_| aggregation.metric_type != MetricType::ExponentialHistogram);

        let group_by: Vec<GroupByKey> = query
            .group_by
            .iter()
            .map(|g| GroupByKey::from(requested_key(&g.key)))
            .collect();

        // References name the aggregation as the caller wrote it
        let having = match query.having_expression() {
            Some(expression) => Some(having::rewrite_for_metrics(expression, &aggregation)?),
            None => None,
        };

        Ok(Self {
            aggregation,
            final_group_by: group_by.clone(),
            group_by,
            histogram_quantile,
            having,
            step_secs: query.step_interval,
        })
    }

    /// Plan with histogram percentiles rewritten.
    ///
    /// A percentile over bucket counts is computed from the per-bucket rate,
    /// summed across series and grouped by `le`. An `le` the caller grouped
    /// by is kept for the stages and dropped from the final projection.
    pub fn with_percentile_rewrite(query: &Query) -> BuildResult<Self> {
        let mut ctx = Self::new(query)?;
        if ctx.histogram_quantile.is_none() {
            return Ok(ctx);
        }

        if ctx.group_by.iter().any(|g| g.name() == "le") {
            ctx.final_group_by.retain(|g| g.name() != "le");
        } else {
            ctx.group_by.push(GroupByKey::new("le"));
        }
        ctx.aggregation.time_aggregation = TimeAggregation::Rate;
        ctx.aggregation.space_aggregation = SpaceAggregation::Sum;
        Ok(ctx)
    }

    /// Whether the delta fast path applies.
    pub fn can_short_circuit_delta(&self) -> bool {
        can_short_circuit_delta(&self.aggregation)
    }

    fn group_names(&self) -> Vec<String> {
        quoted_names(&self.group_by)
    }
}

/// Delta aggregations whose temporal and spatial stages commute:
/// rate|increase then sum, sum then sum, min then min, max then max, and
/// sketch percentiles, which merge without per-series state.
pub fn can_short_circuit_delta(agg: &MetricAggregation) -> bool {
    if agg.temporality != Temporality::Delta {
        return false;
    }
    let ta = agg.time_aggregation;
    let sa = agg.space_aggregation;

    matches!(
        (ta, sa),
        (TimeAggregation::Rate | TimeAggregation::Increase, SpaceAggregation::Sum)
            | (TimeAggregation::Sum, SpaceAggregation::Sum)
            | (TimeAggregation::Min, SpaceAggregation::Min)
            | (TimeAggregation::Max, SpaceAggregation::Max)
    ) || (agg.metric_type == MetricType::ExponentialHistogram && sa.is_percentile())
}

/// Backtick-quoted group-by names, as CTE stages refer to them.
pub fn quoted_names(keys: &[GroupByKey]) -> Vec<String> {
    keys.iter()
        .map(|g| Dialect::ClickHouse.quote_identifier(g.name()))
        .collect()
}

// =============================================================================
// Expressions
// =============================================================================

/// `quantilesDDMerge` over the stored sketches, for percentiles of
/// exponential histograms.
pub fn sketch_quantile_column(agg: &MetricAggregation) -> Option<String> {
    if agg.metric_type != MetricType::ExponentialHistogram {
        return None;
    }
    agg.space_aggregation
        .percentile()
        .map(|q| format!("quantilesDDMerge(0.01, {:.6})(sketch)[1]", q))
}

/// Step bucket of a sample: `toStartOfInterval(...) AS ts`.
pub fn bucket_expr(step_secs: u64) -> String {
    format!(
        "toStartOfInterval(toDateTime(intDiv(unix_milli, 1000)), toIntervalSecond({})) AS ts",
        step_secs
    )
}

/// Per-second rate between consecutive buckets. A drop means the counter
/// reset, and the current value is taken as the increase since the reset.
pub fn rate_expr(start: u64) -> String {
    let prev_value = "lagInFrame(per_series_value, 1, 0) OVER rate_window";
    let prev_ts = format!(
        "lagInFrame(ts, 1, toDateTime(fromUnixTimestamp64Milli({}))) OVER rate_window",
        start
    );
    format!(
        "If((per_series_value - {pv}) < 0, per_series_value / (ts - {pt}), (per_series_value - {pv}) / (ts - {pt}))",
        pv = prev_value,
        pt = prev_ts
    )
}

/// Increase between consecutive buckets, with the same reset handling as
/// [`rate_expr`].
pub fn increase_expr(start: u64) -> String {
    let prev_value = "lagInFrame(per_series_value, 1, 0) OVER rate_window";
    let prev_ts = format!(
        "lagInFrame(ts, 1, toDateTime(fromUnixTimestamp64Milli({}))) OVER rate_window",
        start
    );
    format!(
        "If((per_series_value - {pv}) < 0, per_series_value, ((per_series_value - {pv}) / (ts - {pt})) * (ts - {pt}))",
        pv = prev_value,
        pt = prev_ts
    )
}

// =============================================================================
// CTE stages
// =============================================================================

/// Where samples come from and how they are filtered.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplesSource {
    /// `db.table AS points`
    pub table: String,
    pub aggregation_column: String,
    /// Series filter joined on fingerprint.
    pub join: Option<Fragment>,
    /// Select items for the group-by dimensions.
    pub group_columns: Vec<String>,
    /// Predicates after the metric and time conditions.
    pub predicates: Vec<Fragment>,
    /// Interpolate the first bucket of counter rates.
    pub interpolation: bool,
}

impl SamplesSource {
    fn select(&self, ctx: &PlanContext, start: u64, end: u64) -> SelectBuilder {
        let mut sb = SelectBuilder::new().from(self.table.clone());
        if let Some(join) = &self.join {
            sb = sb.inner_join(
                join.clone(),
                "points.fingerprint = filtered_time_series.fingerprint",
            );
        }
        sb = sb
            .where_(Cond::in_list(
                "metric_name",
                vec![ctx.aggregation.metric_name.as_str().into()],
            ))
            .where_(Cond::gte("unix_milli", start))
            .where_(Cond::lt("unix_milli", end));
        for p in &self.predicates {
            sb = sb.where_(p.clone());
        }
        sb
    }
}

/// Single-stage plan for delta aggregations that commute.
pub fn fast_path_cte(ctx: &PlanContext, source: &SamplesSource, start: u64, end: u64) -> Cte {
    let value = if sketch_quantile_column(&ctx.aggregation).is_some() {
        source.aggregation_column.clone()
    } else {
        per_step(ctx, &source.aggregation_column)
    };

    let body = source
        .select(ctx, start, end)
        .column(bucket_expr(ctx.step_secs))
        .select(source.group_columns.iter().cloned())
        .column(format!("{} AS value", value))
        .group_by(["ts".to_string()])
        .group_by(ctx.group_names())
        .build();
    Cte::new(SPATIAL_CTE, body)
}

/// Delta rates divide the bucket total by the step.
fn per_step(ctx: &PlanContext, column: &str) -> String {
    if ctx.aggregation.time_aggregation == TimeAggregation::Rate {
        format!("{}/{}", column, ctx.step_secs)
    } else {
        column.to_string()
    }
}

/// Per-series value for every step bucket.
pub fn temporal_cte(ctx: &PlanContext, source: &SamplesSource, start: u64, end: u64) -> Cte {
    let agg = &ctx.aggregation;
    let column = if agg.temporality == Temporality::Delta {
        per_step(ctx, &source.aggregation_column)
    } else {
        source.aggregation_column.clone()
    };

    let inner = source
        .select(ctx, start, end)
        .column("fingerprint")
        .column(bucket_expr(ctx.step_secs))
        .select(source.group_columns.iter().cloned())
        .column(format!("{} AS per_series_value", column))
        .group_by(["fingerprint".to_string(), "ts".to_string()])
        .group_by(ctx.group_names())
        .order_by(["fingerprint", "ts"])
        .build();

    if agg.temporality == Temporality::Delta || !agg.time_aggregation.is_rate_or_increase() {
        return Cte::new(TEMPORAL_CTE, inner);
    }

    let expr = match (agg.time_aggregation, source.interpolation) {
        (TimeAggregation::Rate, false) => rate_expr(start),
        (TimeAggregation::Rate, true) => RATE_WITH_INTERPOLATION.to_string(),
        (_, false) => increase_expr(start),
        (_, true) => INCREASE_WITH_INTERPOLATION.to_string(),
    };

    let wrapped = SelectBuilder::new()
        .column("ts")
        .select(ctx.group_names())
        .column(format!("{} AS per_series_value", expr))
        .from_fragment(inner.wrap("(", ")"))
        .window("rate_window", RATE_WINDOW)
        .build();
    Cte::new(TEMPORAL_CTE, wrapped)
}

/// Fold series into the group-by dimensions.
pub fn spatial_cte(ctx: &PlanContext) -> BuildResult<Cte> {
    let func = ctx.aggregation.space_aggregation.function_name().ok_or_else(|| {
        QueryBuildError::invalid("space aggregation is required")
    })?;

    let mut sb = SelectBuilder::new()
        .column("ts")
        .select(ctx.group_names())
        .column(format!("{}(per_series_value) AS value", func))
        .from(TEMPORAL_CTE)
        .where_(Cond::eq("isNaN(per_series_value)", 0i64));
    if let Some(filter) = &ctx.aggregation.value_filter {
        sb = sb.where_(Cond::eq("per_series_value", filter.value));
    }
    let body = sb
        .group_by(["ts".to_string()])
        .group_by(ctx.group_names())
        .build();
    Ok(Cte::new(SPATIAL_CTE, body))
}

/// Final projection over the CTE chain.
///
/// The HAVING condition filters grouped quantiles, or plain rows of the
/// spatial CTE through WHERE.
pub fn final_select(ctx: &PlanContext, ctes: &[Cte], warnings: Vec<String>) -> Statement {
    let last = match ctx.histogram_quantile {
        Some(q) => {
            let dims = quoted_names(&ctx.final_group_by);
            SelectBuilder::new()
                .column("ts")
                .select(dims.iter().cloned())
                .column(format!(
                    "histogramQuantile(arrayMap(x -> toFloat64(x), groupArray(le)), groupArray(value), {:.3}) AS value",
                    q
                ))
                .from(SPATIAL_CTE)
                .group_by(dims)
                .group_by(["ts".to_string()])
                .having(ctx.having.clone().unwrap_or_default())
                .build()
        }
        None => {
            let mut sb = SelectBuilder::new().from(SPATIAL_CTE);
            if let Some(having) = &ctx.having {
                sb = sb.where_(Fragment::raw(having.clone()));
            }
            sb.build()
        }
    };

    let combined = combine_ctes(ctes, last);
    Statement {
        query: combined.sql,
        args: combined.args,
        warnings,
    }
}
