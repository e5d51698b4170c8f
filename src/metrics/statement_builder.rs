//! Statement builder for metric queries.
//!
//! # Plan shapes
//!
//! Slow path, any temporality:
//!
//! ```text
//! WITH __temporal_aggregation_cte AS (
//!        SELECT fingerprint, ts, <dims>, <col> AS per_series_value
//!        FROM samples AS points INNER JOIN (<series filter>) AS filtered_time_series ...),
//!      __spatial_aggregation_cte AS (
//!        SELECT ts, <dims>, <space>(per_series_value) AS value
//!        FROM __temporal_aggregation_cte ...)
//! SELECT * FROM __spatial_aggregation_cte
//! ```
//!
//! Fast path, delta only: a single `__spatial_aggregation_cte` that reads
//! samples directly.

use std::sync::Arc;

use crate::config::MetricsSettings;
use crate::error::BuildResult;
use crate::filter::{prepare_where_clause, FilterOptions, PreparedWhereClause};
use crate::metadata::MetadataStore;
use crate::pipeline::{self, PlanContext, SamplesSource, SamplesTablePolicy};
use crate::sql::{Cond, Fragment, SelectBuilder};
use crate::types::{
    ConditionBuilder, FieldMapper, KeyMap, Query, Signal, Statement, Temporality, Variables,
};

use super::tables::{time_series_table, MetricsTables};

/// Compiles metric queries into ClickHouse statements.
///
/// Holds no per-query state; one builder serves concurrent compilations.
pub struct MetricStatementBuilder {
    metadata: Arc<dyn MetadataStore>,
    field_mapper: Arc<dyn FieldMapper>,
    condition_builder: Arc<dyn ConditionBuilder>,
    tables: MetricsTables,
    settings: MetricsSettings,
}

impl MetricStatementBuilder {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        field_mapper: Arc<dyn FieldMapper>,
        condition_builder: Arc<dyn ConditionBuilder>,
    ) -> Self {
        Self::with_settings(
            metadata,
            field_mapper,
            condition_builder,
            MetricsSettings::default(),
        )
    }

    pub fn with_settings(
        metadata: Arc<dyn MetadataStore>,
        field_mapper: Arc<dyn FieldMapper>,
        condition_builder: Arc<dyn ConditionBuilder>,
        settings: MetricsSettings,
    ) -> Self {
        Self {
            metadata,
            field_mapper,
            condition_builder,
            tables: MetricsTables::new(settings.database.clone()),
            settings,
        }
    }

    /// Compile `query` over `[start, end]` (epoch millis).
    ///
    /// Resolves the field keys the query mentions through the metadata store,
    /// then plans. `query` is never modified.
    pub async fn build(
        &self,
        start: u64,
        end: u64,
        query: &Query,
        variables: &Variables,
    ) -> BuildResult<Statement> {
        pipeline::validate(start, end, query, true)?;

        let selectors = pipeline::key_selectors(query, Signal::Metrics);
        let keys = self.metadata.get_keys_multi(&selectors).await?;

        self.plan(start, end, query, &keys, variables)
    }

    /// Compile with keys already resolved.
    pub fn build_with_keys(
        &self,
        start: u64,
        end: u64,
        query: &Query,
        keys: &KeyMap,
        variables: &Variables,
    ) -> BuildResult<Statement> {
        pipeline::validate(start, end, query, true)?;
        self.plan(start, end, query, keys, variables)
    }

    fn plan(
        &self,
        start: u64,
        end: u64,
        query: &Query,
        keys: &KeyMap,
        variables: &Variables,
    ) -> BuildResult<Statement> {
        let (start, end) =
            pipeline::adjusted_time_range(start, end, query.step_interval, &query.aggregations[0])?;
        let ctx = PlanContext::with_percentile_rewrite(query)?;

        let filter = self.prepare_filter(query, keys, variables)?;
        let (predicate, warnings) = match filter {
            Some(PreparedWhereClause {
                predicate,
                warnings,
            }) => (Some(predicate), warnings),
            None => (None, Vec::new()),
        };

        let series = self.time_series_cte(start, end, &ctx, keys, predicate)?;

        let (table, _) = self.tables.samples_table(start, end, &ctx.aggregation);
        let source = SamplesSource {
            table: format!("{}.{} AS points", self.tables.database(), table),
            aggregation_column: self.tables.aggregation_column(start, end, &ctx.aggregation)?,
            join: Some(series),
            group_columns: pipeline::quoted_names(&ctx.group_by),
            predicates: Vec::new(),
            interpolation: self.settings.interpolation_enabled,
        };

        let fast_path = ctx.can_short_circuit_delta();
        tracing::debug!(
            metric = %ctx.aggregation.metric_name,
            samples_table = %table,
            fast_path,
            start,
            end,
            "planning metric statement"
        );

        let ctes = if fast_path {
            vec![pipeline::fast_path_cte(&ctx, &source, start, end)]
        } else {
            vec![
                pipeline::temporal_cte(&ctx, &source, start, end),
                pipeline::spatial_cte(&ctx)?,
            ]
        };

        Ok(pipeline::final_select(&ctx, &ctes, warnings))
    }

    fn prepare_filter(
        &self,
        query: &Query,
        keys: &KeyMap,
        variables: &Variables,
    ) -> BuildResult<Option<PreparedWhereClause>> {
        let Some(expression) = query.filter_expression() else {
            return Ok(None);
        };
        let opts = FilterOptions {
            condition_builder: self.condition_builder.as_ref(),
            field_keys: keys,
            variables,
        };
        prepare_where_clause(expression, &opts).map(Some)
    }

    /// Series matching the metric, temporality and filter, with their
    /// group-by dimensions.
    fn time_series_cte(
        &self,
        start: u64,
        end: u64,
        ctx: &PlanContext,
        keys: &KeyMap,
        filter: Option<Fragment>,
    ) -> BuildResult<Fragment> {
        let agg = &ctx.aggregation;
        let (start, end, table) = time_series_table(start, end, agg.table_hints.as_ref());

        let mut sb = SelectBuilder::new().column("fingerprint");
        for g in &ctx.group_by {
            sb = sb.column(self.field_mapper.column_expression_for(&g.key, keys)?);
        }

        sb = sb
            .from(format!("{}.{}", self.tables.database(), table))
            .where_(Cond::in_list(
                "metric_name",
                vec![agg.metric_name.as_str().into()],
            ))
            .where_(Cond::gte("unix_milli", start))
            .where_(Cond::lte("unix_milli", end));
        if agg.temporality != Temporality::Unknown {
            sb = sb.where_(Cond::ilike("temporality", agg.temporality.as_str()));
        }
        sb = sb.where_(Cond::eq("__normalized", self.settings.normalized_filter));
        if let Some(filter) = filter {
            sb = sb.where_(filter);
        }

        let body = sb
            .group_by(["fingerprint".to_string()])
            .group_by(pipeline::quoted_names(&ctx.group_by))
            .build();
        Ok(body.wrap("(", ") AS filtered_time_series"))
    }
}
