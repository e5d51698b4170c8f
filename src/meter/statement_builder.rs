//! Statement builder for meter queries.
//!
//! Same stages as the metric builder, but samples are filtered in place: the
//! group-by columns, filter and temporality predicate apply to the samples
//! table itself rather than to a joined series filter.

use std::sync::Arc;

use crate::config::MeterSettings;
use crate::error::BuildResult;
use crate::filter::{prepare_where_clause, FilterOptions};
use crate::metadata::MetadataStore;
use crate::pipeline::{self, PlanContext, SamplesSource, SamplesTablePolicy};
use crate::sql::{Cond, Fragment};
use crate::types::{
    ConditionBuilder, FieldMapper, KeyMap, Query, Signal, Statement, Temporality, Variables,
};

use super::tables::MeterTables;

/// Compiles meter queries into ClickHouse statements.
pub struct MeterStatementBuilder {
    metadata: Arc<dyn MetadataStore>,
    field_mapper: Arc<dyn FieldMapper>,
    condition_builder: Arc<dyn ConditionBuilder>,
    tables: MeterTables,
}

impl MeterStatementBuilder {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        field_mapper: Arc<dyn FieldMapper>,
        condition_builder: Arc<dyn ConditionBuilder>,
    ) -> Self {
        Self::with_settings(
            metadata,
            field_mapper,
            condition_builder,
            MeterSettings::default(),
        )
    }

    pub fn with_settings(
        metadata: Arc<dyn MetadataStore>,
        field_mapper: Arc<dyn FieldMapper>,
        condition_builder: Arc<dyn ConditionBuilder>,
        settings: MeterSettings,
    ) -> Self {
        Self {
            metadata,
            field_mapper,
            condition_builder,
            tables: MeterTables::new(settings.database),
        }
    }

    /// Compile `query` over `[start, end]` (epoch millis).
    pub async fn build(
        &self,
        start: u64,
        end: u64,
        query: &Query,
        variables: &Variables,
    ) -> BuildResult<Statement> {
        pipeline::validate(start, end, query, false)?;

        let selectors = pipeline::key_selectors(query, Signal::Meter);
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
        pipeline::validate(start, end, query, false)?;
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
        let ctx = PlanContext::new(query)?;
        let agg = &ctx.aggregation;

        let mut predicates: Vec<Fragment> = Vec::new();
        let mut warnings = Vec::new();
        if let Some(expression) = query.filter_expression() {
            let opts = FilterOptions {
                condition_builder: self.condition_builder.as_ref(),
                field_keys: keys,
                variables,
            };
            let prepared = prepare_where_clause(expression, &opts)?;
            predicates.push(prepared.predicate);
            warnings = prepared.warnings;
        }
        if agg.temporality != Temporality::Unknown {
            predicates.push(Cond::ilike("temporality", agg.temporality.as_str()));
        }

        let group_columns = ctx
            .group_by
            .iter()
            .map(|g| self.field_mapper.column_expression_for(&g.key, keys))
            .collect::<BuildResult<Vec<_>>>()?;

        let (table, _) = self.tables.samples_table(start, end, agg);
        let source = SamplesSource {
            table: format!("{}.{} AS points", self.tables.database(), table),
            aggregation_column: self.tables.aggregation_column(start, end, agg)?,
            join: None,
            group_columns,
            predicates,
            interpolation: false,
        };

        let fast_path = ctx.can_short_circuit_delta();
        tracing::debug!(
            metric = %agg.metric_name,
            samples_table = %table,
            fast_path,
            start,
            end,
            "planning meter statement"
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
}
