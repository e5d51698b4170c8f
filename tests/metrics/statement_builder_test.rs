//! Integration tests for the metric statement builder.
//!
//! The window below is 2025-05-22 00:00:45 to 2025-05-23 00:00:45 UTC with a
//! 30 second step, filtered to one service and grouped by service name.

use std::sync::Arc;

use metricq::metadata::InMemoryMetadataStore;
use metricq::metrics::{MetricStatementBuilder, MetricsConditionBuilder, MetricsFieldMapper};
use metricq::sql::Arg;
use metricq::types::{
    FieldContext, FieldKey, GroupByKey, MetricAggregation, MetricType, Query, SpaceAggregation,
    Temporality, TimeAggregation, Variables,
};
use metricq::QueryBuildError;

const START: u64 = 1_747_872_045_000;
const END: u64 = 1_747_958_445_000;

fn store() -> InMemoryMetadataStore {
    InMemoryMetadataStore::new().with_key(
        FieldKey::new("service.name").with_context(FieldContext::Resource),
        None,
    )
}

fn builder(store: InMemoryMetadataStore) -> MetricStatementBuilder {
    MetricStatementBuilder::new(
        Arc::new(store),
        Arc::new(MetricsFieldMapper),
        Arc::new(MetricsConditionBuilder::new(MetricsFieldMapper)),
    )
}

fn calls_query(temporality: Temporality) -> Query {
    Query::new(
        30,
        MetricAggregation::new("signoz_calls_total")
            .with_type(MetricType::Sum)
            .with_temporality(temporality)
            .with_time_aggregation(TimeAggregation::Rate)
            .with_space_aggregation(SpaceAggregation::Sum),
    )
    .with_filter("service.name = 'cartservice'")
    .with_group_by(GroupByKey::new("service.name"))
}

const SERIES_FILTER: &str = concat!(
    "(SELECT fingerprint, JSONExtractString(labels, 'service.name') AS `service.name` ",
    "FROM signoz_metrics.distributed_time_series_v4_1day ",
    "WHERE metric_name IN (?) AND unix_milli >= ? AND unix_milli <= ? ",
    "AND LOWER(temporality) LIKE LOWER(?) AND __normalized = ? ",
    "AND JSONExtractString(labels, 'service.name') = ? ",
    "GROUP BY fingerprint, `service.name`) AS filtered_time_series"
);

// ============================================================================
// Golden Statements
// ============================================================================

#[tokio::test]
async fn test_cumulative_rate_sum() {
    let stmt = builder(store())
        .build(START, END, &calls_query(Temporality::Cumulative), &Variables::new())
        .await
        .unwrap();

    let prev_ts = "lagInFrame(ts, 1, toDateTime(fromUnixTimestamp64Milli(1747872000000))) OVER rate_window";
    let prev_value = "lagInFrame(per_series_value, 1, 0) OVER rate_window";
    let rate = format!(
        "If((per_series_value - {pv}) < 0, per_series_value / (ts - {pt}), (per_series_value - {pv}) / (ts - {pt}))",
        pv = prev_value,
        pt = prev_ts
    );
    let expected = format!(
        concat!(
            "WITH __temporal_aggregation_cte AS (",
            "SELECT ts, `service.name`, {rate} AS per_series_value FROM (",
            "SELECT fingerprint, toStartOfInterval(toDateTime(intDiv(unix_milli, 1000)), toIntervalSecond(30)) AS ts, ",
            "`service.name`, max(value) AS per_series_value ",
            "FROM signoz_metrics.distributed_samples_v4 AS points ",
            "INNER JOIN {series} ON points.fingerprint = filtered_time_series.fingerprint ",
            "WHERE metric_name IN (?) AND unix_milli >= ? AND unix_milli < ? ",
            "GROUP BY fingerprint, ts, `service.name` ORDER BY fingerprint, ts",
            ") WINDOW rate_window AS (PARTITION BY fingerprint ORDER BY fingerprint, ts)), ",
            "__spatial_aggregation_cte AS (",
            "SELECT ts, `service.name`, sum(per_series_value) AS value ",
            "FROM __temporal_aggregation_cte WHERE isNaN(per_series_value) = ? ",
            "GROUP BY ts, `service.name`) ",
            "SELECT * FROM __spatial_aggregation_cte"
        ),
        rate = rate,
        series = SERIES_FILTER
    );
    assert_eq!(stmt.query, expected);

    insta::assert_snapshot!(
        serde_json::to_string(&stmt.args).unwrap(),
        @r#"["signoz_calls_total",1747872000000,1747958430000,"cumulative",false,"cartservice","signoz_calls_total",1747872000000,1747958430000,0]"#
    );
    assert_eq!(stmt.args[9], Arg::Int(0));
    assert!(stmt.warnings.is_empty());
}

#[tokio::test]
async fn test_delta_rate_sum_fast_path() {
    let stmt = builder(store())
        .build(START, END, &calls_query(Temporality::Delta), &Variables::new())
        .await
        .unwrap();

    let expected = format!(
        concat!(
            "WITH __spatial_aggregation_cte AS (",
            "SELECT toStartOfInterval(toDateTime(intDiv(unix_milli, 1000)), toIntervalSecond(30)) AS ts, ",
            "`service.name`, sum(value)/30 AS value ",
            "FROM signoz_metrics.distributed_samples_v4 AS points ",
            "INNER JOIN {series} ON points.fingerprint = filtered_time_series.fingerprint ",
            "WHERE metric_name IN (?) AND unix_milli >= ? AND unix_milli < ? ",
            "GROUP BY ts, `service.name`) ",
            "SELECT * FROM __spatial_aggregation_cte"
        ),
        series = SERIES_FILTER
    );
    assert_eq!(stmt.query, expected);
    assert_eq!(
        stmt.args,
        vec![
            Arg::from("signoz_calls_total"),
            Arg::UInt(1_747_872_000_000),
            Arg::UInt(1_747_958_430_000),
            Arg::from("delta"),
            Arg::Bool(false),
            Arg::from("cartservice"),
            Arg::from("signoz_calls_total"),
            Arg::UInt(1_747_872_030_000),
            Arg::UInt(1_747_958_430_000),
        ]
    );
}

#[tokio::test]
async fn test_placeholders_match_args() {
    let b = builder(store());
    for temporality in [Temporality::Cumulative, Temporality::Delta, Temporality::Unspecified] {
        let stmt = b
            .build(START, END, &calls_query(temporality), &Variables::new())
            .await
            .unwrap();
        assert_eq!(
            stmt.query.matches('?').count(),
            stmt.args.len(),
            "placeholder count for {:?}",
            temporality
        );
    }
}

#[tokio::test]
async fn test_context_prefixed_group_by() {
    let b = builder(store());
    let plain = b
        .build(START, END, &calls_query(Temporality::Cumulative), &Variables::new())
        .await
        .unwrap();

    let mut query = calls_query(Temporality::Cumulative);
    query.group_by = vec![GroupByKey::new("resource.service.name")];
    let prefixed = b.build(START, END, &query, &Variables::new()).await.unwrap();

    assert!(!prefixed.query.contains("resource.service.name"));
    assert_eq!(prefixed.query, plain.query);
    assert_eq!(prefixed.args, plain.args);
}

// ============================================================================
// Histogram Percentiles
// ============================================================================

fn latency_query(space: SpaceAggregation) -> Query {
    Query::new(
        60,
        MetricAggregation::new("signoz_latency_bucket")
            .with_type(MetricType::Histogram)
            .with_temporality(Temporality::Cumulative)
            .with_space_aggregation(space),
    )
    .with_group_by(GroupByKey::new("service.name"))
}

#[tokio::test]
async fn test_histogram_p95() {
    let query = latency_query(SpaceAggregation::P95);
    let before = query.clone();

    let stmt = builder(store())
        .build(START, END, &query, &Variables::new())
        .await
        .unwrap();

    assert_eq!(query, before, "build must not modify the query");
    assert!(stmt
        .query
        .contains("JSONExtractString(labels, 'le') AS `le`"));
    assert!(stmt.query.contains("GROUP BY fingerprint, `service.name`, `le`"));
    assert!(stmt.query.contains("max(value) AS per_series_value"));
    assert!(stmt.query.contains("sum(per_series_value) AS value"));
    assert!(stmt.query.contains("GROUP BY ts, `service.name`, `le`"));
    assert!(stmt.query.ends_with(concat!(
        "SELECT ts, `service.name`, ",
        "histogramQuantile(arrayMap(x -> toFloat64(x), groupArray(le)), groupArray(value), 0.950) AS value ",
        "FROM __spatial_aggregation_cte GROUP BY `service.name`, ts"
    )));
}

#[tokio::test]
async fn test_histogram_quantile_precision() {
    let stmt = builder(store())
        .build(START, END, &latency_query(SpaceAggregation::P50), &Variables::new())
        .await
        .unwrap();
    assert!(stmt.query.contains("groupArray(value), 0.500) AS value"));
}

#[tokio::test]
async fn test_exp_hist_percentile_uses_sketch_merge() {
    let query = Query::new(
        60,
        MetricAggregation::new("signoz_latency")
            .with_type(MetricType::ExponentialHistogram)
            .with_temporality(Temporality::Delta)
            .with_space_aggregation(SpaceAggregation::P99),
    );
    let stmt = builder(store())
        .build(START, END, &query, &Variables::new())
        .await
        .unwrap();
    assert!(stmt
        .query
        .contains("quantilesDDMerge(0.01, 0.990000)(sketch)[1] AS value"));
    assert!(stmt.query.contains("FROM signoz_metrics.distributed_exp_hist AS points"));
    assert!(!stmt.query.contains("histogramQuantile"));
    assert!(!stmt.query.contains("__temporal_aggregation_cte"));
}

// ============================================================================
// Having
// ============================================================================

#[tokio::test]
async fn test_having_filters_plain_rows() {
    let query = calls_query(Temporality::Cumulative).with_having("sum(rate(signoz_calls_total)) > 10");
    let stmt = builder(store())
        .build(START, END, &query, &Variables::new())
        .await
        .unwrap();
    assert!(stmt
        .query
        .ends_with("SELECT * FROM __spatial_aggregation_cte WHERE value > 10"));
    assert_eq!(stmt.query.matches('?').count(), stmt.args.len());
}

#[tokio::test]
async fn test_having_on_histogram_quantile() {
    let query = latency_query(SpaceAggregation::P95).with_having("__result >= 0.25");
    let stmt = builder(store())
        .build(START, END, &query, &Variables::new())
        .await
        .unwrap();
    assert!(stmt.query.ends_with(
        "FROM __spatial_aggregation_cte GROUP BY `service.name`, ts HAVING value >= 0.25"
    ));
}

#[tokio::test]
async fn test_having_with_unknown_reference() {
    let query = calls_query(Temporality::Cumulative).with_having("signoz_other_total > 10");
    let err = builder(store())
        .build(START, END, &query, &Variables::new())
        .await
        .unwrap_err();
    assert!(matches!(err, QueryBuildError::InvalidInput(ref m) if m.starts_with("Invalid references in `Having` expression: [signoz_other_total]")));
}

// ============================================================================
// Filters and Warnings
// ============================================================================

#[tokio::test]
async fn test_ambiguous_key_prefers_resource_and_warns() {
    let store = store().with_key(
        FieldKey::new("service.name").with_context(FieldContext::Attribute),
        None,
    );
    let stmt = builder(store)
        .build(START, END, &calls_query(Temporality::Cumulative), &Variables::new())
        .await
        .unwrap();

    assert_eq!(stmt.warnings.len(), 1);
    assert!(stmt.warnings[0].starts_with("Key `service.name` is ambiguous"));
    assert!(stmt.warnings[0].contains("Using `resource` context by default"));
    assert_eq!(
        stmt.query
            .matches("JSONExtractString(labels, 'service.name') = ?")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_unknown_filter_key() {
    let query = calls_query(Temporality::Cumulative).with_filter("k8s.pod.name = 'a'");
    let err = builder(store())
        .build(START, END, &query, &Variables::new())
        .await
        .unwrap_err();
    assert_eq!(err, QueryBuildError::KeyNotFound("k8s.pod.name".into()));
}

#[tokio::test]
async fn test_filter_syntax_error() {
    let query = calls_query(Temporality::Cumulative).with_filter("service.name = ");
    let err = builder(store())
        .build(START, END, &query, &Variables::new())
        .await
        .unwrap_err();
    assert!(matches!(err, QueryBuildError::InvalidInput(ref m) if m.starts_with("failed to parse filter expression")));
}

#[tokio::test]
async fn test_value_filter_bound_after_nan_check() {
    let mut query = calls_query(Temporality::Cumulative);
    query.aggregations[0].value_filter = Some(metricq::types::ValueFilter { value: 1.5 });
    let stmt = builder(store())
        .build(START, END, &query, &Variables::new())
        .await
        .unwrap();
    assert!(stmt
        .query
        .contains("WHERE isNaN(per_series_value) = ? AND per_series_value = ?"));
    assert_eq!(stmt.args.last(), Some(&Arg::Float(1.5)));
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_rejects_bad_queries() {
    let b = builder(store());
    let vars = Variables::new();

    let err = b
        .build(END, START, &calls_query(Temporality::Delta), &vars)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryBuildError::InvalidInput(_)));

    let mut no_metric = calls_query(Temporality::Delta);
    no_metric.aggregations[0].metric_name = String::new();
    assert!(b.build(START, END, &no_metric, &vars).await.is_err());

    let mut two = calls_query(Temporality::Delta);
    two.aggregations.push(two.aggregations[0].clone());
    assert!(b.build(START, END, &two, &vars).await.is_err());

    let mut no_space = calls_query(Temporality::Delta);
    no_space.aggregations[0].space_aggregation = SpaceAggregation::Unspecified;
    assert!(b.build(START, END, &no_space, &vars).await.is_err());

    let mut huge_step = calls_query(Temporality::Cumulative);
    huge_step.step_interval = u64::MAX / 10;
    let err = b.build(START, END, &huge_step, &vars).await.unwrap_err();
    assert!(matches!(err, QueryBuildError::InvalidInput(ref m) if m.contains("too large")));
}

#[test]
fn test_build_with_keys_is_sync() {
    let b = builder(InMemoryMetadataStore::new());
    let mut keys = metricq::types::KeyMap::new();
    keys.insert(
        "service.name".into(),
        vec![FieldKey::new("service.name").with_context(FieldContext::Resource)],
    );
    let stmt = b
        .build_with_keys(
            START,
            END,
            &calls_query(Temporality::Delta),
            &keys,
            &Variables::new(),
        )
        .unwrap();
    assert!(stmt.query.starts_with("WITH __spatial_aggregation_cte AS ("));
    assert_eq!(stmt.args.len(), 9);
}
