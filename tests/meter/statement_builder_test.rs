//! Integration tests for the meter statement builder.

use std::sync::Arc;

use metricq::config::MeterSettings;
use metricq::metadata::InMemoryMetadataStore;
use metricq::meter::MeterStatementBuilder;
use metricq::metrics::{MetricsConditionBuilder, MetricsFieldMapper};
use metricq::sql::Arg;
use metricq::types::{
    FieldContext, FieldKey, GroupByKey, MetricAggregation, MetricType, Query, Signal,
    SpaceAggregation, Temporality, TimeAggregation, Variables,
};

const START: u64 = 1_747_872_000_000;
const DAY_MS: u64 = 24 * 60 * 60 * 1000;

fn builder() -> MeterStatementBuilder {
    let store = InMemoryMetadataStore::new().with_key(
        FieldKey::new("service.name").with_context(FieldContext::Resource),
        None,
    );
    MeterStatementBuilder::new(
        Arc::new(store),
        Arc::new(MetricsFieldMapper),
        Arc::new(MetricsConditionBuilder::new(MetricsFieldMapper)),
    )
}

fn span_count(temporality: Temporality, ta: TimeAggregation, sa: SpaceAggregation) -> Query {
    Query::new(
        3600,
        MetricAggregation::new("signoz.meter.span.count")
            .with_type(MetricType::Sum)
            .with_temporality(temporality)
            .with_time_aggregation(ta)
            .with_space_aggregation(sa),
    )
    .with_signal(Signal::Meter)
    .with_filter("service.name = 'cartservice'")
    .with_group_by(GroupByKey::new("service.name"))
}

#[tokio::test]
async fn test_delta_increase_sum_fast_path() {
    let query = span_count(Temporality::Delta, TimeAggregation::Increase, SpaceAggregation::Sum);
    let stmt = builder()
        .build(START, START + DAY_MS, &query, &Variables::new())
        .await
        .unwrap();

    assert_eq!(
        stmt.query,
        concat!(
            "WITH __spatial_aggregation_cte AS (",
            "SELECT toStartOfInterval(toDateTime(intDiv(unix_milli, 1000)), toIntervalSecond(3600)) AS ts, ",
            "JSONExtractString(labels, 'service.name') AS `service.name`, sum(value) AS value ",
            "FROM signoz_meter.distributed_samples AS points ",
            "WHERE metric_name IN (?) AND unix_milli >= ? AND unix_milli < ? ",
            "AND JSONExtractString(labels, 'service.name') = ? ",
            "AND LOWER(temporality) LIKE LOWER(?) ",
            "GROUP BY ts, `service.name`) ",
            "SELECT * FROM __spatial_aggregation_cte"
        )
    );
    assert_eq!(
        stmt.args,
        vec![
            Arg::from("signoz.meter.span.count"),
            Arg::UInt(START),
            Arg::UInt(START + DAY_MS),
            Arg::from("cartservice"),
            Arg::from("delta"),
        ]
    );
}

#[tokio::test]
async fn test_delta_avg_takes_two_stages() {
    let query = span_count(Temporality::Delta, TimeAggregation::Increase, SpaceAggregation::Avg);
    let stmt = builder()
        .build(START, START + DAY_MS, &query, &Variables::new())
        .await
        .unwrap();

    assert!(stmt.query.starts_with(concat!(
        "WITH __temporal_aggregation_cte AS (SELECT fingerprint, ",
        "toStartOfInterval(toDateTime(intDiv(unix_milli, 1000)), toIntervalSecond(3600)) AS ts, ",
        "JSONExtractString(labels, 'service.name') AS `service.name`, sum(value) AS per_series_value ",
        "FROM signoz_meter.distributed_samples AS points WHERE"
    )));
    assert!(stmt
        .query
        .contains("GROUP BY fingerprint, ts, `service.name` ORDER BY fingerprint, ts)"));
    assert!(stmt.query.contains("avg(per_series_value) AS value"));
    assert!(!stmt.query.contains("rate_window"));
    assert_eq!(stmt.args.last(), Some(&Arg::Int(0)));
}

#[tokio::test]
async fn test_long_window_reads_daily_rollup() {
    let query = span_count(Temporality::Delta, TimeAggregation::Increase, SpaceAggregation::Sum);
    let stmt = builder()
        .build(START, START + 60 * DAY_MS, &query, &Variables::new())
        .await
        .unwrap();
    assert!(stmt
        .query
        .contains("sum(sum) AS value FROM signoz_meter.distributed_samples_agg_1d AS points"));
}

#[tokio::test]
async fn test_cumulative_rate_uses_window() {
    let query = span_count(Temporality::Cumulative, TimeAggregation::Rate, SpaceAggregation::Sum);
    let stmt = builder()
        .build(START + 1_000, START + DAY_MS, &query, &Variables::new())
        .await
        .unwrap();
    assert!(stmt.query.contains("max(value) AS per_series_value"));
    assert!(stmt
        .query
        .contains("WINDOW rate_window AS (PARTITION BY fingerprint ORDER BY fingerprint, ts)"));
    // Rates start one step early
    assert_eq!(stmt.args[1], Arg::UInt(START - 3_600_000));
    assert!(!stmt.query.contains("CASE WHEN row_number()"));
}

#[tokio::test]
async fn test_percentile_is_not_rewritten() {
    let query = Query::new(
        3600,
        MetricAggregation::new("signoz.meter.latency")
            .with_type(MetricType::Histogram)
            .with_temporality(Temporality::Delta)
            .with_space_aggregation(SpaceAggregation::P90),
    );
    let err = builder()
        .build(START, START + DAY_MS, &query, &Variables::new())
        .await
        .unwrap_err();
    assert!(matches!(err, metricq::QueryBuildError::InvalidInput(_)));
}

#[tokio::test]
async fn test_histogram_percentile_rejected() {
    let query = Query::new(
        3600,
        MetricAggregation::new("signoz.meter.latency")
            .with_type(MetricType::Histogram)
            .with_temporality(Temporality::Cumulative)
            .with_time_aggregation(TimeAggregation::Rate)
            .with_space_aggregation(SpaceAggregation::P95),
    );
    let err = builder()
        .build(START, START + DAY_MS, &query, &Variables::new())
        .await
        .unwrap_err();
    assert!(matches!(err, metricq::QueryBuildError::InvalidInput(ref m) if m.contains("exponential histograms")));
}

#[tokio::test]
async fn test_context_prefixed_group_by() {
    let plain = span_count(Temporality::Delta, TimeAggregation::Increase, SpaceAggregation::Sum);
    let mut prefixed = plain.clone();
    prefixed.group_by = vec![GroupByKey::new("resource.service.name")];

    let b = builder();
    let want = b.build(START, START + DAY_MS, &plain, &Variables::new()).await.unwrap();
    let got = b.build(START, START + DAY_MS, &prefixed, &Variables::new()).await.unwrap();
    assert_eq!(got.query, want.query);
    assert!(got.query.contains("JSONExtractString(labels, 'service.name') AS `service.name`"));
}

#[tokio::test]
async fn test_having() {
    let query = span_count(Temporality::Delta, TimeAggregation::Increase, SpaceAggregation::Sum)
        .with_having("sum(increase(signoz.meter.span.count)) > 100");
    let stmt = builder()
        .build(START, START + DAY_MS, &query, &Variables::new())
        .await
        .unwrap();
    assert!(stmt
        .query
        .ends_with("SELECT * FROM __spatial_aggregation_cte WHERE value > 100"));
    assert_eq!(stmt.args.len(), 5);
}

#[tokio::test]
async fn test_custom_database() {
    let b = MeterStatementBuilder::with_settings(
        Arc::new(InMemoryMetadataStore::new()),
        Arc::new(MetricsFieldMapper),
        Arc::new(MetricsConditionBuilder::new(MetricsFieldMapper)),
        MeterSettings {
            database: "usage".into(),
        },
    );
    let query = Query::new(
        3600,
        MetricAggregation::new("signoz.meter.log.size")
            .with_temporality(Temporality::Delta)
            .with_time_aggregation(TimeAggregation::Sum)
            .with_space_aggregation(SpaceAggregation::Sum),
    );
    let stmt = b
        .build(START, START + DAY_MS, &query, &Variables::new())
        .await
        .unwrap();
    assert!(stmt.query.contains("FROM usage.distributed_samples AS points"));
    assert_eq!(stmt.args.len(), 4);
}
