//! Integration tests for metric table tiering and the aggregation column map.

use metricq::metrics::tables::{
    aggregation_column, samples_table, time_series_table, DAY_MS, EXP_HIST_TABLE, HOUR_MS,
    SAMPLES_AGG_30M_TABLE, SAMPLES_AGG_5M_TABLE, SAMPLES_TABLE, SIX_HOURS_MS,
    TIME_SERIES_1DAY_TABLE, TIME_SERIES_1WEEK_TABLE, TIME_SERIES_6HRS_TABLE, TIME_SERIES_TABLE,
    WEEK_MS,
};
use metricq::pipeline::{column_for, SamplesTablePolicy, SamplesTier};
use metricq::types::{MetricAggregation, MetricType, TableHints, Temporality, TimeAggregation};
use metricq::QueryBuildError;

const START: u64 = 1_747_872_000_000;

// ============================================================================
// Samples Tiers
// ============================================================================

#[test]
fn test_samples_tier_boundaries() {
    let pick = |window: u64| samples_table(START, START + window, MetricType::Sum, TimeAggregation::Rate, None);

    assert_eq!(pick(HOUR_MS), SAMPLES_TABLE);
    assert_eq!(pick(DAY_MS + HOUR_MS - 1), SAMPLES_TABLE);
    assert_eq!(pick(DAY_MS + HOUR_MS), SAMPLES_AGG_5M_TABLE);
    assert_eq!(pick(WEEK_MS + HOUR_MS - 1), SAMPLES_AGG_5M_TABLE);
    assert_eq!(pick(WEEK_MS + HOUR_MS), SAMPLES_AGG_30M_TABLE);
    assert_eq!(pick(30 * DAY_MS), SAMPLES_AGG_30M_TABLE);
}

#[test]
fn test_exp_hist_and_count_distinct_ignore_window() {
    let month = START + 30 * DAY_MS;
    assert_eq!(
        samples_table(START, month, MetricType::ExponentialHistogram, TimeAggregation::Unspecified, None),
        EXP_HIST_TABLE
    );
    assert_eq!(
        samples_table(START, month, MetricType::Gauge, TimeAggregation::CountDistinct, None),
        SAMPLES_TABLE
    );
}

#[test]
fn test_samples_hint_wins() {
    let hints = TableHints {
        samples_table: Some("custom_samples".into()),
        ..Default::default()
    };
    assert_eq!(
        samples_table(START, START + HOUR_MS, MetricType::Sum, TimeAggregation::Sum, Some(&hints)),
        "custom_samples"
    );

    let empty = TableHints {
        samples_table: Some(String::new()),
        ..Default::default()
    };
    assert_eq!(
        samples_table(START, START + HOUR_MS, MetricType::Sum, TimeAggregation::Sum, Some(&empty)),
        SAMPLES_TABLE
    );
}

// ============================================================================
// Time-Series Tiers
// ============================================================================

#[test]
fn test_time_series_tier_boundaries() {
    let pick = |window: u64| time_series_table(START, START + window, None).2;

    assert_eq!(pick(SIX_HOURS_MS - 1), TIME_SERIES_TABLE);
    assert_eq!(pick(SIX_HOURS_MS), TIME_SERIES_6HRS_TABLE);
    assert_eq!(pick(DAY_MS - 1), TIME_SERIES_6HRS_TABLE);
    assert_eq!(pick(DAY_MS), TIME_SERIES_1DAY_TABLE);
    assert_eq!(pick(WEEK_MS - 1), TIME_SERIES_1DAY_TABLE);
    assert_eq!(pick(WEEK_MS), TIME_SERIES_1WEEK_TABLE);
}

#[test]
fn test_time_series_start_floors_to_bucket() {
    let start = START + 90 * 60 * 1000;

    let (s, e, table) = time_series_table(start, start + HOUR_MS, None);
    assert_eq!(table, TIME_SERIES_TABLE);
    assert_eq!(s, START + HOUR_MS);
    assert_eq!(e, start + HOUR_MS);

    let (s, _, table) = time_series_table(start, start + 2 * DAY_MS, None);
    assert_eq!(table, TIME_SERIES_1DAY_TABLE);
    assert_eq!(s, START);
}

#[test]
fn test_unknown_time_series_hint_is_not_aligned() {
    let hints = TableHints {
        time_series_table: Some("custom_series".into()),
        ..Default::default()
    };
    let start = START + 12_345;
    let (s, _, table) = time_series_table(start, start + HOUR_MS, Some(&hints));
    assert_eq!(table, "custom_series");
    assert_eq!(s, start);
}

// ============================================================================
// Aggregation Columns
// ============================================================================

#[test]
fn test_column_cells() {
    use SamplesTier::{Raw, Rollup};
    use Temporality::{Cumulative, Delta, Unknown, Unspecified};
    use TimeAggregation as T;

    let cells = [
        (Cumulative, Raw, T::Rate, Some("max(value)")),
        (Cumulative, Raw, T::Increase, Some("max(value)")),
        (Cumulative, Rollup, T::Rate, Some("max(max)")),
        (Delta, Raw, T::Rate, Some("sum(value)")),
        (Delta, Rollup, T::Increase, Some("sum(sum)")),
        (Unspecified, Raw, T::Latest, Some("anyLast(value)")),
        (Unspecified, Rollup, T::Latest, Some("anyLast(last)")),
        (Delta, Rollup, T::Avg, Some("sum(sum)/sum(count)")),
        (Delta, Rollup, T::Count, Some("sum(count)")),
        (Cumulative, Raw, T::CountDistinct, Some("countDistinct(value)")),
        (Cumulative, Rollup, T::CountDistinct, None),
        (Delta, Raw, T::Unspecified, None),
        (Unknown, Raw, T::Avg, Some("avg(value)")),
    ];
    for (temporality, tier, ta, want) in cells {
        assert_eq!(
            column_for(temporality, tier, ta),
            want,
            "cell ({:?}, {:?}, {:?})",
            temporality,
            tier,
            ta
        );
    }
}

#[test]
fn test_aggregation_column_follows_chosen_table() {
    let raw = aggregation_column(
        START,
        START + HOUR_MS,
        MetricType::Sum,
        Temporality::Delta,
        TimeAggregation::Max,
        None,
    )
    .unwrap();
    assert_eq!(raw, "max(value)");

    let rollup = aggregation_column(
        START,
        START + 3 * DAY_MS,
        MetricType::Sum,
        Temporality::Delta,
        TimeAggregation::Max,
        None,
    )
    .unwrap();
    assert_eq!(rollup, "max(max)");
}

#[test]
fn test_count_distinct_stays_on_raw_table() {
    let col = aggregation_column(
        START,
        START + 30 * DAY_MS,
        MetricType::Gauge,
        Temporality::Unspecified,
        TimeAggregation::CountDistinct,
        None,
    )
    .unwrap();
    assert_eq!(col, "countDistinct(value)");
}

#[test]
fn test_count_distinct_on_hinted_rollup_fails() {
    let hints = TableHints {
        samples_table: Some(SAMPLES_AGG_5M_TABLE.into()),
        ..Default::default()
    };
    let err = aggregation_column(
        START,
        START + HOUR_MS,
        MetricType::Gauge,
        Temporality::Unspecified,
        TimeAggregation::CountDistinct,
        Some(&hints),
    )
    .unwrap_err();
    assert!(matches!(err, QueryBuildError::InvalidInput(_)));
}

#[test]
fn test_policy_uses_sketch_for_exp_hist_percentiles() {
    let agg = MetricAggregation::new("http_latency")
        .with_type(MetricType::ExponentialHistogram)
        .with_temporality(Temporality::Delta)
        .with_space_aggregation(metricq::types::SpaceAggregation::P99);
    let policy = metricq::metrics::MetricsTables::default();
    assert_eq!(policy.database(), "signoz_metrics");
    assert_eq!(
        policy.aggregation_column(START, START + HOUR_MS, &agg).unwrap(),
        "quantilesDDMerge(0.01, 0.990000)(sketch)[1]"
    );
    assert_eq!(
        policy.samples_table(START, START + HOUR_MS, &agg),
        (EXP_HIST_TABLE.to_string(), SamplesTier::Raw)
    );
}
