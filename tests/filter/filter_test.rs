//! Integration tests for filter expressions compiled against metric labels.

use metricq::filter::{key_selectors, prepare_where_clause, FilterOptions, PreparedWhereClause};
use metricq::metrics::{MetricsConditionBuilder, MetricsFieldMapper};
use metricq::sql::Arg;
use metricq::types::{
    FieldContext, FieldDataType, FieldKey, KeyMap, VariableItem, VariableType, Variables,
};
use metricq::{BuildResult, QueryBuildError};
use serde_json::json;

fn keys() -> KeyMap {
    let mut keys = KeyMap::new();
    for (name, ctx) in [
        ("service.name", FieldContext::Resource),
        ("env", FieldContext::Resource),
        ("host", FieldContext::Attribute),
        ("http.status_code", FieldContext::Attribute),
    ] {
        keys.insert(name.into(), vec![FieldKey::new(name).with_context(ctx)]);
    }
    keys
}

fn compile_with(expression: &str, keys: &KeyMap, variables: &Variables) -> BuildResult<PreparedWhereClause> {
    let cb = MetricsConditionBuilder::new(MetricsFieldMapper);
    let opts = FilterOptions {
        condition_builder: &cb,
        field_keys: keys,
        variables,
    };
    prepare_where_clause(expression, &opts)
}

fn compile(expression: &str) -> BuildResult<PreparedWhereClause> {
    compile_with(expression, &keys(), &Variables::new())
}

fn vars(entries: &[(&str, VariableType, serde_json::Value)]) -> Variables {
    entries
        .iter()
        .map(|(name, ty, value)| (name.to_string(), VariableItem::new(*ty, value.clone())))
        .collect()
}

// ============================================================================
// Boolean Structure
// ============================================================================

#[test]
fn test_and_with_in_list() {
    let p = compile("service.name = 'cartservice' AND env IN ('prod', 'staging')").unwrap();
    assert_eq!(
        p.predicate.sql,
        "(JSONExtractString(labels, 'service.name') = ? AND (JSONExtractString(labels, 'env') = ? OR JSONExtractString(labels, 'env') = ?))"
    );
    assert_eq!(
        p.predicate.args,
        vec![Arg::from("cartservice"), Arg::from("prod"), Arg::from("staging")]
    );
    assert!(p.warnings.is_empty());
}

#[test]
fn test_implicit_and() {
    let p = compile("env = 'prod' host = 'a'").unwrap();
    assert_eq!(
        p.predicate.sql,
        "(JSONExtractString(labels, 'env') = ? AND JSONExtractString(labels, 'host') = ?)"
    );
}

#[test]
fn test_not_over_parenthesised_or() {
    let p = compile("NOT (env = 'a' OR env = 'b')").unwrap();
    assert_eq!(
        p.predicate.sql,
        "NOT (((JSONExtractString(labels, 'env') = ? OR JSONExtractString(labels, 'env') = ?)))"
    );
    assert_eq!(p.predicate.args.len(), 2);
}

#[test]
fn test_operators() {
    let cases = [
        ("host != 'a'", "JSONExtractString(labels, 'host') <> ?"),
        ("http.status_code >= 500", "JSONExtractString(labels, 'http.status_code') >= ?"),
        ("host NOT LIKE 'a%'", "JSONExtractString(labels, 'host') NOT LIKE ?"),
        ("host ILIKE '%Prod%'", "LOWER(JSONExtractString(labels, 'host')) LIKE LOWER(?)"),
        ("host CONTAINS 'prod'", "LOWER(JSONExtractString(labels, 'host')) LIKE LOWER(?)"),
        ("host REGEXP '^web-[0-9]+'", "match(JSONExtractString(labels, 'host'), ?)"),
        (
            "http.status_code BETWEEN 400 AND 499",
            "JSONExtractString(labels, 'http.status_code') BETWEEN ? AND ?",
        ),
        ("host EXISTS", "has(JSONExtractKeys(labels), 'host')"),
        ("host NOT EXISTS", "NOT has(JSONExtractKeys(labels), 'host')"),
    ];
    for (expression, want) in cases {
        let p = compile(expression).unwrap();
        assert_eq!(p.predicate.sql, want, "expression: {}", expression);
        assert_eq!(p.predicate.placeholder_count(), p.predicate.args.len());
    }
}

#[test]
fn test_numbers_are_bound_as_label_strings() {
    let p = compile("http.status_code BETWEEN 400 AND 499").unwrap();
    assert_eq!(p.predicate.args, vec![Arg::from("400"), Arg::from("499")]);
}

#[test]
fn test_context_prefix_selects_key() {
    let mut keys = keys();
    keys.insert(
        "service.name".into(),
        vec![
            FieldKey::new("service.name").with_context(FieldContext::Resource),
            FieldKey::new("service.name").with_context(FieldContext::Attribute),
        ],
    );
    let p = compile_with("attribute.service.name = 'x'", &keys, &Variables::new()).unwrap();
    assert_eq!(p.predicate.sql, "JSONExtractString(labels, 'service.name') = ?");
    assert!(p.warnings.is_empty());
}

// ============================================================================
// Variables
// ============================================================================

#[test]
fn test_in_with_list_variable() {
    let v = vars(&[("env", VariableType::Query, json!(["prod", "staging"]))]);
    let p = compile_with("env IN $env", &keys(), &v).unwrap();
    assert_eq!(p.predicate.args, vec![Arg::from("prod"), Arg::from("staging")]);
    assert_eq!(
        p.predicate.sql,
        "(JSONExtractString(labels, 'env') = ? OR JSONExtractString(labels, 'env') = ?)"
    );
}

#[test]
fn test_scalar_position_takes_first_element() {
    let v = vars(&[("env", VariableType::Custom, json!(["prod", "staging"]))]);
    let p = compile_with("env = $env", &keys(), &v).unwrap();
    assert_eq!(p.predicate.args, vec![Arg::from("prod")]);
}

#[test]
fn test_quoted_variable_reference() {
    let v = vars(&[("env", VariableType::Text, json!("prod"))]);
    let p = compile_with("env = '$env'", &keys(), &v).unwrap();
    assert_eq!(p.predicate.args, vec![Arg::from("prod")]);
}

#[test]
fn test_all_values_drops_comparison() {
    let v = vars(&[("env", VariableType::Dynamic, json!("__all__"))]);

    let p = compile_with("service.name = 'api' AND env IN $env", &keys(), &v).unwrap();
    assert_eq!(p.predicate.sql, "JSONExtractString(labels, 'service.name') = ?");
    assert_eq!(p.predicate.args, vec![Arg::from("api")]);

    let p = compile_with("env IN $env", &keys(), &v).unwrap();
    assert_eq!(p.predicate.sql, "true");
    assert!(p.predicate.args.is_empty());
}

#[test]
fn test_interpolation_inside_text() {
    let v = vars(&[("env", VariableType::Query, json!("prod"))]);
    let p = compile_with("host = 'web-$env-01'", &keys(), &v).unwrap();
    assert_eq!(p.predicate.args, vec![Arg::from("web-prod-01")]);

    let p = compile_with("host = 'web-$region'", &keys(), &v).unwrap();
    assert_eq!(p.predicate.args, vec![Arg::from("web-$region")]);
}

#[test]
fn test_empty_list_variable() {
    let v = vars(&[("env", VariableType::Query, json!([]))]);
    let err = compile_with("env IN $env", &keys(), &v).unwrap_err();
    match err {
        QueryBuildError::InvalidInput(message) => {
            assert!(message.starts_with("malformed request payload"), "{}", message)
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

// ============================================================================
// Warnings and Errors
// ============================================================================

#[test]
fn test_like_without_wildcards_warns() {
    let p = compile("host LIKE 'web'").unwrap();
    assert_eq!(p.warnings.len(), 1);
    assert!(p.warnings[0].starts_with("LIKE operator used without wildcards"));

    let p = compile("host ILIKE 'web'").unwrap();
    assert!(p.warnings[0].starts_with("ILIKE operator used without wildcards"));

    assert!(compile("host LIKE 'web%'").unwrap().warnings.is_empty());
}

#[test]
fn test_ambiguity_warned_once_per_key() {
    let mut keys = keys();
    keys.insert(
        "host".into(),
        vec![
            FieldKey::new("host").with_context(FieldContext::Resource),
            FieldKey::new("host").with_context(FieldContext::Attribute),
        ],
    );
    let p = compile_with("host = 'a' OR host = 'b'", &keys, &Variables::new()).unwrap();
    assert_eq!(p.warnings.len(), 1);
    assert!(p.warnings[0].contains("resource.host, attribute.host"));
}

#[test]
fn test_full_text_unsupported() {
    let err = compile("timeout").unwrap_err();
    assert_eq!(
        err,
        QueryBuildError::InvalidInput("full text search is not supported".into())
    );
}

#[test]
fn test_errors_are_collected() {
    let err = compile("missing.one = 'a' AND missing.two = 'b'").unwrap_err();
    match err {
        QueryBuildError::InvalidInput(message) => {
            assert!(message.starts_with("Found 2 errors while parsing the search expression"), "{}", message);
            assert!(message.contains("missing.one"));
            assert!(message.contains("missing.two"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_syntax_error() {
    let err = compile("env = 'a' AND (host = 'b'").unwrap_err();
    assert!(matches!(err, QueryBuildError::InvalidInput(ref m) if m.contains("failed to parse filter expression")));
}

// ============================================================================
// Key Selectors
// ============================================================================

#[test]
fn test_key_selectors() {
    let selectors = key_selectors("resource.service.name = 'x' AND attribute.code:int64 > 5 OR env EXISTS");
    assert_eq!(selectors.len(), 3);

    assert_eq!(selectors[0].name, "service.name");
    assert_eq!(selectors[0].field_context, FieldContext::Resource);

    assert_eq!(selectors[1].name, "code");
    assert_eq!(selectors[1].field_context, FieldContext::Attribute);
    assert_eq!(selectors[1].field_data_type, FieldDataType::Int64);

    assert_eq!(selectors[2].name, "env");
    assert_eq!(selectors[2].field_context, FieldContext::Unspecified);

    assert!(key_selectors("env = ").is_empty());
}
