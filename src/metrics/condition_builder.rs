//! Filter conditions over metric series columns.

use super::field_mapper::{is_intrinsic, LABELS_COLUMN};
use crate::error::{BuildResult, QueryBuildError};
use crate::sql::{Arg, Cond, Dialect, Fragment, SqlDialect};
use crate::types::{
    ConditionBuilder, FieldContext, FieldKey, FieldMapper, FilterOperator, FilterValue,
};

/// Builds conditions through a field mapper.
///
/// Label values are stored as strings, so every value compared against a
/// label column is bound as a string.
#[derive(Debug, Clone, Default)]
pub struct MetricsConditionBuilder<M> {
    field_mapper: M,
}

impl<M: FieldMapper> MetricsConditionBuilder<M> {
    pub fn new(field_mapper: M) -> Self {
        Self { field_mapper }
    }
}

fn reads_labels(key: &FieldKey) -> bool {
    key.field_context != FieldContext::Metric && !is_intrinsic(&key.name)
}

fn label_value(arg: Arg) -> Arg {
    match arg {
        Arg::String(_) => arg,
        Arg::Bool(b) => Arg::String(b.to_string()),
        Arg::UInt(u) => Arg::String(u.to_string()),
        Arg::Int(i) => Arg::String(i.to_string()),
        Arg::Float(x) => Arg::String(x.to_string()),
    }
}

fn scalar(op: FilterOperator, value: &FilterValue) -> BuildResult<Arg> {
    match value {
        FilterValue::Scalar(arg) => Ok(arg.clone()),
        FilterValue::List(items) if items.len() == 1 => Ok(items[0].clone()),
        _ => Err(QueryBuildError::MalformedValues {
            operator: op.as_str().to_string(),
            message: "expected a single value".into(),
        }),
    }
}

/// IN and NOT IN both report as `in`.
fn list(value: &FilterValue) -> BuildResult<Vec<Arg>> {
    match value {
        FilterValue::List(items) if !items.is_empty() => Ok(items.clone()),
        _ => Err(QueryBuildError::MalformedValues {
            operator: FilterOperator::In.as_str().to_string(),
            message: "expected in values".into(),
        }),
    }
}

fn pair(op: FilterOperator, value: &FilterValue) -> BuildResult<(Arg, Arg)> {
    match value {
        FilterValue::List(items) if items.len() == 2 => Ok((items[0].clone(), items[1].clone())),
        _ => Err(QueryBuildError::MalformedValues {
            operator: op.as_str().to_string(),
            message: "expected between values".into(),
        }),
    }
}

fn contains_pattern(arg: Arg) -> Arg {
    match label_value(arg) {
        Arg::String(s) => Arg::String(format!("%{}%", s)),
        other => other,
    }
}

impl<M: FieldMapper> ConditionBuilder for MetricsConditionBuilder<M> {
    fn condition_for(
        &self,
        key: &FieldKey,
        op: FilterOperator,
        value: &FilterValue,
    ) -> BuildResult<Fragment> {
        if matches!(op, FilterOperator::Exists | FilterOperator::NotExists) {
            // Intrinsic columns are populated on every row
            if key.field_context == FieldContext::Metric || is_intrinsic(&key.name) {
                return Ok(Fragment::raw("true"));
            }
            let has = format!(
                "has(JSONExtractKeys({}), {})",
                LABELS_COLUMN,
                Dialect::ClickHouse.quote_string(&key.name)
            );
            return Ok(match op {
                FilterOperator::Exists => Fragment::raw(has),
                _ => Fragment::raw(format!("NOT {}", has)),
            });
        }

        let column = self.field_mapper.field_for(key)?;
        let labels = reads_labels(key);
        let bind = |arg: Arg| if labels { label_value(arg) } else { arg };
        let f = column.as_str();

        let frag = match op {
            FilterOperator::Equal => Cond::eq(f, bind(scalar(op, value)?)),
            FilterOperator::NotEqual => Cond::ne(f, bind(scalar(op, value)?)),
            FilterOperator::GreaterThan => Cond::gt(f, bind(scalar(op, value)?)),
            FilterOperator::GreaterThanOrEq => Cond::gte(f, bind(scalar(op, value)?)),
            FilterOperator::LessThan => Cond::lt(f, bind(scalar(op, value)?)),
            FilterOperator::LessThanOrEq => Cond::lte(f, bind(scalar(op, value)?)),

            FilterOperator::Like => Cond::like(f, bind(scalar(op, value)?)),
            FilterOperator::NotLike => Cond::not_like(f, bind(scalar(op, value)?)),
            FilterOperator::ILike => Cond::ilike(f, bind(scalar(op, value)?)),
            FilterOperator::NotILike => Cond::not_ilike(f, bind(scalar(op, value)?)),
            FilterOperator::Contains => Cond::ilike(f, contains_pattern(scalar(op, value)?)),
            FilterOperator::NotContains => {
                Cond::not_ilike(f, contains_pattern(scalar(op, value)?))
            }

            FilterOperator::Regexp => {
                Fragment::new(format!("match({}, ?)", f), vec![bind(scalar(op, value)?)])
            }
            FilterOperator::NotRegexp => {
                Fragment::new(format!("NOT match({}, ?)", f), vec![bind(scalar(op, value)?)])
            }

            FilterOperator::Between => {
                let (low, high) = pair(op, value)?;
                Cond::between(f, bind(low), bind(high))
            }
            FilterOperator::NotBetween => {
                let (low, high) = pair(op, value)?;
                Cond::not_between(f, bind(low), bind(high))
            }

            FilterOperator::In => Cond::or(
                list(value)?
                    .into_iter()
                    .map(|v| Cond::eq(f, bind(v)))
                    .collect(),
            ),
            FilterOperator::NotIn => Cond::and(
                list(value)?
                    .into_iter()
                    .map(|v| Cond::ne(f, bind(v)))
                    .collect(),
            ),

            FilterOperator::Exists | FilterOperator::NotExists | FilterOperator::Unknown => {
                return Err(QueryBuildError::UnsupportedOperator(op.to_string()))
            }
        };
        Ok(frag)
    }
}
