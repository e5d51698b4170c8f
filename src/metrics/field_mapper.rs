//! Logical field to physical column mapping for metric tables.

use crate::error::{BuildResult, QueryBuildError};
use crate::sql::{Dialect, SqlDialect};
use crate::types::{FieldContext, FieldKey, FieldMapper, KeyMap};

/// Columns every series row carries.
const INTRINSIC_COLUMNS: &[&str] = &[
    "metric_name",
    "type",
    "temporality",
    "is_monotonic",
    "__normalized",
];

/// Label column all resource, scope and attribute fields are read from.
pub const LABELS_COLUMN: &str = "labels";

/// Whether a field name is an intrinsic column.
pub fn is_intrinsic(name: &str) -> bool {
    INTRINSIC_COLUMNS.contains(&name)
}

/// `JSONExtractString(labels, '<name>')`
pub fn label_expr(name: &str) -> String {
    format!(
        "JSONExtractString({}, {})",
        LABELS_COLUMN,
        Dialect::ClickHouse.quote_string(name)
    )
}

/// Field mapper for the metrics and meter schemas.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsFieldMapper;

impl MetricsFieldMapper {
    pub fn new() -> Self {
        Self
    }
}

impl FieldMapper for MetricsFieldMapper {
    fn field_for(&self, key: &FieldKey) -> BuildResult<String> {
        match key.field_context {
            FieldContext::Metric => {
                if is_intrinsic(&key.name) {
                    Ok(key.name.clone())
                } else {
                    Err(QueryBuildError::ColumnNotFound(key.name.clone()))
                }
            }
            FieldContext::Resource | FieldContext::Scope | FieldContext::Attribute => {
                Ok(label_expr(&key.name))
            }
            FieldContext::Unspecified => {
                if is_intrinsic(&key.name) {
                    Ok(key.name.clone())
                } else {
                    Ok(label_expr(&key.name))
                }
            }
        }
    }

    fn column_expression_for(&self, key: &FieldKey, keys: &KeyMap) -> BuildResult<String> {
        let expr = match self.field_for(key) {
            Ok(expr) => expr,
            Err(QueryBuildError::ColumnNotFound(name)) => {
                // The key may exist under another context
                match keys.get(&name).and_then(|found| found.first()) {
                    Some(found) => self.field_for(found)?,
                    None => return Err(QueryBuildError::ColumnNotFound(name)),
                }
            }
            Err(e) => return Err(e),
        };
        Ok(format!(
            "{} AS {}",
            expr,
            Dialect::ClickHouse.quote_identifier(&key.name)
        ))
    }
}
