//! Seams between the statement builders and the physical schema.

use std::collections::HashMap;

use super::field::FieldKey;
use super::operator::{FilterOperator, FilterValue};
use crate::error::BuildResult;
use crate::sql::Fragment;

/// Resolved keys by name, as returned by the metadata store.
pub type KeyMap = HashMap<String, Vec<FieldKey>>;

/// Maps logical fields to physical column expressions.
pub trait FieldMapper: Send + Sync {
    /// Physical expression for a field.
    fn field_for(&self, key: &FieldKey) -> BuildResult<String>;

    /// Select item for a group-by key: ``<expr> AS `<name>` ``.
    fn column_expression_for(&self, key: &FieldKey, keys: &KeyMap) -> BuildResult<String>;
}

/// Builds boolean fragments for one field, operator and value.
pub trait ConditionBuilder: Send + Sync {
    fn condition_for(
        &self,
        key: &FieldKey,
        op: FilterOperator,
        value: &FilterValue,
    ) -> BuildResult<Fragment>;
}
