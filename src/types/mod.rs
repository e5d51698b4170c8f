//! Query model shared by the metric and meter builders.

mod field;
mod mapping;
mod metric;
mod operator;
mod query;

pub use field::{
    FieldContext, FieldDataType, FieldKey, FieldKeySelector, SelectorMatchType, Signal,
};
pub use mapping::{ConditionBuilder, FieldMapper, KeyMap};
pub use metric::{
    MetricAggregation, MetricType, SpaceAggregation, TableHints, Temporality, TimeAggregation,
    ValueFilter,
};
pub use operator::{FilterOperator, FilterValue};
pub use query::{
    Filter, GroupByKey, Having, OrderBy, OrderDirection, Query, Statement, VariableItem, VariableType,
    Variables,
};
