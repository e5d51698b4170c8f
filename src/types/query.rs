//! Query, variables and the compiled statement.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::field::{FieldKey, Signal};
use super::metric::MetricAggregation;
use crate::sql::Arg;

/// A group-by dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GroupByKey {
    #[serde(flatten)]
    pub key: FieldKey,
}

impl GroupByKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            key: FieldKey::new(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }
}

impl From<FieldKey> for GroupByKey {
    fn from(key: FieldKey) -> Self {
        Self { key }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderBy {
    pub key: FieldKey,
    #[serde(default)]
    pub direction: OrderDirection,
}

/// Textual filter expression, e.g. `service.name = 'api' AND env IN $env`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Filter {
    pub expression: String,
}

impl Filter {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }
}

/// Condition on the aggregated value, e.g. `sum(rate(calls)) > 10`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Having {
    pub expression: String,
}

impl Having {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }
}

/// A declarative metric query. The time range is passed separately.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub name: String,
    pub signal: Signal,
    /// Bucket width in seconds.
    pub step_interval: u64,
    pub aggregations: Vec<MetricAggregation>,
    pub filter: Option<Filter>,
    pub group_by: Vec<GroupByKey>,
    pub having: Option<Having>,
    pub order: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Query {
    pub fn new(step_interval: u64, aggregation: MetricAggregation) -> Self {
        Self {
            step_interval,
            aggregations: vec![aggregation],
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, expression: impl Into<String>) -> Self {
        self.filter = Some(Filter::new(expression));
        self
    }

    pub fn with_group_by(mut self, key: impl Into<GroupByKey>) -> Self {
        self.group_by.push(key.into());
        self
    }

    pub fn with_having(mut self, expression: impl Into<String>) -> Self {
        self.having = Some(Having::new(expression));
        self
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = signal;
        self
    }

    /// HAVING expression text, if any and non-blank.
    pub fn having_expression(&self) -> Option<&str> {
        self.having
            .as_ref()
            .map(|h| h.expression.as_str())
            .filter(|e| !e.trim().is_empty())
    }

    /// Filter expression text, if any and non-blank.
    pub fn filter_expression(&self) -> Option<&str> {
        self.filter
            .as_ref()
            .map(|f| f.expression.as_str())
            .filter(|e| !e.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    #[default]
    Query,
    Custom,
    Text,
    Dynamic,
}

/// Dashboard variable value substituted into filter expressions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariableItem {
    #[serde(rename = "type", default)]
    pub variable_type: VariableType,
    pub value: serde_json::Value,
}

impl VariableItem {
    pub fn new(variable_type: VariableType, value: serde_json::Value) -> Self {
        Self {
            variable_type,
            value,
        }
    }

    /// A dynamic variable set to "all values": its comparison is dropped.
    pub fn is_all(&self) -> bool {
        self.variable_type == VariableType::Dynamic && self.value.as_str() == Some("__all__")
    }
}

/// Variables by name, without the `$` prefix.
pub type Variables = HashMap<String, VariableItem>;

/// A compiled statement ready for the driver.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Statement {
    pub query: String,
    pub args: Vec<Arg>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
