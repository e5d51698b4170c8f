//! Telemetry field keys and selectors used for key resolution.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which part of a record a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldContext {
    Resource,
    Scope,
    #[serde(alias = "attr", alias = "tag")]
    Attribute,
    Metric,
    #[default]
    Unspecified,
}

impl FieldContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldContext::Resource => "resource",
            FieldContext::Scope => "scope",
            FieldContext::Attribute => "attribute",
            FieldContext::Metric => "metric",
            FieldContext::Unspecified => "",
        }
    }

    /// Parse a context prefix as written in key text.
    pub fn from_prefix(s: &str) -> Option<Self> {
        match s {
            "resource" => Some(FieldContext::Resource),
            "scope" => Some(FieldContext::Scope),
            "attribute" | "attr" | "tag" => Some(FieldContext::Attribute),
            "metric" => Some(FieldContext::Metric),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDataType {
    String,
    Bool,
    Number,
    Float64,
    Int64,
    #[default]
    Unspecified,
}

impl FieldDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldDataType::String => "string",
            FieldDataType::Bool => "bool",
            FieldDataType::Number => "number",
            FieldDataType::Float64 => "float64",
            FieldDataType::Int64 => "int64",
            FieldDataType::Unspecified => "",
        }
    }

    /// Parse a `:type` suffix.
    pub fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "string" | "str" => Some(FieldDataType::String),
            "bool" | "boolean" => Some(FieldDataType::Bool),
            "number" => Some(FieldDataType::Number),
            "float64" | "float" => Some(FieldDataType::Float64),
            "int64" | "int" => Some(FieldDataType::Int64),
            _ => None,
        }
    }
}

/// A resolved or requested field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FieldKey {
    pub name: String,
    #[serde(default)]
    pub field_context: FieldContext,
    #[serde(default)]
    pub field_data_type: FieldDataType,
}

impl FieldKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: FieldContext) -> Self {
        self.field_context = context;
        self
    }

    pub fn with_data_type(mut self, data_type: FieldDataType) -> Self {
        self.field_data_type = data_type;
        self
    }

    /// Parse key text of the form `[context.]name[:type]`.
    ///
    /// The context prefix is only recognised when something follows it,
    /// so `resource` alone is a plain name.
    pub fn parse(text: &str) -> FieldKey {
        let mut key = FieldKey::default();
        let mut rest = text.trim();

        if let Some((head, suffix)) = rest.rsplit_once(':') {
            if let Some(dt) = FieldDataType::from_suffix(suffix) {
                key.field_data_type = dt;
                rest = head;
            }
        }

        if let Some((prefix, name)) = rest.split_once('.') {
            if let Some(ctx) = FieldContext::from_prefix(prefix) {
                if !name.is_empty() {
                    key.field_context = ctx;
                    rest = name;
                }
            }
        }

        key.name = rest.to_string();
        key
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field_context {
            FieldContext::Unspecified => write!(f, "{}", self.name)?,
            ctx => write!(f, "{}.{}", ctx.as_str(), self.name)?,
        }
        if self.field_data_type != FieldDataType::Unspecified {
            write!(f, ":{}", self.field_data_type.as_str())?;
        }
        Ok(())
    }
}

/// Telemetry signal a selector is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    #[default]
    Metrics,
    Meter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorMatchType {
    #[default]
    Exact,
    Fuzzy,
}

/// A request to the metadata store for keys matching a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FieldKeySelector {
    pub name: String,
    pub signal: Signal,
    pub field_context: FieldContext,
    pub field_data_type: FieldDataType,
    pub match_type: SelectorMatchType,
    /// Restrict lookups to keys seen on this metric.
    pub metric_name: Option<String>,
}

impl FieldKeySelector {
    pub fn from_key(key: &FieldKey) -> Self {
        Self {
            name: key.name.clone(),
            field_context: key.field_context,
            field_data_type: key.field_data_type,
            ..Default::default()
        }
    }

    /// Whether `key` satisfies this selector's name, context and type filters.
    pub fn matches(&self, key: &FieldKey) -> bool {
        let name_ok = match self.match_type {
            SelectorMatchType::Exact => key.name == self.name,
            SelectorMatchType::Fuzzy => key.name.contains(&self.name),
        };
        let ctx_ok = self.field_context == FieldContext::Unspecified
            || self.field_context == key.field_context;
        let type_ok = self.field_data_type == FieldDataType::Unspecified
            || self.field_data_type == key.field_data_type;
        name_ok && ctx_ok && type_ok
    }
}
