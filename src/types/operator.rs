//! Filter operators and the values they compare against.

use std::fmt;

use crate::sql::Arg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEq,
    LessThan,
    LessThanOrEq,
    Like,
    NotLike,
    ILike,
    NotILike,
    Between,
    NotBetween,
    In,
    NotIn,
    Exists,
    NotExists,
    Regexp,
    NotRegexp,
    Contains,
    NotContains,
    Unknown,
}

impl FilterOperator {
    /// Negative operators combine across multiple keys with AND, others with OR.
    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            FilterOperator::NotEqual
                | FilterOperator::NotLike
                | FilterOperator::NotILike
                | FilterOperator::NotBetween
                | FilterOperator::NotIn
                | FilterOperator::NotExists
                | FilterOperator::NotRegexp
                | FilterOperator::NotContains
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equal => "=",
            FilterOperator::NotEqual => "!=",
            FilterOperator::GreaterThan => ">",
            FilterOperator::GreaterThanOrEq => ">=",
            FilterOperator::LessThan => "<",
            FilterOperator::LessThanOrEq => "<=",
            FilterOperator::Like => "like",
            FilterOperator::NotLike => "not like",
            FilterOperator::ILike => "ilike",
            FilterOperator::NotILike => "not ilike",
            FilterOperator::Between => "between",
            FilterOperator::NotBetween => "not between",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not in",
            FilterOperator::Exists => "exists",
            FilterOperator::NotExists => "not exists",
            FilterOperator::Regexp => "regexp",
            FilterOperator::NotRegexp => "not regexp",
            FilterOperator::Contains => "contains",
            FilterOperator::NotContains => "not contains",
            FilterOperator::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// EXISTS / NOT EXISTS.
    None,
    Scalar(Arg),
    List(Vec<Arg>),
}

impl FilterValue {
    pub fn as_scalar(&self) -> Option<&Arg> {
        match self {
            FilterValue::Scalar(a) => Some(a),
            _ => None,
        }
    }
}

impl From<Arg> for FilterValue {
    fn from(a: Arg) -> Self {
        FilterValue::Scalar(a)
    }
}

impl From<Vec<Arg>> for FilterValue {
    fn from(v: Vec<Arg>) -> Self {
        FilterValue::List(v)
    }
}
