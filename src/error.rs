//! Error types for statement building.
//!
//! Every failure is reported before any SQL text leaves the builder: there
//! are no partially built statements.

use thiserror::Error;

/// Result type for statement building.
pub type BuildResult<T> = Result<T, QueryBuildError>;

/// Errors from the metadata collaborator. Passed through unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetadataError {
    #[error("metadata backend error: {0}")]
    Backend(String),
}

/// Errors raised while compiling a query into a statement.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryBuildError {
    /// Malformed query, filter syntax error, or a combination with no plan.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A metric-context field with no physical column.
    #[error("column not found for field `{0}`")]
    ColumnNotFound(String),

    #[error("unsupported operator `{0}`")]
    UnsupportedOperator(String),

    /// BETWEEN needs exactly two values, IN needs a list.
    #[error("malformed values for operator `{operator}`: {message}")]
    MalformedValues { operator: String, message: String },

    /// A filter key that resolved to no known field.
    #[error("key `{0}` not found")]
    KeyNotFound(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl QueryBuildError {
    pub fn invalid(message: impl Into<String>) -> Self {
        QueryBuildError::InvalidInput(message.into())
    }
}
