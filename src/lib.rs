//! # metricq
//!
//! Compiles declarative metric queries into tiered ClickHouse SQL statements.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        Query (aggregation, group-by, filter, step)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [metadata]
//! ┌─────────────────────────────────────────────────────────┐
//! │               Resolved field keys (KeyMap)               │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [filter + tables]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Bound predicate, samples / time-series table choice    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [pipeline]
//! ┌─────────────────────────────────────────────────────────┐
//! │  temporal CTE → spatial CTE → final SELECT (or fast path)│
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │            Statement { query, args, warnings }           │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The crate only builds statements. Executing them is up to the caller.

pub mod config;
pub mod error;
pub mod filter;
pub mod having;
pub mod metadata;
pub mod meter;
pub mod metrics;
pub mod pipeline;
pub mod sql;
pub mod types;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::error::{BuildResult, MetadataError, QueryBuildError};
    pub use crate::metadata::{InMemoryMetadataStore, MetadataStore};
    pub use crate::meter::MeterStatementBuilder;
    pub use crate::metrics::{MetricStatementBuilder, MetricsConditionBuilder, MetricsFieldMapper};
    pub use crate::sql::Arg;
    pub use crate::types::{
        FieldContext, FieldDataType, FieldKey, GroupByKey, MetricAggregation, MetricType, Query,
        Signal, SpaceAggregation, Statement, Temporality, TimeAggregation, VariableItem,
        VariableType, Variables,
    };
}

pub use error::{BuildResult, QueryBuildError};
pub use types::{Query, Statement};
