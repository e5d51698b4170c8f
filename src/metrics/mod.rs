//! Metric signal: tables, field mapping, conditions and the statement builder.

pub mod condition_builder;
pub mod field_mapper;
pub mod statement_builder;
pub mod tables;

pub use condition_builder::MetricsConditionBuilder;
pub use field_mapper::MetricsFieldMapper;
pub use statement_builder::MetricStatementBuilder;
pub use tables::MetricsTables;
