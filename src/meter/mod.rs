//! Meter signal: two-tier tables and the statement builder.

pub mod statement_builder;
pub mod tables;

pub use statement_builder::MeterStatementBuilder;
pub use tables::MeterTables;
