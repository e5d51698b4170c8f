//! SQL Dialect definitions and formatting rules.
//!
//! Statements are only ever rendered for ClickHouse today, but rendering
//! still goes through the `SqlDialect` trait so quoting and placeholder
//! rules live in one place:
//!
//! - Identifier quoting: `` ` `` with doubled backticks
//! - String literals: single quotes with backslash escapes
//! - Bound parameters: `?`
//!
//! # Usage
//!
//! ```ignore
//! use metricq::sql::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::ClickHouse;
//! let quoted = dialect.quote_identifier("service.name");  // `service.name`
//! ```

mod clickhouse;

pub use clickhouse::ClickHouse;

/// SQL dialect trait - defines how SQL constructs are rendered.
pub trait SqlDialect: std::fmt::Debug {
    /// Quote an identifier (column alias, table name).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    ///
    /// Default doubles embedded single quotes.
    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Marker emitted for a bound parameter.
    fn placeholder(&self) -> &'static str {
        "?"
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    #[default]
    ClickHouse,
}

impl Dialect {
    fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::ClickHouse => &ClickHouse,
        }
    }
}

impl SqlDialect for Dialect {
    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn placeholder(&self) -> &'static str {
        self.dialect().placeholder()
    }
}
