//! ClickHouse SQL dialect.
//!
//! - Backtick identifier quoting
//! - Backslash escapes inside string literals
//! - `?` placeholders bound by the driver

use super::SqlDialect;

/// ClickHouse SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct ClickHouse;

impl SqlDialect for ClickHouse {
    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}
