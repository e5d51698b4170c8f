//! Boolean condition fragments with bound arguments.
//!
//! A `Fragment` is a piece of SQL text plus the arguments for the `?`
//! placeholders it contains, in order. Fragments compose by concatenation:
//! the args of a combined fragment are the args of its parts in text order.

use serde::Serialize;

use super::arg::Arg;
use super::dialect::Dialect;
use super::token::{Token, TokenStream};

/// SQL text plus the arguments bound to its placeholders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Fragment {
    pub sql: String,
    pub args: Vec<Arg>,
}

impl Fragment {
    pub fn new(sql: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    /// A fragment without placeholders.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, vec![])
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Number of `?` markers in the text.
    pub fn placeholder_count(&self) -> usize {
        self.sql.matches('?').count()
    }

    fn from_tokens(ts: &TokenStream, args: Vec<Arg>) -> Self {
        Self::new(ts.serialize(Dialect::ClickHouse), args)
    }

    /// Join fragments with a separator, concatenating their args.
    pub fn join(parts: &[Fragment], sep: &str) -> Fragment {
        let sql = parts
            .iter()
            .map(|p| p.sql.as_str())
            .collect::<Vec<_>>()
            .join(sep);
        let args = parts.iter().flat_map(|p| p.args.iter().cloned()).collect();
        Fragment::new(sql, args)
    }

    /// Wrap the text: `prefix<sql>suffix`.
    pub fn wrap(self, prefix: &str, suffix: &str) -> Fragment {
        Fragment::new(format!("{}{}{}", prefix, self.sql, suffix), self.args)
    }
}

/// Condition helpers rendering the comparison shapes used across statements.
pub struct Cond;

impl Cond {
    fn compare(field: &str, op: Token, value: Arg) -> Fragment {
        let mut ts = TokenStream::new();
        ts.push(Token::Raw(field.to_string()))
            .space()
            .push(op)
            .space()
            .push(Token::Placeholder);
        Fragment::from_tokens(&ts, vec![value])
    }

    /// `f = ?`
    pub fn eq(field: &str, value: impl Into<Arg>) -> Fragment {
        Self::compare(field, Token::Eq, value.into())
    }

    /// `f <> ?`
    pub fn ne(field: &str, value: impl Into<Arg>) -> Fragment {
        Self::compare(field, Token::Ne, value.into())
    }

    pub fn gt(field: &str, value: impl Into<Arg>) -> Fragment {
        Self::compare(field, Token::Gt, value.into())
    }

    pub fn gte(field: &str, value: impl Into<Arg>) -> Fragment {
        Self::compare(field, Token::Gte, value.into())
    }

    pub fn lt(field: &str, value: impl Into<Arg>) -> Fragment {
        Self::compare(field, Token::Lt, value.into())
    }

    pub fn lte(field: &str, value: impl Into<Arg>) -> Fragment {
        Self::compare(field, Token::Lte, value.into())
    }

    /// `f LIKE ?`
    pub fn like(field: &str, value: impl Into<Arg>) -> Fragment {
        Self::compare(field, Token::Like, value.into())
    }

    /// `f NOT LIKE ?`
    pub fn not_like(field: &str, value: impl Into<Arg>) -> Fragment {
        Fragment::new(format!("{} NOT LIKE ?", field), vec![value.into()])
    }

    /// `LOWER(f) LIKE LOWER(?)`
    pub fn ilike(field: &str, value: impl Into<Arg>) -> Fragment {
        Fragment::new(format!("LOWER({}) LIKE LOWER(?)", field), vec![value.into()])
    }

    /// `LOWER(f) NOT LIKE LOWER(?)`
    pub fn not_ilike(field: &str, value: impl Into<Arg>) -> Fragment {
        Fragment::new(
            format!("LOWER({}) NOT LIKE LOWER(?)", field),
            vec![value.into()],
        )
    }

    /// `f BETWEEN ? AND ?`
    pub fn between(field: &str, low: Arg, high: Arg) -> Fragment {
        let mut ts = TokenStream::new();
        ts.push(Token::Raw(field.to_string()))
            .space()
            .push(Token::Between)
            .space()
            .push(Token::Placeholder)
            .space()
            .push(Token::And)
            .space()
            .push(Token::Placeholder);
        Fragment::from_tokens(&ts, vec![low, high])
    }

    /// `f NOT BETWEEN ? AND ?`
    pub fn not_between(field: &str, low: Arg, high: Arg) -> Fragment {
        Fragment::new(format!("{} NOT BETWEEN ? AND ?", field), vec![low, high])
    }

    /// `f IN (?, ?, ...)`
    pub fn in_list(field: &str, values: Vec<Arg>) -> Fragment {
        let markers = vec!["?"; values.len()].join(", ");
        Fragment::new(format!("{} IN ({})", field, markers), values)
    }

    /// `(a AND b ...)`
    pub fn and(parts: Vec<Fragment>) -> Fragment {
        Fragment::join(&parts, " AND ").wrap("(", ")")
    }

    /// `(a OR b ...)`
    pub fn or(parts: Vec<Fragment>) -> Fragment {
        Fragment::join(&parts, " OR ").wrap("(", ")")
    }

    /// `NOT (x)`
    pub fn not(inner: Fragment) -> Fragment {
        inner.wrap("NOT (", ")")
    }
}
