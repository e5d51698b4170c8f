//! Query builder - construct SELECT statements with a fluent API.
//!
//! Builders keep placeholder arguments next to the text that owns them so the
//! final argument list always follows the placeholder order of the rendered
//! SQL: FROM, JOIN, WHERE. HAVING text carries no placeholders.

use super::cond::Fragment;
use super::dialect::Dialect;
use super::token::{Token, TokenStream};

// =============================================================================
// Join
// =============================================================================

/// `INNER JOIN <source> ON <on>`
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub source: Fragment,
    pub on: String,
}

impl Join {
    fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Inner)
            .space()
            .push(Token::Join)
            .space()
            .push(Token::Raw(self.source.sql.clone()))
            .space()
            .push(Token::On)
            .space()
            .push(Token::Raw(self.on.clone()));
        ts
    }
}

// =============================================================================
// Select Builder
// =============================================================================

/// A SELECT statement under construction.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "builders have no effect until built"]
pub struct SelectBuilder {
    select: Vec<String>,
    from: Option<Fragment>,
    joins: Vec<Join>,
    wheres: Vec<Fragment>,
    group_by: Vec<String>,
    having: Option<String>,
    window: Option<(String, String)>,
    order_by: Vec<String>,
}

impl SelectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append select items.
    pub fn select<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(items.into_iter().map(Into::into));
        self
    }

    /// Append a single select item.
    pub fn column(mut self, item: impl Into<String>) -> Self {
        self.select.push(item.into());
        self
    }

    /// FROM a named table or alias.
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.from = Some(Fragment::raw(table));
        self
    }

    /// FROM a subquery or any source that carries its own arguments.
    pub fn from_fragment(mut self, source: Fragment) -> Self {
        self.from = Some(source);
        self
    }

    pub fn inner_join(mut self, source: Fragment, on: impl Into<String>) -> Self {
        self.joins.push(Join {
            source,
            on: on.into(),
        });
        self
    }

    /// Add a WHERE condition. Conditions are joined with AND in insertion order.
    pub fn where_(mut self, cond: Fragment) -> Self {
        if !cond.is_empty() {
            self.wheres.push(cond);
        }
        self
    }

    pub fn group_by<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(items.into_iter().map(Into::into));
        self
    }

    /// HAVING condition. Trusted text without placeholders.
    pub fn having(mut self, cond: impl Into<String>) -> Self {
        let cond = cond.into();
        if !cond.is_empty() {
            self.having = Some(cond);
        }
        self
    }

    /// Named window: `WINDOW <name> AS (<definition>)`.
    pub fn window(mut self, name: impl Into<String>, definition: impl Into<String>) -> Self {
        self.window = Some((name.into(), definition.into()));
        self
    }

    pub fn order_by<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by.extend(items.into_iter().map(Into::into));
        self
    }

    /// Render to SQL text and ordered arguments.
    pub fn build(&self) -> Fragment {
        let mut ts = TokenStream::new();
        let mut args = Vec::new();

        ts.push(Token::Select).space();
        if self.select.is_empty() {
            ts.push(Token::Star);
        } else {
            ts.comma_list(&self.select);
        }

        if let Some(from) = &self.from {
            ts.space()
                .push(Token::From)
                .space()
                .push(Token::Raw(from.sql.clone()));
            args.extend(from.args.iter().cloned());
        }

        for join in &self.joins {
            ts.space().append(&join.to_tokens());
            args.extend(join.source.args.iter().cloned());
        }

        if !self.wheres.is_empty() {
            let cond = Fragment::join(&self.wheres, " AND ");
            ts.space()
                .push(Token::Where)
                .space()
                .push(Token::Raw(cond.sql));
            args.extend(cond.args);
        }

        if !self.group_by.is_empty() {
            ts.space().push(Token::GroupBy).space().comma_list(&self.group_by);
        }

        if let Some(having) = &self.having {
            ts.space()
                .push(Token::Having)
                .space()
                .push(Token::Raw(having.clone()));
        }

        if let Some((name, definition)) = &self.window {
            ts.space()
                .push(Token::Window)
                .space()
                .push(Token::Raw(name.clone()))
                .space()
                .push(Token::As)
                .space()
                .lparen()
                .push(Token::Raw(definition.clone()))
                .rparen();
        }

        if !self.order_by.is_empty() {
            ts.space().push(Token::OrderBy).space().comma_list(&self.order_by);
        }

        Fragment::new(ts.serialize(Dialect::ClickHouse), args)
    }
}

// =============================================================================
// Common Table Expressions
// =============================================================================

/// A named CTE: `<name> AS (<body>)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub body: Fragment,
}

impl Cte {
    pub fn new(name: impl Into<String>, body: Fragment) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    pub fn to_fragment(&self) -> Fragment {
        let mut ts = TokenStream::new();
        ts.push(Token::Raw(self.name.clone()))
            .space()
            .push(Token::As)
            .space()
            .lparen()
            .push(Token::Raw(self.body.sql.clone()))
            .rparen();
        Fragment::new(ts.serialize(Dialect::ClickHouse), self.body.args.clone())
    }
}

/// Prefix a final statement with a `WITH` chain of CTEs.
///
/// Arguments of the CTEs come first, in chain order, then the final
/// statement's own arguments.
pub fn combine_ctes(ctes: &[Cte], last: Fragment) -> Fragment {
    if ctes.is_empty() {
        return last;
    }
    let chain: Vec<Fragment> = ctes.iter().map(Cte::to_fragment).collect();
    let head = Fragment::join(&chain, ", ");

    let mut ts = TokenStream::new();
    ts.push(Token::With)
        .space()
        .push(Token::Raw(head.sql))
        .space()
        .push(Token::Raw(last.sql));

    let mut args = head.args;
    args.extend(last.args);
    Fragment::new(ts.serialize(Dialect::ClickHouse), args)
}
