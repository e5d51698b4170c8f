//! Recursive-descent parser for filter expressions.
//!
//! Grammar:
//!
//! ```text
//! or         := and (OR and)*
//! and        := unary (AND? unary)*          -- adjacent terms are ANDed
//! unary      := NOT unary | primary
//! primary    := '(' or ')' | comparison | fulltext
//! comparison := key op value
//!             | key [NOT] (LIKE | ILIKE | CONTAINS | REGEXP) value
//!             | key [NOT] BETWEEN value AND value
//!             | key [NOT] IN ( '(' values ')' | '[' values ']' | value )
//!             | key [NOT] EXISTS
//! value      := quoted | number | bool | bare word | $variable
//! ```

use chumsky::span::SimpleSpan;
use std::fmt;

use super::lexer::{lex, Token};
use crate::types::FilterOperator;

/// A literal on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Quoted text, escapes resolved.
    Text(String),
    /// Unquoted word, e.g. `redis` in `db.system = redis`.
    Bare(String),
    Number(f64),
    Bool(bool),
    /// Variable name without the `$`.
    Variable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Single(Value),
    Pair(Value, Value),
    List(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Key text as written, e.g. `resource.service.name:string`.
    pub key: String,
    pub op: FilterOperator,
    pub operand: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Vec<Expr>),
    And(Vec<Expr>),
    Not(Box<Expr>),
    Paren(Box<Expr>),
    Comparison(Comparison),
    /// A bare term with no operator.
    FullText(String),
}

impl Expr {
    /// Visit every comparison in the tree, left to right.
    pub fn comparisons(&self) -> Vec<&Comparison> {
        let mut out = Vec::new();
        self.collect_comparisons(&mut out);
        out
    }

    fn collect_comparisons<'a>(&'a self, out: &mut Vec<&'a Comparison>) {
        match self {
            Expr::Or(items) | Expr::And(items) => {
                for item in items {
                    item.collect_comparisons(out);
                }
            }
            Expr::Not(inner) | Expr::Paren(inner) => inner.collect_comparisons(out),
            Expr::Comparison(c) => out.push(c),
            Expr::FullText(_) => {}
        }
    }
}

/// A lex or parse failure with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub message: String,
    pub offset: usize,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at position {}", self.message, self.offset)
    }
}

/// Parse an expression.
pub fn parse(source: &str) -> Result<Expr, Vec<SyntaxError>> {
    let tokens = lex(source).map_err(|errs| {
        errs.into_iter()
            .map(|e| SyntaxError {
                message: e.to_string(),
                offset: e.span().start,
            })
            .collect::<Vec<_>>()
    })?;

    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        end: source.len(),
    };
    let expr = parser.parse_or().map_err(|e| vec![e])?;
    if let Some((tok, span)) = parser.peek_spanned() {
        return Err(vec![SyntaxError {
            message: format!("unexpected `{}`", tok),
            offset: span.start,
        }]);
    }
    Ok(expr)
}

struct Parser<'t, 'src> {
    tokens: &'t [(Token<'src>, SimpleSpan)],
    pos: usize,
    end: usize,
}

type ParseResult<T> = Result<T, SyntaxError>;

impl<'t, 'src> Parser<'t, 'src> {
    fn peek(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, n: usize) -> Option<&Token<'src>> {
        self.tokens.get(self.pos + n).map(|(t, _)| t)
    }

    fn peek_spanned(&self) -> Option<(&Token<'src>, SimpleSpan)> {
        self.tokens.get(self.pos).map(|(t, s)| (t, *s))
    }

    fn advance(&mut self) -> Option<Token<'src>> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token<'src>) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| s.start)
            .unwrap_or(self.end)
    }

    fn error<T>(&self, expected: &str) -> ParseResult<T> {
        let message = match self.peek() {
            Some(tok) => format!("expected {}, found `{}`", expected, tok),
            None => format!("expected {}, found end of input", expected),
        };
        Err(SyntaxError {
            message,
            offset: self.offset(),
        })
    }

    fn expect(&mut self, expected: Token<'src>, what: &str) -> ParseResult<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            self.error(what)
        }
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut items = vec![self.parse_and()?];
        while self.eat(&Token::Or) {
            items.push(self.parse_and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Or(items)
        })
    }

    fn starts_unary(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Not | Token::LParen | Token::Key(_) | Token::Quoted(_))
        )
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut items = vec![self.parse_unary()?];
        loop {
            if self.eat(&Token::And) {
                items.push(self.parse_unary()?);
            } else if self.starts_unary() {
                items.push(self.parse_unary()?);
            } else {
                break;
            }
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::And(items)
        })
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.peek() {
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            Some(Token::Key(key)) => {
                let key = key.to_string();
                if self.at_operator(1) {
                    self.pos += 1;
                    self.parse_comparison(key)
                } else {
                    self.pos += 1;
                    Ok(Expr::FullText(key))
                }
            }
            Some(Token::Quoted(text)) => {
                let text = unescape(text);
                self.pos += 1;
                Ok(Expr::FullText(text))
            }
            _ => self.error("a key, `NOT` or `(`"),
        }
    }

    fn at_operator(&self, n: usize) -> bool {
        matches!(
            self.peek_at(n),
            Some(
                Token::Eq
                    | Token::Ne
                    | Token::Lt
                    | Token::Le
                    | Token::Gt
                    | Token::Ge
                    | Token::Like
                    | Token::ILike
                    | Token::Contains
                    | Token::Regexp
                    | Token::Between
                    | Token::In
                    | Token::Exists
                    | Token::Not
            )
        )
    }

    fn parse_comparison(&mut self, key: String) -> ParseResult<Expr> {
        let negated = self.eat(&Token::Not);
        let pick = |pos: FilterOperator, neg: FilterOperator| if negated { neg } else { pos };

        let (op, operand) = match self.advance() {
            Some(Token::Eq) if !negated => (FilterOperator::Equal, self.single()?),
            Some(Token::Ne) if !negated => (FilterOperator::NotEqual, self.single()?),
            Some(Token::Lt) if !negated => (FilterOperator::LessThan, self.single()?),
            Some(Token::Le) if !negated => (FilterOperator::LessThanOrEq, self.single()?),
            Some(Token::Gt) if !negated => (FilterOperator::GreaterThan, self.single()?),
            Some(Token::Ge) if !negated => (FilterOperator::GreaterThanOrEq, self.single()?),
            Some(Token::Like) => (pick(FilterOperator::Like, FilterOperator::NotLike), self.single()?),
            Some(Token::ILike) => (pick(FilterOperator::ILike, FilterOperator::NotILike), self.single()?),
            Some(Token::Contains) => (
                pick(FilterOperator::Contains, FilterOperator::NotContains),
                self.single()?,
            ),
            Some(Token::Regexp) => (
                pick(FilterOperator::Regexp, FilterOperator::NotRegexp),
                self.single()?,
            ),
            Some(Token::Between) => {
                let low = self.value()?;
                self.expect(Token::And, "`AND` in BETWEEN")?;
                let high = self.value()?;
                (
                    pick(FilterOperator::Between, FilterOperator::NotBetween),
                    Operand::Pair(low, high),
                )
            }
            Some(Token::In) => (pick(FilterOperator::In, FilterOperator::NotIn), self.in_values()?),
            Some(Token::Exists) => (
                pick(FilterOperator::Exists, FilterOperator::NotExists),
                Operand::None,
            ),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                return self.error("a comparison operator");
            }
        };

        Ok(Expr::Comparison(Comparison { key, op, operand }))
    }

    fn single(&mut self) -> ParseResult<Operand> {
        Ok(Operand::Single(self.value()?))
    }

    fn in_values(&mut self) -> ParseResult<Operand> {
        let close = match self.peek() {
            Some(Token::LParen) => Token::RParen,
            Some(Token::LBracket) => Token::RBracket,
            _ => return Ok(Operand::List(vec![self.value()?])),
        };
        self.pos += 1;
        let mut values = vec![self.value()?];
        while self.eat(&Token::Comma) {
            values.push(self.value()?);
        }
        let what = if close == Token::RParen { "`)`" } else { "`]`" };
        self.expect(close, what)?;
        Ok(Operand::List(values))
    }

    fn value(&mut self) -> ParseResult<Value> {
        let value = match self.peek() {
            Some(Token::Quoted(s)) => Value::Text(unescape(s)),
            Some(Token::Key(s)) => Value::Bare(s.to_string()),
            Some(Token::Bool(b)) => Value::Bool(*b),
            Some(Token::Variable(s)) => Value::Variable(s.trim_start_matches('$').to_string()),
            Some(Token::Number(s)) => match s.parse::<f64>() {
                Ok(n) => Value::Number(n),
                Err(_) => return self.error("a number"),
            },
            _ => return self.error("a value"),
        };
        self.pos += 1;
        Ok(value)
    }
}

/// Resolve backslash escapes inside quoted text.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
