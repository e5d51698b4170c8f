//! HAVING expressions over the aggregated value.
//!
//! Conditions are written against the aggregation the query asks for, e.g.
//! `sum(rate(signoz_calls_total)) > 10` or `__result > 10`. Every such
//! reference becomes the `value` column of the final projection:
//!
//! ```text
//! "avg(sum(cpu_usage)) > 50 AND __result < 100"  ──▶  "value > 50 AND value < 100"
//! ```
//!
//! Only references, numbers, arithmetic and comparisons survive, so the
//! rewritten text is spliced into the statement without placeholders.

use chumsky::prelude::*;

use crate::error::{BuildResult, QueryBuildError};
use crate::types::{MetricAggregation, SpaceAggregation, TimeAggregation};

/// Column holding the aggregated value in the final projection.
const VALUE_COLUMN: &str = "value";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token<'src> {
    Ident(&'src str),
    Number(&'src str),
    Quoted(&'src str),
    And,
    Or,
    Not,
    Compare(&'src str),
    Arith(char),
    LParen,
    RParen,
    Comma,
}

fn keyword_or_ident(s: &str) -> Token<'_> {
    match s.to_ascii_lowercase().as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        _ => Token::Ident(s),
    }
}

fn lexer<'src>() -> impl Parser<'src, &'src str, Vec<Token<'src>>, extra::Err<Rich<'src, char>>> {
    let ident = any()
        .filter(|c: &char| c.is_alphabetic() || *c == '_')
        .then(
            any()
                .filter(|c: &char| c.is_alphanumeric() || matches!(c, '_' | '.' | ':'))
                .repeated(),
        )
        .to_slice()
        .map(keyword_or_ident);

    let number = text::digits(10)
        .then(just('.').then(text::digits(10)).or_not())
        .then(
            one_of("eE")
                .then(one_of("+-").or_not())
                .then(text::digits(10))
                .or_not(),
        )
        .to_slice()
        .map(Token::Number);

    let single_quoted = just('\'')
        .ignore_then(none_of("'").repeated().to_slice())
        .then_ignore(just('\''));
    let double_quoted = just('"')
        .ignore_then(none_of("\"").repeated().to_slice())
        .then_ignore(just('"'));
    let quoted = single_quoted.or(double_quoted).map(Token::Quoted);

    let compare = choice((
        just("=="),
        just("!="),
        just("<>"),
        just("<="),
        just(">="),
        just("="),
        just("<"),
        just(">"),
    ))
    .to_slice()
    .map(Token::Compare);

    let symbol = choice((
        one_of("+-*/%").map(Token::Arith),
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
        just(',').to(Token::Comma),
    ));

    let token = choice((ident, number, quoted, compare, symbol));

    token.padded().repeated().collect().padded().then_ignore(end())
}

fn token_text(token: Option<Token<'_>>) -> String {
    match token {
        None => "end of input".to_string(),
        Some(Token::Ident(s)) | Some(Token::Number(s)) | Some(Token::Compare(s)) => s.to_string(),
        Some(Token::Quoted(s)) => format!("'{}'", s),
        Some(Token::And) => "AND".to_string(),
        Some(Token::Or) => "OR".to_string(),
        Some(Token::Not) => "NOT".to_string(),
        Some(Token::Arith(c)) => c.to_string(),
        Some(Token::LParen) => "(".to_string(),
        Some(Token::RParen) => ")".to_string(),
        Some(Token::Comma) => ",".to_string(),
    }
}

fn syntax_error(message: impl std::fmt::Display) -> QueryBuildError {
    QueryBuildError::InvalidInput(format!("Syntax error in `Having` expression: {}", message))
}

/// Texts naming the aggregation's result.
fn references(agg: &MetricAggregation) -> Vec<String> {
    let metric = agg.metric_name.as_str();
    let time = (agg.time_aggregation != TimeAggregation::Unspecified)
        .then(|| agg.time_aggregation.as_str());
    let space = (agg.space_aggregation != SpaceAggregation::Unspecified)
        .then(|| agg.space_aggregation.as_str());

    let aggregated = match (space, time) {
        (Some(s), Some(t)) => format!("{}({}({}))", s, t, metric),
        (Some(s), None) => format!("{}({})", s, metric),
        (None, Some(t)) => format!("{}({})", t, metric),
        (None, None) => metric.to_string(),
    };
    vec![
        "__result".to_string(),
        "__result0".to_string(),
        "__result_0".to_string(),
        aggregated,
    ]
}

/// Recursive descent over the tokens, rewriting as it goes.
///
/// ```text
/// or         := and (OR and)*
/// and        := unary (AND unary)*
/// unary      := NOT unary | '(' or ')' | comparison
/// comparison := arith op arith
/// arith      := term (('+' | '-' | '*' | '/' | '%') term)*
/// term       := '-' term | number | reference | call | '(' arith ')'
/// ```
struct Rewriter<'t, 'src> {
    tokens: &'t [Token<'src>],
    pos: usize,
    references: Vec<String>,
    invalid: Vec<String>,
}

impl<'t, 'src> Rewriter<'t, 'src> {
    fn peek(&self) -> Option<Token<'src>> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token<'src>> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token<'src>) -> BuildResult<()> {
        match self.next() {
            Some(t) if t == expected => Ok(()),
            other => Err(syntax_error(format!(
                "expected `{}`, found {}",
                token_text(Some(expected)),
                token_text(other)
            ))),
        }
    }

    fn or(&mut self) -> BuildResult<String> {
        let mut parts = vec![self.and()?];
        while self.peek() == Some(Token::Or) {
            self.pos += 1;
            parts.push(self.and()?);
        }
        Ok(parts.join(" OR "))
    }

    fn and(&mut self) -> BuildResult<String> {
        let mut parts = vec![self.unary()?];
        while self.peek() == Some(Token::And) {
            self.pos += 1;
            parts.push(self.unary()?);
        }
        Ok(parts.join(" AND "))
    }

    fn unary(&mut self) -> BuildResult<String> {
        match self.peek() {
            Some(Token::Not) => {
                self.pos += 1;
                Ok(format!("NOT {}", self.unary()?))
            }
            Some(Token::LParen) => {
                // `(a > 1 OR b > 2)` groups conditions, `(a + b) > 3` groups arithmetic
                let (pos, invalid) = (self.pos, self.invalid.len());
                if let Ok(grouped) = self.grouped() {
                    if !matches!(self.peek(), Some(Token::Compare(_) | Token::Arith(_))) {
                        return Ok(grouped);
                    }
                }
                self.pos = pos;
                self.invalid.truncate(invalid);
                self.comparison()
            }
            _ => self.comparison(),
        }
    }

    fn grouped(&mut self) -> BuildResult<String> {
        self.expect(Token::LParen)?;
        let inner = self.or()?;
        self.expect(Token::RParen)?;
        Ok(format!("({})", inner))
    }

    fn comparison(&mut self) -> BuildResult<String> {
        let left = self.arith()?;
        match self.next() {
            Some(Token::Compare(op)) => Ok(format!("{} {} {}", left, op, self.arith()?)),
            other => Err(syntax_error(format!(
                "expected a comparison operator, found {}",
                token_text(other)
            ))),
        }
    }

    fn arith(&mut self) -> BuildResult<String> {
        let mut out = self.term()?;
        while let Some(Token::Arith(op)) = self.peek() {
            self.pos += 1;
            out = format!("{} {} {}", out, op, self.term()?);
        }
        Ok(out)
    }

    fn term(&mut self) -> BuildResult<String> {
        match self.next() {
            Some(Token::Arith('-')) => Ok(format!("-{}", self.term()?)),
            Some(Token::Number(n)) => Ok(n.to_string()),
            Some(Token::LParen) => {
                let inner = self.arith()?;
                self.expect(Token::RParen)?;
                Ok(format!("({})", inner))
            }
            Some(Token::Ident(name)) if self.peek() == Some(Token::LParen) => self.call(name),
            Some(Token::Ident(name)) => Ok(self.reference(name)),
            other => Err(syntax_error(format!(
                "expected a value, found {}",
                token_text(other)
            ))),
        }
    }

    /// A function call is only allowed when it spells the aggregation.
    fn call(&mut self, name: &str) -> BuildResult<String> {
        let mut text = name.to_string();
        let mut depth = 0usize;
        loop {
            let token = self.next().ok_or_else(|| syntax_error("unclosed `(`"))?;
            match token {
                Token::LParen => depth += 1,
                Token::RParen => depth -= 1,
                _ => {}
            }
            text.push_str(&token_text(Some(token)));
            if depth == 0 {
                break;
            }
        }

        if self.references.contains(&text) {
            Ok(VALUE_COLUMN.to_string())
        } else {
            Err(QueryBuildError::InvalidInput(format!(
                "Functions are not allowed in `Having` expression: `{}`",
                text
            )))
        }
    }

    fn reference(&mut self, name: &str) -> String {
        if self.references.iter().any(|r| r == name) {
            VALUE_COLUMN.to_string()
        } else {
            self.invalid.push(name.to_string());
            name.to_string()
        }
    }
}

/// Rewrite a HAVING expression so every reference to `agg` reads `value`.
///
/// A blank expression rewrites to an empty string.
pub fn rewrite_for_metrics(expression: &str, agg: &MetricAggregation) -> BuildResult<String> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Ok(String::new());
    }

    let (tokens, errs) = lexer().parse(expression).into_output_errors();
    if let Some(err) = errs.first() {
        return Err(syntax_error(err));
    }
    let tokens = tokens.unwrap_or_default();

    if tokens.iter().any(|t| matches!(t, Token::Quoted(_))) {
        return Err(QueryBuildError::invalid(
            "`Having` expression contains string literals: aggregator results are numeric",
        ));
    }

    let mut rewriter = Rewriter {
        tokens: &tokens,
        pos: 0,
        references: references(agg),
        invalid: Vec::new(),
    };
    let rewritten = rewriter.or()?;
    if rewriter.peek().is_some() {
        return Err(syntax_error(format!(
            "unexpected {}",
            token_text(rewriter.peek())
        )));
    }

    if !rewriter.invalid.is_empty() {
        let mut valid = rewriter.references.clone();
        valid.sort();
        return Err(QueryBuildError::InvalidInput(format!(
            "Invalid references in `Having` expression: [{}]. Valid references are: [{}]",
            rewriter.invalid.join(", "),
            valid.join(", ")
        )));
    }
    Ok(rewritten)
}
