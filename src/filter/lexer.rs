//! Lexer for filter expressions.
//!
//! Converts expression text such as
//! `service.name = 'api' AND http.status_code IN (500, 503)`
//! into tokens with span information.

use chumsky::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub enum Token<'src> {
    // ========================================================================
    // Keywords (case-insensitive)
    // ========================================================================
    And,
    Or,
    Not,
    Like,
    ILike,
    Contains,
    Regexp,
    Between,
    In,
    Exists,
    Bool(bool),

    // ========================================================================
    // Literals
    // ========================================================================
    /// Field key or bare word value: `service.name`, `resource.host:string`, `redis`.
    Key(&'src str),
    /// `$name`, including the dollar sign.
    Variable(&'src str),
    /// Quoted text without the quotes. Escapes are still present.
    Quoted(&'src str),
    Number(&'src str),

    // ========================================================================
    // Symbols
    // ========================================================================
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl<'src> std::fmt::Display for Token<'src> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::And => write!(f, "AND"),
            Token::Or => write!(f, "OR"),
            Token::Not => write!(f, "NOT"),
            Token::Like => write!(f, "LIKE"),
            Token::ILike => write!(f, "ILIKE"),
            Token::Contains => write!(f, "CONTAINS"),
            Token::Regexp => write!(f, "REGEXP"),
            Token::Between => write!(f, "BETWEEN"),
            Token::In => write!(f, "IN"),
            Token::Exists => write!(f, "EXISTS"),
            Token::Bool(b) => write!(f, "{}", b),

            Token::Key(s) => write!(f, "{}", s),
            Token::Variable(s) => write!(f, "{}", s),
            Token::Quoted(s) => write!(f, "'{}'", s),
            Token::Number(s) => write!(f, "{}", s),

            Token::Eq => write!(f, "="),
            Token::Ne => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
        }
    }
}

/// Map a word to a keyword token, or keep it as a key.
fn keyword_or_key(s: &str) -> Token<'_> {
    match s.to_ascii_lowercase().as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "like" => Token::Like,
        "ilike" => Token::ILike,
        "contains" => Token::Contains,
        "regexp" => Token::Regexp,
        "between" => Token::Between,
        "in" => Token::In,
        "exists" => Token::Exists,
        "true" => Token::Bool(true),
        "false" => Token::Bool(false),
        _ => Token::Key(s),
    }
}

fn is_key_start(c: &char) -> bool {
    c.is_alphabetic() || *c == '_' || *c == '@'
}

fn is_key_char(c: &char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | ':' | '-' | '/' | '@')
}

/// Build the lexer.
pub fn lexer<'src>(
) -> impl Parser<'src, &'src str, Vec<(Token<'src>, SimpleSpan)>, extra::Err<Rich<'src, char>>> {
    let key = any()
        .filter(is_key_start)
        .then(any().filter(is_key_char).repeated())
        .to_slice()
        .map(keyword_or_key);

    let variable = just('$')
        .then(
            any()
                .filter(|c: &char| c.is_alphanumeric() || *c == '_' || *c == '.')
                .repeated()
                .at_least(1),
        )
        .to_slice()
        .map(Token::Variable);

    // Quoted text: '...' or "..." with backslash escapes
    let single_quoted = just('\'')
        .ignore_then(
            none_of("\\'")
                .ignored()
                .or(just('\\').then(any()).ignored())
                .repeated()
                .to_slice(),
        )
        .then_ignore(just('\''));
    let double_quoted = just('"')
        .ignore_then(
            none_of("\\\"")
                .ignored()
                .or(just('\\').then(any()).ignored())
                .repeated()
                .to_slice(),
        )
        .then_ignore(just('"'));
    let quoted = single_quoted.or(double_quoted).map(Token::Quoted);

    let number = just('-')
        .or_not()
        .then(text::digits(10))
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .map(Token::Number);

    // Symbols (multi-char first, then single-char)
    let symbol = choice((
        just("==").to(Token::Eq),
        just("!=").to(Token::Ne),
        just("<>").to(Token::Ne),
        just("<=").to(Token::Le),
        just(">=").to(Token::Ge),
        just('=').to(Token::Eq),
        just('<').to(Token::Lt),
        just('>').to(Token::Gt),
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
        just('[').to(Token::LBracket),
        just(']').to(Token::RBracket),
        just(',').to(Token::Comma),
    ));

    let token = choice((key, variable, quoted, number, symbol)).map_with(|tok, e| (tok, e.span()));

    token.padded().repeated().collect().padded().then_ignore(end())
}

/// Lex an expression into tokens.
///
/// Returns Ok with the token list on success, or Err with the lex errors.
pub fn lex(source: &str) -> Result<Vec<(Token<'_>, SimpleSpan)>, Vec<Rich<'_, char>>> {
    let (tokens, errs) = lexer().parse(source).into_output_errors();
    if errs.is_empty() {
        Ok(tokens.unwrap_or_default())
    } else {
        Err(errs)
    }
}
