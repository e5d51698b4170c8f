//! Tokens the statement builders emit.
//!
//! Builders push tokens into a [`TokenStream`] and render it once for a
//! dialect. Only placeholders depend on the dialect; everything else is
//! fixed keyword text or trusted builder output.

use super::dialect::{Dialect, SqlDialect};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Clauses
    With,
    Select,
    From,
    Inner,
    Join,
    On,
    Where,
    GroupBy,
    Having,
    Window,
    OrderBy,
    As,

    // Predicates
    And,
    Like,
    Between,
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,

    Star,
    Comma,
    LParen,
    RParen,
    Space,

    /// Bound parameter marker.
    Placeholder,
    /// Builder-generated text: column expressions, table names, nested
    /// statements. User values never go here.
    Raw(String),
}

impl Token {
    fn keyword(&self) -> Option<&'static str> {
        let text = match self {
            Token::With => "WITH",
            Token::Select => "SELECT",
            Token::From => "FROM",
            Token::Inner => "INNER",
            Token::Join => "JOIN",
            Token::On => "ON",
            Token::Where => "WHERE",
            Token::GroupBy => "GROUP BY",
            Token::Having => "HAVING",
            Token::Window => "WINDOW",
            Token::OrderBy => "ORDER BY",
            Token::As => "AS",
            Token::And => "AND",
            Token::Like => "LIKE",
            Token::Between => "BETWEEN",
            Token::Eq => "=",
            Token::Ne => "<>",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Lte => "<=",
            Token::Gte => ">=",
            Token::Star => "*",
            Token::Comma => ",",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Space => " ",
            Token::Placeholder | Token::Raw(_) => return None,
        };
        Some(text)
    }

    fn write_to(&self, out: &mut String, dialect: Dialect) {
        match self {
            Token::Placeholder => out.push_str(dialect.placeholder()),
            Token::Raw(s) => out.push_str(s),
            other => out.push_str(other.keyword().unwrap_or_default()),
        }
    }
}

/// Ordered tokens rendered into one SQL string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    /// Raw items separated by `, `.
    pub fn comma_list<S: AsRef<str>>(&mut self, items: &[S]) -> &mut Self {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(Token::Comma).space();
            }
            self.push(Token::Raw(item.as_ref().to_string()));
        }
        self
    }

    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }

    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }

    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }

    pub fn serialize(&self, dialect: Dialect) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            token.write_to(&mut out, dialect);
        }
        out
    }
}
