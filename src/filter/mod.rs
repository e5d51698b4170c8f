//! Filter expressions.
//!
//! ```text
//! "service.name = 'api' AND code IN $codes"
//!        │
//!        ▼ lexer    (chumsky, tokens with spans)
//!        ▼ parser   (recursive descent, Expr tree)
//!        ▼ where_clause (key resolution, variables, ConditionBuilder)
//!        │
//!        ▼
//! Fragment { sql: "(... AND ... IN (?, ?))", args: [..] }
//! ```

pub mod lexer;
pub mod parser;
pub mod where_clause;

pub use parser::{parse, Comparison, Expr, Operand, SyntaxError, Value};
pub use where_clause::{key_selectors, prepare_where_clause, FilterOptions, PreparedWhereClause};
