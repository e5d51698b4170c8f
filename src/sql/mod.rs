//! SQL generation module.
//!
//! A small builder for the ClickHouse statements this crate emits:
//!
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - Quoting and placeholder rules
//! - [`arg`] - Bound argument values
//! - [`cond`] - Condition fragments with bound args
//! - [`query`] - SELECT builder and CTE chaining

pub mod arg;
pub mod cond;
pub mod dialect;
pub mod query;
pub mod token;

pub use arg::Arg;
pub use cond::{Cond, Fragment};
pub use dialect::{Dialect, SqlDialect};
pub use query::{combine_ctes, Cte, Join, SelectBuilder};
pub use token::{Token, TokenStream};
