//! Bound statement arguments.
//!
//! Every user-supplied value reaches the statement through a `?` placeholder
//! and a matching `Arg`, in placeholder order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A value bound to one `?` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arg {
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float(f64),
    String(String),
}

impl Arg {
    /// Convert a JSON scalar into an argument. Arrays and objects are rejected.
    pub fn from_json(value: &serde_json::Value) -> Option<Arg> {
        match value {
            serde_json::Value::String(s) => Some(Arg::String(s.clone())),
            serde_json::Value::Bool(b) => Some(Arg::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Some(Arg::UInt(u))
                } else if let Some(i) = n.as_i64() {
                    Some(Arg::Int(i))
                } else {
                    n.as_f64().map(Arg::Float)
                }
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Bool(b) => write!(f, "{}", b),
            Arg::UInt(u) => write!(f, "{}", u),
            Arg::Int(i) => write!(f, "{}", i),
            Arg::Float(x) => write!(f, "{}", x),
            Arg::String(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::String(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::String(s)
    }
}

impl From<u64> for Arg {
    fn from(v: u64) -> Self {
        Arg::UInt(v)
    }
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self {
        Arg::Int(v)
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Self {
        Arg::Float(v)
    }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Self {
        Arg::Bool(v)
    }
}
