//! Compiles a parsed filter expression into a bound WHERE predicate.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::parser::{parse, Comparison, Expr, Operand, Value};
use crate::error::{BuildResult, QueryBuildError};
use crate::sql::{Arg, Cond, Fragment};
use crate::types::{
    ConditionBuilder, FieldContext, FieldDataType, FieldKey, FieldKeySelector, FilterOperator,
    FilterValue, KeyMap, VariableItem, Variables,
};

static VARIABLE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("variable pattern is valid")
});

/// Collaborators and inputs for compiling one expression.
pub struct FilterOptions<'a> {
    pub condition_builder: &'a dyn ConditionBuilder,
    pub field_keys: &'a KeyMap,
    pub variables: &'a Variables,
}

/// A compiled predicate plus guidance for the user.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedWhereClause {
    pub predicate: Fragment,
    pub warnings: Vec<String>,
}

/// Compile `expression` into a predicate. An expression with no effective
/// conditions compiles to `true`.
pub fn prepare_where_clause(
    expression: &str,
    opts: &FilterOptions<'_>,
) -> BuildResult<PreparedWhereClause> {
    let expr = parse(expression).map_err(|errs| {
        let details: Vec<String> = errs.iter().map(|e| e.to_string()).collect();
        QueryBuildError::InvalidInput(format!(
            "failed to parse filter expression `{}`: {}",
            expression,
            details.join("; ")
        ))
    })?;

    let mut visitor = WhereClauseVisitor {
        opts,
        warnings: Vec::new(),
        errors: Vec::new(),
        keys_with_warnings: HashSet::new(),
    };
    let predicate = visitor.visit(&expr);

    if !visitor.errors.is_empty() {
        let mut errors = visitor.errors;
        if errors.len() == 1 {
            return Err(errors.remove(0));
        }
        let details: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(QueryBuildError::InvalidInput(format!(
            "Found {} errors while parsing the search expression: {}",
            errors.len(),
            details.join("; ")
        )));
    }

    Ok(PreparedWhereClause {
        predicate: predicate.unwrap_or_else(|| Fragment::raw("true")),
        warnings: visitor.warnings,
    })
}

/// Field key selectors for every key an expression mentions.
///
/// Unparseable expressions yield no selectors; the parse error surfaces later
/// when the expression is compiled.
pub fn key_selectors(expression: &str) -> Vec<FieldKeySelector> {
    match parse(expression) {
        Ok(expr) => expr
            .comparisons()
            .into_iter()
            .map(|c| FieldKeySelector::from_key(&FieldKey::parse(&c.key)))
            .collect(),
        Err(_) => Vec::new(),
    }
}

struct WhereClauseVisitor<'o, 'a> {
    opts: &'o FilterOptions<'a>,
    warnings: Vec<String>,
    errors: Vec<QueryBuildError>,
    keys_with_warnings: HashSet<String>,
}

enum Resolved {
    Value(FilterValue),
    /// A dynamic variable set to all values: drop the comparison.
    Skip,
}

impl<'o, 'a> WhereClauseVisitor<'o, 'a> {
    fn visit(&mut self, expr: &Expr) -> Option<Fragment> {
        match expr {
            Expr::Or(items) => {
                let parts = self.visit_all(items);
                combine(parts, Cond::or)
            }
            Expr::And(items) => {
                let parts = self.visit_all(items);
                combine(parts, Cond::and)
            }
            Expr::Not(inner) => self.visit(inner).map(Cond::not),
            Expr::Paren(inner) => self.visit(inner).map(|f| f.wrap("(", ")")),
            Expr::Comparison(c) => self.visit_comparison(c),
            Expr::FullText(_) => {
                self.errors.push(QueryBuildError::invalid(
                    "full text search is not supported",
                ));
                None
            }
        }
    }

    fn visit_all(&mut self, items: &[Expr]) -> Vec<Fragment> {
        items.iter().filter_map(|e| self.visit(e)).collect()
    }

    fn visit_comparison(&mut self, c: &Comparison) -> Option<Fragment> {
        let keys = self.resolve_keys(&c.key)?;

        let value = match self.resolve_operand(c) {
            Ok(Resolved::Value(v)) => v,
            Ok(Resolved::Skip) => return None,
            Err(e) => {
                self.errors.push(e);
                return None;
            }
        };

        if matches!(
            c.op,
            FilterOperator::Like
                | FilterOperator::NotLike
                | FilterOperator::ILike
                | FilterOperator::NotILike
        ) {
            self.warn_if_like_without_wildcards(c.op, &value);
        }

        let mut conds = Vec::with_capacity(keys.len());
        for key in &keys {
            match self.opts.condition_builder.condition_for(key, c.op, &value) {
                Ok(frag) => conds.push(frag),
                Err(e) => {
                    self.errors.push(e);
                    return None;
                }
            }
        }

        if conds.len() == 1 {
            return conds.pop();
        }
        if c.op.is_negative() {
            combine(conds, Cond::and)
        } else {
            combine(conds, Cond::or)
        }
    }

    fn resolve_keys(&mut self, key_text: &str) -> Option<Vec<FieldKey>> {
        let wanted = FieldKey::parse(key_text);
        let mut found: Vec<FieldKey> = self
            .opts
            .field_keys
            .get(&wanted.name)
            .map(|keys| {
                keys.iter()
                    .filter(|k| {
                        wanted.field_context == FieldContext::Unspecified
                            || k.field_context == wanted.field_context
                    })
                    .filter(|k| {
                        wanted.field_data_type == FieldDataType::Unspecified
                            || k.field_data_type == wanted.field_data_type
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if found.is_empty() && wanted.field_context != FieldContext::Unspecified {
            // The prefix may be part of the real key name, e.g. `resource.id`
            let with_context = format!("{}.{}", wanted.field_context.as_str(), wanted.name);
            if let Some(keys) = self.opts.field_keys.get(&with_context) {
                found = keys.clone();
            }
        }

        if found.is_empty() {
            self.errors.push(QueryBuildError::KeyNotFound(wanted.name));
            return None;
        }

        if found.len() > 1 {
            self.disambiguate(&wanted.name, &mut found);
        }
        Some(found)
    }

    fn disambiguate(&mut self, name: &str, found: &mut Vec<FieldKey>) {
        let listed: Vec<String> = found.iter().map(|k| k.to_string()).collect();
        let mut message = format!(
            "Key `{}` is ambiguous, found {} different combinations of field context / data type: [{}].",
            name,
            found.len(),
            listed.join(", ")
        );

        let has_resource = found.iter().any(|k| k.field_context == FieldContext::Resource);
        let has_attribute = found.iter().any(|k| k.field_context == FieldContext::Attribute);
        if has_resource && has_attribute {
            found.retain(|k| k.field_context == FieldContext::Resource);
            message.push_str(&format!(
                " Using `resource` context by default. To query attributes explicitly, use the fully qualified name (e.g., 'attribute.{}')",
                name
            ));
        }

        if self.keys_with_warnings.insert(name.to_string()) {
            self.warnings.push(message);
        }
        tracing::warn!(field_key_name = %name, "ambiguous key");
    }

    fn resolve_operand(&self, c: &Comparison) -> BuildResult<Resolved> {
        match (&c.op, &c.operand) {
            (_, Operand::None) => Ok(Resolved::Value(FilterValue::None)),
            (FilterOperator::In | FilterOperator::NotIn, Operand::List(values)) => {
                if let [single] = values.as_slice() {
                    if let Some((name, item)) = self.variable_for(single) {
                        if item.is_all() {
                            return Ok(Resolved::Skip);
                        }
                        return variable_list(name, item).map(|v| Resolved::Value(FilterValue::List(v)));
                    }
                }
                let args = values
                    .iter()
                    .map(|v| self.literal(v))
                    .collect::<BuildResult<Vec<_>>>()?;
                Ok(Resolved::Value(FilterValue::List(args)))
            }
            (_, Operand::Pair(low, high)) => {
                let mut args = Vec::with_capacity(2);
                for v in [low, high] {
                    match self.scalar(v)? {
                        Some(arg) => args.push(arg),
                        None => return Ok(Resolved::Skip),
                    }
                }
                Ok(Resolved::Value(FilterValue::List(args)))
            }
            (_, Operand::Single(v)) => Ok(match self.scalar(v)? {
                Some(arg) => Resolved::Value(FilterValue::Scalar(arg)),
                None => Resolved::Skip,
            }),
            (_, Operand::List(values)) => {
                // Only IN takes a list; the condition builder reports the mismatch.
                let args = values
                    .iter()
                    .map(|v| self.literal(v))
                    .collect::<BuildResult<Vec<_>>>()?;
                Ok(Resolved::Value(FilterValue::List(args)))
            }
        }
    }

    /// Variable referenced by a value: `$name` or a quoted `'$name'`.
    fn variable_for<'v>(&'v self, value: &'v Value) -> Option<(&'v str, &'a VariableItem)> {
        let name = match value {
            Value::Variable(name) => name.as_str(),
            Value::Text(text) => text.strip_prefix('$')?,
            _ => return None,
        };
        lookup_variable(self.opts.variables, name).map(|item| (name, item))
    }

    /// Scalar for a comparison. `None` means the comparison is skipped.
    fn scalar(&self, value: &Value) -> BuildResult<Option<Arg>> {
        if let Some((name, item)) = self.variable_for(value) {
            if item.is_all() {
                return Ok(None);
            }
            let first = match &item.value {
                serde_json::Value::Array(items) => items.first().ok_or_else(|| empty_list(name))?,
                other => other,
            };
            return json_arg(name, first).map(Some);
        }
        self.literal(value).map(Some)
    }

    fn literal(&self, value: &Value) -> BuildResult<Arg> {
        Ok(match value {
            Value::Text(text) => Arg::String(self.interpolate(text)),
            Value::Bare(word) => Arg::String(word.clone()),
            Value::Number(n) => Arg::Float(*n),
            Value::Bool(b) => Arg::Bool(*b),
            // Unknown variables stay literal text
            Value::Variable(name) => match lookup_variable(self.opts.variables, name) {
                Some(item) => match &item.value {
                    serde_json::Value::Array(items) => {
                        json_arg(name, items.first().ok_or_else(|| empty_list(name))?)?
                    }
                    other => json_arg(name, other)?,
                },
                None => Arg::String(format!("${}", name)),
            },
        })
    }

    /// Replace `$name` references inside quoted text with scalar variable values.
    fn interpolate(&self, text: &str) -> String {
        if !text.contains('$') {
            return text.to_string();
        }
        VARIABLE_REF
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let whole = caps[0].to_string();
                let Some(item) = lookup_variable(self.opts.variables, &caps[1]) else {
                    return whole;
                };
                if item.is_all() {
                    return whole;
                }
                let value = match &item.value {
                    serde_json::Value::Array(items) => items.first(),
                    other => Some(other),
                };
                match value {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(v @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => {
                        v.to_string()
                    }
                    _ => whole,
                }
            })
            .into_owned()
    }

    fn warn_if_like_without_wildcards(&mut self, op: FilterOperator, value: &FilterValue) {
        let has_wildcards = value
            .as_scalar()
            .and_then(Arg::as_str)
            .map(|s| s.contains('%') || s.contains('_'))
            .unwrap_or(false);
        if has_wildcards {
            return;
        }
        let name = match op {
            FilterOperator::ILike | FilterOperator::NotILike => "ILIKE",
            _ => "LIKE",
        };
        self.warnings.push(format!(
            "{} operator used without wildcards (% or _). Consider using = operator for exact matches or add wildcards for pattern matching.",
            name
        ));
    }
}

fn combine(mut parts: Vec<Fragment>, join: fn(Vec<Fragment>) -> Fragment) -> Option<Fragment> {
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(join(parts)),
    }
}

fn lookup_variable<'a>(variables: &'a Variables, name: &str) -> Option<&'a VariableItem> {
    variables
        .get(name)
        .or_else(|| variables.get(&format!("${}", name)))
}

fn variable_list(name: &str, item: &VariableItem) -> BuildResult<Vec<Arg>> {
    match &item.value {
        serde_json::Value::Array(items) => {
            if items.is_empty() {
                return Err(empty_list(name));
            }
            items.iter().map(|v| json_arg(name, v)).collect()
        }
        other => Ok(vec![json_arg(name, other)?]),
    }
}

fn json_arg(name: &str, value: &serde_json::Value) -> BuildResult<Arg> {
    Arg::from_json(value).ok_or_else(|| {
        QueryBuildError::InvalidInput(format!(
            "variable `{}` has an unsupported value: {}",
            name, value
        ))
    })
}

fn empty_list(name: &str) -> QueryBuildError {
    QueryBuildError::InvalidInput(format!(
        "malformed request payload: variable `{}` used in expression has an empty list value",
        name
    ))
}
