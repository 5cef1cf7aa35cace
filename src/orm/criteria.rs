//! Boolean predicates and SQL literal rendering
//!
//! Predicates are kept as a small tree so the same filter can be rendered
//! two ways: inline literals for display and logging ([`fmt::Display`]), or
//! `?` placeholders with the values collected for driver binding
//! ([`Predicate::bind`]).

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::db::Value;
use crate::error::{OrmError, Result};

/// The placeholder token. Passed through unquoted when rendering literals.
pub const PLACEHOLDER: &str = "?";

/// `identifier(args)`, e.g. `COUNT(*)` or `NOW()`
static FUNCTION_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[A-Za-z_][A-Za-z0-9_]*\s*\(.*\)\s*$").expect("valid regex"));

/// Whether the text looks like a SQL function call.
pub fn is_function_call(text: &str) -> bool {
    FUNCTION_CALL.is_match(text)
}

/// Render a value as SQL literal text.
///
/// With `quote_strings` off, strings and dates come back raw, which is
/// the form handed to driver parameter binding.
pub fn render_literal(value: &Value, quote_strings: bool) -> String {
    match value {
        Value::DateTime(dt) => {
            let text = dt.format("%Y-%m-%d %H:%M:%S").to_string();
            render_literal(&Value::String(text), quote_strings)
        }
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
        Value::Json(json) => json.to_string(),
        Value::Null => "null".to_string(),
        Value::String(s) if s == PLACEHOLDER || is_function_call(s) || !quote_strings => {
            s.clone()
        }
        Value::String(s) => format!("\"{}\"", s),
    }
}

/// Normalize a value for driver binding: dates and JSON as text,
/// booleans as 1/0.
pub fn bind_value(value: &Value) -> Value {
    match value {
        Value::DateTime(_) | Value::Json(_) => Value::String(render_literal(value, false)),
        Value::Bool(b) => Value::Int(i64::from(*b)),
        other => other.clone(),
    }
}

/// Comparison operators understood by filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Neq => "<>",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "LIKE",
        }
    }
}

impl FromStr for Operator {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "eq" => Ok(Operator::Eq),
            "neq" => Ok(Operator::Neq),
            "lt" => Ok(Operator::Lt),
            "lte" => Ok(Operator::Lte),
            "gt" => Ok(Operator::Gt),
            "gte" => Ok(Operator::Gte),
            "like" => Ok(Operator::Like),
            _ => Err(OrmError::UnknownOperator(s.to_string())),
        }
    }
}

/// A boolean SQL fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `field op value`
    Compare {
        field: String,
        op: Operator,
        value: Value,
    },
    /// `(a AND b ...)`
    And(Vec<Predicate>),
    /// `(a OR b ...)`
    Or(Vec<Predicate>),
    /// `a AND b ...` without parentheses, as produced by field filters
    All(Vec<Predicate>),
    /// Caller-supplied SQL used verbatim
    Raw(String),
}

impl Predicate {
    pub fn raw(sql: impl Into<String>) -> Self {
        Predicate::Raw(sql.into())
    }

    /// Render with `?` placeholders, appending the bound values in order.
    pub fn bind(&self, params: &mut Vec<Value>) -> String {
        match self {
            Predicate::Compare { field, op, value } => {
                params.push(bind_value(value));
                format!("{} {} {}", field, op.as_sql(), PLACEHOLDER)
            }
            Predicate::And(parts) => format!("({})", join_bound(parts, " AND ", params)),
            Predicate::Or(parts) => format!("({})", join_bound(parts, " OR ", params)),
            Predicate::All(parts) => join_bound(parts, " AND ", params),
            Predicate::Raw(sql) => sql.clone(),
        }
    }
}

fn join_bound(parts: &[Predicate], separator: &str, params: &mut Vec<Value>) -> String {
    parts
        .iter()
        .map(|part| part.bind(params))
        .collect::<Vec<_>>()
        .join(separator)
}

fn join_display(f: &mut fmt::Formatter<'_>, parts: &[Predicate], separator: &str) -> fmt::Result {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{}", part)?;
    }
    Ok(())
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { field, op, value } => {
                write!(f, "{} {} {}", field, op.as_sql(), render_literal(value, true))
            }
            Predicate::And(parts) => {
                f.write_str("(")?;
                join_display(f, parts, " AND ")?;
                f.write_str(")")
            }
            Predicate::Or(parts) => {
                f.write_str("(")?;
                join_display(f, parts, " OR ")?;
                f.write_str(")")
            }
            Predicate::All(parts) => join_display(f, parts, " AND "),
            Predicate::Raw(sql) => f.write_str(sql),
        }
    }
}

impl From<&str> for Predicate {
    fn from(sql: &str) -> Self {
        Predicate::Raw(sql.to_string())
    }
}

impl From<String> for Predicate {
    fn from(sql: String) -> Self {
        Predicate::Raw(sql)
    }
}

/// Criteria builder for the MySQL-flavored dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlCriteria;

impl SqlCriteria {
    /// Build a comparison for any supported operator.
    pub fn compare(&self, field: &str, op: Operator, value: impl Into<Value>) -> Predicate {
        let value = value.into();
        let value = match (op, value) {
            (Operator::Like, Value::String(s)) if !s.contains('%') => {
                Value::String(format!("%{}%", s))
            }
            (Operator::Like, Value::String(s)) => Value::String(s),
            (Operator::Like, other) => Value::String(format!("%{}%", render_literal(&other, false))),
            (_, other) => other,
        };

        Predicate::Compare {
            field: field.to_string(),
            op,
            value,
        }
    }

    pub fn eq(&self, field: &str, value: impl Into<Value>) -> Predicate {
        self.compare(field, Operator::Eq, value)
    }

    pub fn neq(&self, field: &str, value: impl Into<Value>) -> Predicate {
        self.compare(field, Operator::Neq, value)
    }

    pub fn lt(&self, field: &str, value: impl Into<Value>) -> Predicate {
        self.compare(field, Operator::Lt, value)
    }

    pub fn lte(&self, field: &str, value: impl Into<Value>) -> Predicate {
        self.compare(field, Operator::Lte, value)
    }

    pub fn gt(&self, field: &str, value: impl Into<Value>) -> Predicate {
        self.compare(field, Operator::Gt, value)
    }

    pub fn gte(&self, field: &str, value: impl Into<Value>) -> Predicate {
        self.compare(field, Operator::Gte, value)
    }

    /// `LIKE`, wrapping the value in `%...%` unless it already has a wildcard.
    pub fn like(&self, field: &str, value: impl Into<Value>) -> Predicate {
        self.compare(field, Operator::Like, value)
    }

    /// Conjunction in parentheses. At least one predicate is required.
    pub fn and_x(&self, predicates: impl IntoIterator<Item = Predicate>) -> Result<Predicate> {
        let parts: Vec<_> = predicates.into_iter().collect();
        if parts.is_empty() {
            return Err(OrmError::EmptyCriteria);
        }
        Ok(Predicate::And(parts))
    }

    /// Disjunction in parentheses. At least one predicate is required.
    pub fn or_x(&self, predicates: impl IntoIterator<Item = Predicate>) -> Result<Predicate> {
        let parts: Vec<_> = predicates.into_iter().collect();
        if parts.is_empty() {
            return Err(OrmError::EmptyCriteria);
        }
        Ok(Predicate::Or(parts))
    }
}
