//! Filters accepted by `where` clauses and repository lookups
//!
//! A filter is either verbatim SQL, a prepared [`Predicate`], or a set of
//! per-field conditions. Field conditions can be built in code or read from
//! a JSON object such as
//!
//! ```json
//! { "active": 1, "first_name": ["like", "Joabe"], "age": { "gte": 18, "lt": 65 } }
//! ```
//!
//! Each key becomes an equality unless its value is an `[operator, value]`
//! pair or an `{operator: value}` map; all field conditions are joined
//! with `AND`.

use serde_json::Value as JsonValue;

use super::criteria::{Operator, Predicate, SqlCriteria};
use crate::db::Value;
use crate::error::{OrmError, Result};

/// Condition on a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldCondition {
    Eq(Value),
    Op(Operator, Value),
    /// Several comparisons on the same field, joined with `AND`
    Ops(Vec<(Operator, Value)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Raw(String),
    Predicate(Predicate),
    Fields(Vec<(String, FieldCondition)>),
}

impl Default for Filter {
    fn default() -> Self {
        Filter::Fields(Vec::new())
    }
}

impl Filter {
    /// Start an empty per-field filter.
    pub fn fields() -> Self {
        Self::default()
    }

    fn push(mut self, field: &str, condition: FieldCondition) -> Self {
        if let Filter::Fields(conditions) = &mut self {
            conditions.push((field.to_string(), condition));
            return self;
        }

        let previous = self.into_predicate();
        let extra = Filter::Fields(vec![(field.to_string(), condition)]).into_predicate();
        Filter::Predicate(Predicate::All(previous.into_iter().chain(extra).collect()))
    }

    /// `field = value`
    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, FieldCondition::Eq(value.into()))
    }

    /// `field <op> value`
    pub fn op(self, field: &str, op: Operator, value: impl Into<Value>) -> Self {
        self.push(field, FieldCondition::Op(op, value.into()))
    }

    /// Several comparisons on one field
    pub fn ops<V: Into<Value>>(self, field: &str, ops: impl IntoIterator<Item = (Operator, V)>) -> Self {
        let ops = ops.into_iter().map(|(op, v)| (op, v.into())).collect();
        self.push(field, FieldCondition::Ops(ops))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Filter::Raw(sql) => sql.trim().is_empty(),
            Filter::Predicate(_) => false,
            Filter::Fields(conditions) => conditions.is_empty(),
        }
    }

    /// The predicate this filter stands for; `None` when empty.
    pub fn into_predicate(self) -> Option<Predicate> {
        if self.is_empty() {
            return None;
        }

        match self {
            Filter::Raw(sql) => Some(Predicate::Raw(sql)),
            Filter::Predicate(predicate) => Some(predicate),
            Filter::Fields(conditions) => {
                let expr = SqlCriteria;
                let parts = conditions
                    .into_iter()
                    .map(|(field, condition)| match condition {
                        FieldCondition::Eq(value) => expr.eq(&field, value),
                        FieldCondition::Op(op, value) => expr.compare(&field, op, value),
                        FieldCondition::Ops(ops) => {
                            let mut parts: Vec<_> = ops
                                .into_iter()
                                .map(|(op, value)| expr.compare(&field, op, value))
                                .collect();
                            if parts.len() == 1 {
                                parts.remove(0)
                            } else {
                                Predicate::All(parts)
                            }
                        }
                    })
                    .collect();
                Some(Predicate::All(parts))
            }
        }
    }
}

impl From<&str> for Filter {
    fn from(sql: &str) -> Self {
        Filter::Raw(sql.to_string())
    }
}

impl From<String> for Filter {
    fn from(sql: String) -> Self {
        Filter::Raw(sql)
    }
}

impl From<Predicate> for Filter {
    fn from(predicate: Predicate) -> Self {
        Filter::Predicate(predicate)
    }
}

/// `["like", "x"]`: two elements, the first naming an operator
fn is_operator_pair(items: &[JsonValue]) -> bool {
    items.len() == 2
        && items[0]
            .as_str()
            .is_some_and(|op| op.parse::<Operator>().is_ok())
}

fn condition_from_json(field: &str, value: JsonValue) -> Result<FieldCondition> {
    match value {
        JsonValue::Array(pair) if is_operator_pair(&pair) => {
            let [op, value]: [JsonValue; 2] = pair
                .try_into()
                .map_err(|_| OrmError::InvalidFilter(format!("bad operator pair for '{}'", field)))?;
            let op = op.as_str().unwrap_or_default().parse::<Operator>()?;
            Ok(FieldCondition::Op(op, Value::from(value)))
        }
        JsonValue::Object(map) => {
            if map.is_empty() {
                return Err(OrmError::InvalidFilter(format!(
                    "empty operator map for '{}'",
                    field
                )));
            }
            let ops = map
                .into_iter()
                .map(|(op, value)| Ok((op.parse::<Operator>()?, Value::from(value))))
                .collect::<Result<Vec<_>>>()?;
            Ok(FieldCondition::Ops(ops))
        }
        other => Ok(FieldCondition::Eq(Value::from(other))),
    }
}

impl TryFrom<JsonValue> for Filter {
    type Error = OrmError;

    /// A JSON string is raw SQL; a JSON object is a per-field filter.
    fn try_from(json: JsonValue) -> Result<Self> {
        match json {
            JsonValue::String(sql) => Ok(Filter::Raw(sql)),
            JsonValue::Null => Ok(Filter::default()),
            JsonValue::Object(map) => {
                let conditions = map
                    .into_iter()
                    .map(|(field, value)| {
                        let condition = condition_from_json(&field, value)?;
                        Ok((field, condition))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Filter::Fields(conditions))
            }
            other => Err(OrmError::InvalidFilter(format!(
                "expected an object or a string, got {}",
                other
            ))),
        }
    }
}
