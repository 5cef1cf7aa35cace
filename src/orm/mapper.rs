//! Row hydration and relation loading
//!
//! A [`Record`] is the dynamic state behind every entity: current values
//! keyed by entity key, plus the snapshot of what was read from storage.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::builder::{QueryBuilder, QueryBuilderQueries, Statement};
use super::criteria::SqlCriteria;
use super::traits::{Entity, EntityMetadata, FieldType, Relation, RelationKind};
use crate::db::{Connection, Factory, Row, Value};
use crate::error::{OrmError, Result};

static NULL: Value = Value::Null;

/// Values as read from storage, keyed by column name.
pub type Attributes = BTreeMap<String, Value>;

/// Result of resolving a relation.
#[derive(Debug)]
pub enum Related {
    /// HasMany and ManyMany
    Many(Vec<Record>),
    /// HasOne and BelongsTo
    One(Option<Record>),
    /// Unknown relation kinds
    None,
}

#[derive(Clone)]
pub struct Record {
    metadata: &'static EntityMetadata,
    values: BTreeMap<String, Value>,
    snapshot: Option<Arc<Attributes>>,
    conn: Option<Arc<Connection>>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("table", &self.metadata.table)
            .field("values", &self.values)
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

/// Coerce a raw column value by its field type.
pub fn coerce(kind: FieldType, raw: &Value) -> Value {
    match kind {
        FieldType::Boolean => Value::Bool(matches!(raw, Value::Int(1) | Value::Bool(true))),
        FieldType::Date => match raw {
            Value::Null => Value::Null,
            other => other.to_datetime().map(Value::DateTime).unwrap_or_else(|| other.clone()),
        },
        FieldType::Json => match raw {
            Value::String(text) => serde_json::from_str(text)
                .map(Value::Json)
                .unwrap_or_else(|_| raw.clone()),
            other => other.clone(),
        },
        FieldType::CreatedAt | FieldType::UpdatedAt => match raw.as_i64() {
            Some(seconds) if seconds != 0 => seconds.checked_mul(1000).map_or(Value::Null, Value::Int),
            _ => Value::Null,
        },
        _ => raw.clone(),
    }
}

impl Record {
    /// An empty record with no snapshot.
    pub fn new(metadata: &'static EntityMetadata) -> Self {
        Self {
            metadata,
            values: BTreeMap::new(),
            snapshot: None,
            conn: None,
        }
    }

    /// Build a record from a stored row. Only fields present in the row
    /// are set; the coerced values also become the snapshot.
    pub fn hydrate(metadata: &'static EntityMetadata, row: &Row, conn: Option<Arc<Connection>>) -> Self {
        let mut values = BTreeMap::new();
        let mut snapshot = Attributes::new();

        for field in &metadata.fields {
            if let Some(raw) = row.get(field.name) {
                let value = coerce(field.kind, raw);
                values.insert(field.key().to_string(), value.clone());
                snapshot.insert(field.name.to_string(), value);
            }
        }

        Self {
            metadata,
            values,
            snapshot: Some(Arc::new(snapshot)),
            conn,
        }
    }

    pub fn metadata(&self) -> &'static EntityMetadata {
        self.metadata
    }

    /// Current value by entity key; `Null` when unset.
    pub fn get(&self, key: &str) -> &Value {
        self.values.get(key).unwrap_or(&NULL)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Whether a value was ever set for the key, even `Null`.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The read-only snapshot taken at hydration, keyed by column name.
    pub fn attributes(&self) -> Option<&Attributes> {
        self.snapshot.as_deref()
    }

    /// Snapshot value by column name; `Null` when absent.
    pub fn original(&self, name: &str) -> &Value {
        self.attributes()
            .and_then(|attrs| attrs.get(name))
            .unwrap_or(&NULL)
    }

    /// New when there is no snapshot or its primary key is missing or falsy.
    pub fn is_new(&self) -> bool {
        match self.metadata.pk() {
            Some(pk) => !self.original(pk.name).is_truthy(),
            None => self.snapshot.is_none(),
        }
    }

    pub fn connection(&self) -> Option<&Arc<Connection>> {
        self.conn.as_ref()
    }

    /// Attach the connection relation loads should use.
    pub fn set_connection(&mut self, conn: Arc<Connection>) {
        self.conn = Some(conn);
    }

    /// Resolve a relation by name. Runs a fresh query on every call.
    pub async fn related(&self, name: &str) -> Result<Related> {
        let relation = self
            .metadata
            .relation_by_name(name)
            .ok_or_else(|| OrmError::UnknownRelation {
                table: self.metadata.table.to_string(),
                name: name.to_string(),
            })?;

        let Some(statement) = self.relation_statement(relation) else {
            debug!(table = self.metadata.table, relation = name, "Relation has no loader");
            return Ok(Related::None);
        };

        let conn = self.relation_connection()?;
        let referenced = relation.referenced();
        let rows = conn.fetch(&statement.sql, &statement.params).await?;
        let mut records = rows
            .iter()
            .map(|row| Record::hydrate(referenced, row, Some(conn.clone())));

        Ok(match relation.kind {
            RelationKind::HasOne | RelationKind::BelongsTo => Related::One(records.next()),
            _ => Related::Many(records.collect()),
        })
    }

    fn relation_connection(&self) -> Result<Arc<Connection>> {
        match &self.conn {
            Some(conn) => Ok(conn.clone()),
            None => Factory::global()
                .map_err(|e| {
                    warn!(error = %e, "No connection available for relation load");
                    OrmError::NotConnected
                })?
                .connection(),
        }
    }

    fn relation_statement(&self, relation: &Relation) -> Option<Statement> {
        let expr = SqlCriteria;
        let referenced = relation.referenced().table;

        let select = match relation.kind {
            RelationKind::HasMany => QueryBuilder
                .select()
                .from(referenced)
                .set(["*"])
                .filter(expr.eq(relation.referenced_field, self.original(relation.field).clone())),
            RelationKind::HasOne | RelationKind::BelongsTo => QueryBuilder
                .select()
                .from(referenced)
                .set(["*"])
                .filter(expr.eq(relation.referenced_field, self.original(relation.field).clone()))
                .limit(1),
            RelationKind::ManyMany => {
                let junction = relation.table?;
                QueryBuilder
                    .select()
                    .from(junction)
                    .set([format!("{}.*", referenced)])
                    .join(
                        "INNER",
                        referenced,
                        &format!("{}.{} = {}.id", junction, relation.referenced_field, referenced),
                    )
                    .filter(expr.eq(
                        &format!("{}.{}", junction, relation.field),
                        self.original("id").clone(),
                    ))
            }
            RelationKind::Unknown(_) => return None,
        };

        Some(select.build())
    }
}

/// Hydrate a row into `E`.
pub fn make_entity<E: Entity>(row: &Row, conn: Option<Arc<Connection>>) -> E {
    E::from_record(Record::hydrate(E::metadata(), row, conn))
}
