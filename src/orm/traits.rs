//! Entity metadata and the `Entity` trait
//!
//! Each entity type describes its table once, in a `Lazy` static, and
//! implements [`Entity`] to wrap the dynamic [`Record`] that holds its
//! values:
//!
//! ```rust,ignore
//! static CONTACT: Lazy<EntityMetadata> = Lazy::new(|| {
//!     EntityMetadata::new("contacts")
//!         .field(Field::pk("id"))
//!         .field(Field::string("first_name").required().max(100))
//!         .relation(Relation::has_many("phones", Phone::metadata, "id", "contact_id"))
//! });
//!
//! pub struct Contact(Record);
//!
//! impl Entity for Contact {
//!     fn metadata() -> &'static EntityMetadata { &CONTACT }
//!     fn from_record(record: Record) -> Self { Self(record) }
//!     fn record(&self) -> &Record { &self.0 }
//!     fn record_mut(&mut self) -> &mut Record { &mut self.0 }
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use super::mapper::{Record, Related};
use crate::db::Value;
use crate::error::{OrmError, Result};

/// Storage type of a field, driving coercion and timestamp stamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Pk,
    String,
    Integer,
    Boolean,
    Date,
    Json,
    CreatedAt,
    UpdatedAt,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Pk => "pk",
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Json => "json",
            FieldType::CreatedAt => "created_at",
            FieldType::UpdatedAt => "updated_at",
        }
    }

    /// Timestamps are maintained by the repository, not diffed.
    pub fn is_timestamp(&self) -> bool {
        matches!(self, FieldType::CreatedAt | FieldType::UpdatedAt)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pk" => Ok(FieldType::Pk),
            "string" => Ok(FieldType::String),
            "integer" => Ok(FieldType::Integer),
            "boolean" => Ok(FieldType::Boolean),
            "date" => Ok(FieldType::Date),
            "json" => Ok(FieldType::Json),
            "created_at" => Ok(FieldType::CreatedAt),
            "updated_at" => Ok(FieldType::UpdatedAt),
            _ => Err(format!("unknown field type '{}'", s)),
        }
    }
}

/// A mapped column.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub kind: FieldType,
    /// Column name in the database
    pub name: &'static str,
    /// Public name on the entity; defaults to `name`
    pub alias: Option<&'static str>,
    pub required: bool,
    pub max: Option<i64>,
    pub min: Option<i64>,
    /// Applied by the repository when the value is unset or null
    pub default: Option<Value>,
}

impl Field {
    pub fn new(kind: FieldType, name: &'static str) -> Self {
        Self {
            kind,
            name,
            alias: None,
            required: false,
            max: None,
            min: None,
            default: None,
        }
    }

    pub fn pk(name: &'static str) -> Self {
        Self::new(FieldType::Pk, name)
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(FieldType::String, name)
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(FieldType::Integer, name)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(FieldType::Boolean, name)
    }

    pub fn date(name: &'static str) -> Self {
        Self::new(FieldType::Date, name)
    }

    pub fn json(name: &'static str) -> Self {
        Self::new(FieldType::Json, name)
    }

    pub fn created_at(name: &'static str) -> Self {
        Self::new(FieldType::CreatedAt, name)
    }

    pub fn updated_at(name: &'static str) -> Self {
        Self::new(FieldType::UpdatedAt, name)
    }

    pub fn alias(mut self, alias: &'static str) -> Self {
        self.alias = Some(alias);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn max(mut self, max: i64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn min(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// The name this field is stored under on the entity.
    pub fn key(&self) -> &'static str {
        self.alias.unwrap_or(self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    HasMany,
    HasOne,
    BelongsTo,
    ManyMany,
    /// Anything else; resolves to [`Related::None`]
    Unknown(String),
}

impl RelationKind {
    /// Case-insensitive; unrecognized names become `Unknown`.
    pub fn parse(kind: &str) -> Self {
        match kind.to_uppercase().as_str() {
            "HASMANY" => RelationKind::HasMany,
            "HASONE" => RelationKind::HasOne,
            "BELONGSTO" => RelationKind::BelongsTo,
            "MANYMANY" => RelationKind::ManyMany,
            _ => RelationKind::Unknown(kind.to_string()),
        }
    }
}

impl From<&str> for RelationKind {
    fn from(kind: &str) -> Self {
        RelationKind::parse(kind)
    }
}

/// A declared association, resolved by a fresh query on every access.
#[derive(Debug, Clone)]
pub struct Relation {
    pub name: &'static str,
    pub kind: RelationKind,
    pub referenced: fn() -> &'static EntityMetadata,
    /// Column on this entity's snapshot (junction column for many-to-many)
    pub field: &'static str,
    /// Column on the referenced table (junction column for many-to-many)
    pub referenced_field: &'static str,
    /// Junction table, many-to-many only
    pub table: Option<&'static str>,
}

impl Relation {
    pub fn new(
        name: &'static str,
        kind: impl Into<RelationKind>,
        referenced: fn() -> &'static EntityMetadata,
        field: &'static str,
        referenced_field: &'static str,
    ) -> Self {
        Self {
            name,
            kind: kind.into(),
            referenced,
            field,
            referenced_field,
            table: None,
        }
    }

    pub fn has_many(
        name: &'static str,
        referenced: fn() -> &'static EntityMetadata,
        field: &'static str,
        referenced_field: &'static str,
    ) -> Self {
        Self::new(name, RelationKind::HasMany, referenced, field, referenced_field)
    }

    pub fn has_one(
        name: &'static str,
        referenced: fn() -> &'static EntityMetadata,
        field: &'static str,
        referenced_field: &'static str,
    ) -> Self {
        Self::new(name, RelationKind::HasOne, referenced, field, referenced_field)
    }

    pub fn belongs_to(
        name: &'static str,
        referenced: fn() -> &'static EntityMetadata,
        field: &'static str,
        referenced_field: &'static str,
    ) -> Self {
        Self::new(name, RelationKind::BelongsTo, referenced, field, referenced_field)
    }

    /// `table` is the junction; `field` points back at this entity's `id`
    /// and `referenced_field` at the referenced entity's `id`.
    pub fn many_many(
        name: &'static str,
        referenced: fn() -> &'static EntityMetadata,
        table: &'static str,
        field: &'static str,
        referenced_field: &'static str,
    ) -> Self {
        Self::new(name, RelationKind::ManyMany, referenced, field, referenced_field).through(table)
    }

    pub fn through(mut self, table: &'static str) -> Self {
        self.table = Some(table);
        self
    }

    pub fn referenced(&self) -> &'static EntityMetadata {
        (self.referenced)()
    }
}

/// Static description of one entity type.
#[derive(Debug, Clone)]
pub struct EntityMetadata {
    pub table: &'static str,
    pub fields: Vec<Field>,
    pub relations: Vec<Relation>,
}

impl EntityMetadata {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// First field of the given type.
    pub fn field_by_kind(&self, kind: FieldType) -> Option<&Field> {
        self.fields.iter().find(|f| f.kind == kind)
    }

    pub fn pk(&self) -> Option<&Field> {
        self.field_by_kind(FieldType::Pk)
    }

    /// Field by its entity key (alias, or name when there is no alias).
    pub fn field_by_key(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key() == key)
    }

    pub fn relation_by_name(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }
}

/// A concrete entity type backed by a [`Record`].
#[allow(async_fn_in_trait)]
pub trait Entity: Sized + Send + Sync {
    fn metadata() -> &'static EntityMetadata;

    fn from_record(record: Record) -> Self;

    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;

    /// A fresh, unsaved entity with no values set.
    fn blank() -> Self {
        Self::from_record(Record::new(Self::metadata()))
    }

    /// Current value by entity key; `Null` when unset.
    fn get(&self, key: &str) -> &Value {
        self.record().get(key)
    }

    fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.record_mut().set(key, value);
    }

    fn is_new(&self) -> bool {
        self.record().is_new()
    }

    /// Load a to-many relation as `R`. To-one relations come back as zero
    /// or one element; unknown relation kinds as an empty list.
    async fn has_many<R: Entity>(&self, relation: &str) -> Result<Vec<R>> {
        match self.record().related(relation).await? {
            Related::Many(records) => records.into_iter().map(into_entity::<R>).collect(),
            Related::One(record) => record.into_iter().map(into_entity::<R>).collect(),
            Related::None => Ok(Vec::new()),
        }
    }

    /// Load a to-one relation as `R`.
    async fn has_one<R: Entity>(&self, relation: &str) -> Result<Option<R>> {
        match self.record().related(relation).await? {
            Related::One(record) => record.map(into_entity::<R>).transpose(),
            Related::Many(records) => records.into_iter().next().map(into_entity::<R>).transpose(),
            Related::None => Ok(None),
        }
    }
}

/// Wrap a loaded record, checking that it belongs to `R`'s table.
fn into_entity<R: Entity>(record: Record) -> Result<R> {
    let expected = R::metadata().table;
    let found = record.metadata().table;
    if expected != found {
        return Err(OrmError::RelationMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        });
    }
    Ok(R::from_record(record))
}
