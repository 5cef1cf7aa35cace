//! Repository pattern for entity persistence
//!
//! A repository validates, saves, deletes and queries one entity type.
//! Mutating calls never fail with an error value; they record messages in
//! the repository's [`Errors`] and return `false`. Reads return `Result`.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! let mut contacts = Repository::<Contact>::new(conn.clone());
//!
//! let mut contact = Contact::blank();
//! contact.set("first_name", "Vinicius");
//! contact.set("last_name", "Guedes");
//!
//! if !contacts.save(&mut contact).await {
//!     println!("{:?}", contacts.errors());
//! }
//!
//! let page = contacts
//!     .find()
//!     .filter(Filter::fields().op("first_name", Operator::Like, "Vini"))
//!     .order("first_name ASC")
//!     .limit(20)
//!     .fetch_all()
//!     .await?;
//! ```
//!
//! Errors accumulate for the lifetime of the repository and are never
//! cleared, so use one repository per unit of work.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use super::builder::{QueryBuilder, QueryBuilderQueries};
use super::criteria::{SqlCriteria, render_literal};
use super::filter::Filter;
use super::mapper::make_entity;
use super::traits::{Entity, Field, FieldType};
use crate::db::{Connection, Factory, Value};
use crate::error::{OrmError, Result};

/// Key for errors raised by the database engine.
pub const DATABASE_KEY: &str = "Database";

/// Key for generic hook rejections.
pub const VALIDATION_KEY: &str = "validation";

/// Messages recorded by a repository, grouped by field name.
///
/// Serializes as `{ "field": ["message", ...] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Errors(BTreeMap<String, Vec<String>>);

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message under `field`.
    pub fn add(&mut self, field: &str, message: impl fmt::Display) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of messages across all fields.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, messages)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", field, messages.join(", "))?;
        }
        Ok(())
    }
}

/// Lifecycle hooks. Returning `false` aborts the save; a hook may record
/// its own messages in `errors`, otherwise a generic one is added.
#[allow(async_fn_in_trait)]
pub trait RepositoryHooks<E: Entity>: Send + Sync {
    async fn before_validate(&self, _entity: &E, _errors: &mut Errors) -> bool {
        true
    }

    async fn before_save(&self, _entity: &E, _errors: &mut Errors) -> bool {
        true
    }
}

/// Hooks that accept everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl<E: Entity> RepositoryHooks<E> for NoHooks {}

fn epoch_seconds() -> i64 {
    Utc::now().timestamp()
}

/// Unset, null and empty strings. Zero and `false` are present values.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn exceeds(value: &Value, limit: i64) -> bool {
    match value {
        Value::Int(i) => *i > limit,
        Value::Float(f) => *f > limit as f64,
        other => other.length().is_some_and(|len| len as i64 > limit),
    }
}

fn falls_short(value: &Value, limit: i64) -> bool {
    match value {
        Value::Int(i) => *i < limit,
        Value::Float(f) => *f < limit as f64,
        other => other.length().is_some_and(|len| (len as i64) < limit),
    }
}

pub struct Repository<E: Entity, H: RepositoryHooks<E> = NoHooks> {
    conn: Arc<Connection>,
    hooks: H,
    errors: Errors,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> Repository<E> {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self::with_hooks(conn, NoHooks)
    }

    /// Repository over the process-wide connection.
    pub fn global() -> anyhow::Result<Self> {
        Ok(Self::new(Factory::global()?.connection()?))
    }
}

impl<E: Entity, H: RepositoryHooks<E>> Repository<E, H> {
    pub fn with_hooks(conn: Arc<Connection>, hooks: H) -> Self {
        Self {
            conn,
            hooks,
            errors: Errors::new(),
            _marker: PhantomData,
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn errors(&self) -> &Errors {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: &str, message: impl fmt::Display) {
        self.errors.add(field, message);
    }

    /// Record a message under [`DATABASE_KEY`].
    pub fn add_database_error(&mut self, message: impl fmt::Display) {
        warn!(table = E::metadata().table, error = %message, "Database error recorded");
        self.errors.add(DATABASE_KEY, message);
    }

    fn pk(&self) -> Result<&'static Field> {
        let metadata = E::metadata();
        metadata
            .pk()
            .ok_or_else(|| OrmError::MissingPrimaryKey(metadata.table.to_string()))
    }

    /// Validate then persist.
    pub async fn save(&mut self, entity: &mut E) -> bool {
        self.persist(entity, true).await
    }

    /// Persist without running field validation. Hooks still run.
    pub async fn save_unvalidated(&mut self, entity: &mut E) -> bool {
        self.persist(entity, false).await
    }

    async fn persist(&mut self, entity: &mut E, validate: bool) -> bool {
        self.prepare(entity);

        if validate && !self.validate(entity).await {
            return false;
        }

        let before = self.errors.len();
        if !self.hooks.before_save(entity, &mut self.errors).await {
            if self.errors.len() == before {
                self.add_error(VALIDATION_KEY, "Presented problems before saving");
            }
            return false;
        }

        if entity.is_new() {
            self.insert(entity).await
        } else {
            self.update(entity).await
        }
    }

    /// Fill unset fields from their declared defaults.
    pub fn prepare(&self, entity: &mut E) {
        for field in &E::metadata().fields {
            if let Some(default) = &field.default {
                if entity.get(field.key()).is_null() {
                    entity.set(field.key(), default.clone());
                }
            }
        }
    }

    /// Run `before_validate` and the declared field rules. Fails when
    /// this call recorded any message.
    pub async fn validate(&mut self, entity: &E) -> bool {
        let before = self.errors.len();
        if !self.hooks.before_validate(entity, &mut self.errors).await {
            if self.errors.len() == before {
                self.add_error(VALIDATION_KEY, "Presented problems before validating");
            }
            return false;
        }

        for field in &E::metadata().fields {
            let value = entity.get(field.key());

            if field.required && is_blank(value) {
                self.errors.add(field.name, "Field is required");
            }

            if is_blank(value) {
                continue;
            }

            if let Some(max) = field.max.filter(|max| exceeds(value, *max)) {
                self.errors.add(field.name, format!("Field length must be under {}", max));
            }

            if let Some(min) = field.min.filter(|min| falls_short(value, *min)) {
                self.errors.add(field.name, format!("Field length must be over {}", min));
            }
        }

        let valid = self.errors.len() == before;
        if !valid {
            debug!(table = E::metadata().table, errors = %self.errors, "Validation failed");
        }
        valid
    }

    async fn insert(&mut self, entity: &mut E) -> bool {
        let metadata = E::metadata();

        if let Some(created_at) = metadata.field_by_kind(FieldType::CreatedAt) {
            entity.set(created_at.key(), epoch_seconds());
        }

        let mut insert = QueryBuilder.insert().into(metadata.table);
        for field in metadata.fields.iter().filter(|f| f.kind != FieldType::Pk) {
            let value = entity.get(field.key());
            if !value.is_null() {
                insert = insert.set(field.name, value.clone());
            }
        }

        let statement = insert.build();
        match self.conn.query(&statement.sql, &statement.params).await {
            Ok(output) => {
                if let (Some(pk), Some(result)) = (metadata.pk(), output.write_result()) {
                    entity.set(pk.key(), result.last_inserted_id);
                }
                entity.record_mut().set_connection(self.conn.clone());
                true
            }
            Err(e) => {
                self.add_database_error(e);
                false
            }
        }
    }

    /// Write only the fields whose rendered value differs from the
    /// snapshot. Nothing changed means nothing is sent.
    async fn update(&mut self, entity: &mut E) -> bool {
        let metadata = E::metadata();
        let pk = match self.pk() {
            Ok(pk) => pk,
            Err(e) => {
                self.add_database_error(e);
                return false;
            }
        };

        let mut update = QueryBuilder
            .update()
            .into(metadata.table)
            .filter(SqlCriteria.eq(pk.name, entity.get(pk.key()).clone()));

        for field in &metadata.fields {
            if field.kind == FieldType::Pk || field.kind.is_timestamp() {
                continue;
            }

            let current = entity.get(field.key());
            let original = entity.record().original(field.name);
            if render_literal(current, true) != render_literal(original, true) {
                update = update.set(field.name, current.clone());
            }
        }

        if update.is_empty() {
            debug!(table = metadata.table, "No changes to update");
            return true;
        }

        if let Some(updated_at) = metadata.field_by_kind(FieldType::UpdatedAt) {
            let now = epoch_seconds();
            entity.set(updated_at.key(), now);
            update = update.set(updated_at.name, now);
        }

        let statement = update.build();
        match self.conn.query(&statement.sql, &statement.params).await {
            Ok(_) => true,
            Err(e) => {
                self.add_database_error(e);
                false
            }
        }
    }

    /// Delete by primary key.
    pub async fn delete(&mut self, entity: &E) -> bool {
        let pk = match self.pk() {
            Ok(pk) => pk,
            Err(e) => {
                self.add_database_error(e);
                return false;
            }
        };

        let statement = QueryBuilder
            .delete()
            .from(E::metadata().table)
            .filter(SqlCriteria.eq(pk.name, entity.get(pk.key()).clone()))
            .build();

        match self.conn.query(&statement.sql, &statement.params).await {
            Ok(_) => true,
            Err(e) => {
                self.add_database_error(e);
                false
            }
        }
    }

    pub async fn find_by_id(&self, id: impl Into<Value>) -> Result<Option<E>> {
        let pk = self.pk()?;
        self.find()
            .filter(SqlCriteria.eq(pk.name, id))
            .fetch_optional()
            .await
    }

    /// Start a paginated lookup; defaults to 100 rows from offset 0.
    pub fn find(&self) -> FindQuery<'_, E> {
        FindQuery::new(&self.conn)
    }

    /// Rows matching `filter`; pass `Filter::default()` to count everything.
    pub async fn count(&self, filter: impl Into<Filter>) -> Result<i64> {
        let statement = QueryBuilder
            .select()
            .set_as("COUNT(*)", "total")
            .from(E::metadata().table)
            .filter(filter)
            .build();

        let rows = self.conn.fetch(&statement.sql, &statement.params).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("total"))
            .and_then(Value::as_i64)
            .unwrap_or_default())
    }
}

/// Query builder for finding entities
pub struct FindQuery<'a, E: Entity> {
    conn: &'a Arc<Connection>,
    filter: Filter,
    orders: Vec<String>,
    limit: u64,
    offset: u64,
    _marker: PhantomData<fn() -> E>,
}

impl<'a, E: Entity> FindQuery<'a, E> {
    pub fn new(conn: &'a Arc<Connection>) -> Self {
        Self {
            conn,
            filter: Filter::default(),
            orders: Vec::new(),
            limit: 100,
            offset: 0,
            _marker: PhantomData,
        }
    }

    /// Set the filter
    pub fn filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Add an ORDER BY item such as `"name DESC"`
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.orders.push(order.into());
        self
    }

    pub fn orders<S: Into<String>>(self, orders: impl IntoIterator<Item = S>) -> Self {
        orders.into_iter().fold(self, |query, order| query.order(order))
    }

    /// Set limit; zero removes it
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Set pagination (limit and offset)
    pub fn paginate(self, limit: u64, offset: u64) -> Self {
        self.limit(limit).offset(offset)
    }

    /// Execute and fetch all results
    pub async fn fetch_all(self) -> Result<Vec<E>> {
        let statement = QueryBuilder
            .select()
            .from(E::metadata().table)
            .set(["*"])
            .filter(self.filter)
            .orders(self.orders)
            .limit(self.limit)
            .offset(self.offset)
            .build();

        let rows = self.conn.fetch(&statement.sql, &statement.params).await?;
        Ok(rows
            .iter()
            .map(|row| make_entity::<E>(row, Some(self.conn.clone())))
            .collect())
    }

    /// Execute and fetch one optional result
    pub async fn fetch_optional(self) -> Result<Option<E>> {
        let results = self.limit(1).fetch_all().await?;
        Ok(results.into_iter().next())
    }

    /// Execute and fetch exactly one result (errors if not found)
    pub async fn fetch_one(self) -> Result<E> {
        self.fetch_optional()
            .await?
            .ok_or(OrmError::Database(sqlx::Error::RowNotFound))
    }
}
