//! Shared fixtures: a small contacts schema on in-memory SQLite.

#![allow(dead_code)]

use std::sync::Arc;

use once_cell::sync::Lazy;
use sqlorm::orm::{Entity, EntityMetadata, Field, Record, Relation};
use sqlorm::{Config, Connection};

static CONTACT: Lazy<EntityMetadata> = Lazy::new(|| {
    EntityMetadata::new("contacts")
        .field(Field::pk("id"))
        .field(Field::string("first_name").required().max(100))
        .field(Field::string("last_name").required().min(2))
        .field(Field::boolean("active").default(true))
        .field(Field::date("birthday"))
        .field(Field::json("profile"))
        .field(Field::integer("rating").alias("score").max(5))
        .field(Field::created_at("created_at"))
        .field(Field::updated_at("updated_at"))
        .relation(Relation::has_many("phones", Phone::metadata, "id", "contact_id"))
        .relation(Relation::has_one("address", Address::metadata, "id", "contact_id"))
        .relation(Relation::many_many(
            "schedules",
            Schedule::metadata,
            "contacts_schedules",
            "contact_id",
            "schedule_id",
        ))
        .relation(Relation::new("avatar", "EMBEDDED", Phone::metadata, "id", "contact_id"))
});

static PHONE: Lazy<EntityMetadata> = Lazy::new(|| {
    EntityMetadata::new("phones")
        .field(Field::pk("id"))
        .field(Field::integer("contact_id"))
        .field(Field::string("phone_number").required())
        .field(Field::boolean("active"))
        .relation(Relation::belongs_to("contact", Contact::metadata, "contact_id", "id"))
});

static ADDRESS: Lazy<EntityMetadata> = Lazy::new(|| {
    EntityMetadata::new("addresses")
        .field(Field::pk("id"))
        .field(Field::integer("contact_id"))
        .field(Field::string("street"))
});

static SCHEDULE: Lazy<EntityMetadata> = Lazy::new(|| {
    EntityMetadata::new("schedules")
        .field(Field::pk("id"))
        .field(Field::string("title"))
        .field(Field::date("start_time"))
        .field(Field::date("end_time"))
});

macro_rules! entity {
    ($name:ident, $metadata:ident) => {
        #[derive(Debug)]
        pub struct $name(Record);

        impl Entity for $name {
            fn metadata() -> &'static EntityMetadata {
                &$metadata
            }

            fn from_record(record: Record) -> Self {
                Self(record)
            }

            fn record(&self) -> &Record {
                &self.0
            }

            fn record_mut(&mut self) -> &mut Record {
                &mut self.0
            }
        }
    };
}

entity!(Contact, CONTACT);
entity!(Phone, PHONE);
entity!(Address, ADDRESS);
entity!(Schedule, SCHEDULE);

const SCHEMA: &[&str] = &[
    "CREATE TABLE contacts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        active INTEGER,
        birthday TEXT,
        profile TEXT,
        rating INTEGER,
        created_at INTEGER,
        updated_at INTEGER
    )",
    "CREATE TABLE phones (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        contact_id INTEGER,
        phone_number TEXT NOT NULL,
        active INTEGER
    )",
    "CREATE TABLE addresses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        contact_id INTEGER,
        street TEXT
    )",
    "CREATE TABLE schedules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT,
        start_time TEXT,
        end_time TEXT
    )",
    "CREATE TABLE contacts_schedules (
        contact_id INTEGER,
        schedule_id INTEGER
    )",
];

pub async fn create_schema(conn: &Connection) {
    conn.query_many(SCHEMA).await.expect("create schema");
}

/// A fresh in-memory database with the contacts schema.
pub async fn memory_connection() -> Arc<Connection> {
    sqlorm::logging::init_for_tests();
    let conn = Connection::new(Config::sqlite_memory()).expect("sqlite driver");
    create_schema(&conn).await;
    Arc::new(conn)
}

/// Run fixture statements, failing the test on the first error.
pub async fn seed(conn: &Connection, statements: &[&str]) {
    conn.query_many(statements).await.expect("seed data");
}
