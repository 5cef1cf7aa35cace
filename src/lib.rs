//! sqlorm - metadata-driven micro-ORM over MySQL-flavored SQL
//!
//! Entities describe their table once; repositories validate and persist
//! them through a lazily-opened [`Connection`], and hydrated entities load
//! their relations on demand.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod orm;

pub use config::Config;
pub use db::{Connection, Factory, Row, Value};
pub use error::{OrmError, Result};
pub use orm::{Entity, EntityMetadata, Errors, Field, Filter, QueryBuilder, Record, Relation, Repository, SqlCriteria};
