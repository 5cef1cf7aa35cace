//! Error types for the ORM layer

use thiserror::Error;

/// Errors surfaced by connections, builders and read operations.
///
/// Mutating repository calls (`save`, `delete`) never return these; they
/// record messages in the repository's [`Errors`](crate::orm::Errors) and
/// report `false` instead.
#[derive(Debug, Error)]
pub enum OrmError {
    /// The engine rejected a statement or the connection failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No driver is compiled in (or known) for the configured name
    #[error("unsupported database driver '{0}'")]
    UnsupportedDriver(String),

    /// A filter named an operator outside eq/neq/lt/lte/gt/gte/like
    #[error("unknown filter operator '{0}'")]
    UnknownOperator(String),

    /// A filter document could not be interpreted
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// `and_x`/`or_x` called without predicates
    #[error("criteria composition requires at least one predicate")]
    EmptyCriteria,

    /// The entity metadata declares no relation with this name
    #[error("entity '{table}' has no relation named '{name}'")]
    UnknownRelation { table: String, name: String },

    /// A relation was loaded into an entity type for a different table
    #[error("relation targets table '{expected}' but was loaded as '{found}'")]
    RelationMismatch { expected: String, found: String },

    /// The entity metadata declares no `pk` field
    #[error("entity '{0}' declares no primary key")]
    MissingPrimaryKey(String),

    /// The driver slot was empty when it was expected to be live
    #[error("connection is not established")]
    NotConnected,
}

pub type Result<T, E = OrmError> = std::result::Result<T, E>;
