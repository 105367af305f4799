//! Database-specific error types and conversions.

use coursegate_core::error::GateError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Unique constraint violated on {entity}")]
    Duplicate { entity: String },

    /// A stored record could not be mapped back onto the domain model.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<DbError> for GateError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => GateError::NotFound { entity, id },
            DbError::Duplicate { entity } => GateError::AlreadyExists { entity },
            other => GateError::Database(other.to_string()),
        }
    }
}
