// Store errors - typed failures surfaced by the category and book stores
//
// CRUD callers need to tell "not found" and "invalid input" apart from
// plain database failures, so the stores return StoreError instead of anyhow.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Identifier does not resolve to an existing entity
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Input fails a data model invariant
    #[error("invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },

    /// Another category already uses this name (case-insensitive)
    #[error("category already exists: {name}")]
    DuplicateCategory { name: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: &str) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        StoreError::Invalid {
            field,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
