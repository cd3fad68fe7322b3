use crate::types::DbId;

/// Domain-level error taxonomy.
///
/// Every workflow failure is expressed as one of these variants; the HTTP
/// layer maps each variant to exactly one status code. `Locked` marks a
/// storage-level write conflict where the caller must retry the whole
/// request with a fresh transaction.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Write conflict: {0}")]
    Locked(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
