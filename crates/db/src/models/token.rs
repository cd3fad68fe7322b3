//! Bearer-token record model, shared by the access and refresh tables.

use keygate_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A token row from `access_tokens` or `refresh_tokens` (identical shape).
///
/// `token` and `expires_at` are immutable once inserted; `is_revoked` flips
/// `false -> true` exactly once, touching `updated_at` as it does.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRecord {
    pub id: DbId,
    pub user_id: DbId,
    pub token: String,
    pub expires_at: Timestamp,
    pub is_revoked: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting a freshly signed token.
pub struct CreateToken {
    pub user_id: DbId,
    pub token: String,
    pub expires_at: Timestamp,
}
