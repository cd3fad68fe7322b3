//! Repositories for the `access_tokens` and `refresh_tokens` tables.
//!
//! The two tables are deliberately identical in shape, so both repos
//! delegate to one implementation parameterized by table name. Two lookup
//! contracts exist on purpose: [`find_live`] filters out revoked rows (the
//! hot path for refresh), while [`find_by_token`] includes them so logout
//! can tell "absent" apart from "already revoked".
//!
//! [`find_live`]: AccessTokenRepo::find_live
//! [`find_by_token`]: AccessTokenRepo::find_by_token

use sqlx::PgPool;

use keygate_core::types::Timestamp;

use crate::models::token::{CreateToken, TokenRecord};
use crate::session::{PgSession, SessionError};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, token, expires_at, is_revoked, created_at, updated_at";

/// Table names are compile-time constants; never interpolate user input here.
const ACCESS_TABLE: &str = "access_tokens";
const REFRESH_TABLE: &str = "refresh_tokens";

/// Single-row insert of a freshly signed token.
async fn insert(
    session: &mut PgSession,
    table: &'static str,
    input: &CreateToken,
) -> Result<TokenRecord, SessionError> {
    let query = format!(
        "INSERT INTO {table} (user_id, token, expires_at)
         VALUES ($1, $2, $3)
         RETURNING {COLUMNS}"
    );
    let record = sqlx::query_as::<_, TokenRecord>(&query)
        .bind(input.user_id)
        .bind(&input.token)
        .bind(input.expires_at)
        .fetch_one(session.conn()?)
        .await?;
    Ok(record)
}

/// Look up a non-revoked record by token string.
///
/// Expiry is intentionally not filtered here: the stored `expires_at` is
/// checked by the caller so expired and revoked tokens produce distinct
/// outcomes.
async fn find_live(
    pool: &PgPool,
    table: &'static str,
    token: &str,
) -> Result<Option<TokenRecord>, sqlx::Error> {
    let query = format!(
        "SELECT {COLUMNS} FROM {table}
         WHERE token = $1 AND is_revoked = false"
    );
    sqlx::query_as::<_, TokenRecord>(&query)
        .bind(token)
        .fetch_optional(pool)
        .await
}

/// Look up a record by token string, revoked or not.
async fn find_by_token(
    pool: &PgPool,
    table: &'static str,
    token: &str,
) -> Result<Option<TokenRecord>, sqlx::Error> {
    let query = format!("SELECT {COLUMNS} FROM {table} WHERE token = $1");
    sqlx::query_as::<_, TokenRecord>(&query)
        .bind(token)
        .fetch_optional(pool)
        .await
}

/// Mark a record revoked. Returns `true` only if a live record changed
/// state; revoking an absent or already-revoked token is a no-op `false`.
async fn revoke(
    session: &mut PgSession,
    table: &'static str,
    token: &str,
) -> Result<bool, SessionError> {
    let query = format!(
        "UPDATE {table} SET is_revoked = true, updated_at = NOW()
         WHERE token = $1 AND is_revoked = false"
    );
    let result = sqlx::query(&query)
        .bind(token)
        .execute(session.conn()?)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete records whose `expires_at` is before `cutoff`. Maintenance only;
/// returns the number of rows removed.
async fn expire_sweep(
    session: &mut PgSession,
    table: &'static str,
    cutoff: Timestamp,
) -> Result<u64, SessionError> {
    let query = format!("DELETE FROM {table} WHERE expires_at < $1");
    let result = sqlx::query(&query)
        .bind(cutoff)
        .execute(session.conn()?)
        .await?;
    Ok(result.rows_affected())
}

macro_rules! token_repo {
    ($name:ident, $table:expr, $doc:expr) => {
        #[doc = $doc]
        pub struct $name;

        impl $name {
            pub async fn create(
                session: &mut PgSession,
                input: &CreateToken,
            ) -> Result<TokenRecord, SessionError> {
                insert(session, $table, input).await
            }

            pub async fn find_live(
                pool: &PgPool,
                token: &str,
            ) -> Result<Option<TokenRecord>, sqlx::Error> {
                find_live(pool, $table, token).await
            }

            pub async fn find_by_token(
                pool: &PgPool,
                token: &str,
            ) -> Result<Option<TokenRecord>, sqlx::Error> {
                find_by_token(pool, $table, token).await
            }

            pub async fn revoke(
                session: &mut PgSession,
                token: &str,
            ) -> Result<bool, SessionError> {
                revoke(session, $table, token).await
            }

            pub async fn expire_sweep(
                session: &mut PgSession,
                cutoff: Timestamp,
            ) -> Result<u64, SessionError> {
                expire_sweep(session, $table, cutoff).await
            }
        }
    };
}

token_repo!(
    AccessTokenRepo,
    ACCESS_TABLE,
    "DAO for the `access_tokens` table."
);
token_repo!(
    RefreshTokenRepo,
    REFRESH_TABLE,
    "DAO for the `refresh_tokens` table."
);
