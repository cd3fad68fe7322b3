//! Handlers for the `/auth` resource (register, login, refresh, logout).
//!
//! Each workflow executes inside exactly one transaction via
//! [`with_transaction`]; reads that need no atomicity run against the pool
//! before the transaction opens, keeping the begin..commit window minimal.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use keygate_core::error::CoreError;
use keygate_core::types::{DbId, Timestamp};
use keygate_db::models::token::CreateToken;
use keygate_db::models::user::{CreateUser, User};
use keygate_db::repositories::{AccessTokenRepo, RefreshTokenRepo, UserRepo};
use keygate_db::session::{PgSession, SessionError};

use crate::auth::password::{hash_password, validate_password_strength, verify_password};
use crate::auth::tokens::{SignedToken, TokenError, TokenService};
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::middleware::auth::BearerToken;
use crate::state::AppState;
use crate::txn::with_transaction;

/// The one login failure message. Absent user and wrong password must be
/// textually indistinguishable so usernames cannot be enumerated.
const INVALID_CREDENTIALS: &str = "Invalid username or password";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/register`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Request body for `POST /auth/refresh`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Request body for `POST /auth/logout`. The access token arrives in the
/// `Authorization` header.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// Successful authentication response returned by register and login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

/// Minimal user identity embedded in [`AuthResponse`].
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: DbId,
    pub username: String,
}

/// Response for `POST /auth/refresh`. Intentionally carries no user field.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// Response for `POST /auth/logout`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    pub message: String,
    pub logged_out_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/register
///
/// Create a user and issue the first token pair, atomically: if any of the
/// three inserts fails, none of them is observable afterwards.
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    // 1. Validate before any storage is touched.
    if input.username.trim().is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Username must not be empty".into(),
        )));
    }
    validate_password_strength(&input.password)
        .map_err(|msg| AppError::Core(CoreError::Validation(msg)))?;

    // 2. Hash with Argon2id and a per-record salt.
    let password_hash = hash_password(&input.password)
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;

    let tokens = state.tokens.clone();
    let username = input.username.clone();

    let response = with_transaction(&state.sessions, move |session: &mut PgSession| {
        async move {
            // 3. Create the user under the uniqueness constraint.
            let create = CreateUser {
                username,
                password_hash,
            };
            let user = UserRepo::create(session, &create).await.map_err(|e| match e {
                SessionError::Database(db)
                    if is_unique_violation(&db, "uq_users_username") =>
                {
                    AppError::Core(CoreError::Conflict("Username is already taken".into()))
                }
                other => AppError::Session(other),
            })?;

            // 4. First token pair, inside the same transaction.
            let pair = issue_token_pair(session, &tokens, &user).await?;

            Ok(auth_response(pair, &user))
        }
        .boxed()
    })
    .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/auth/login
///
/// Authenticate with username + password and issue a fresh token pair.
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    // 1. Look up the user, including the password hash.
    let user = UserRepo::find_by_username(&state.pool, &input.username)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::Unauthorized(INVALID_CREDENTIALS.into())))?;

    // 2. Verify the password. The mismatch outcome is identical to the
    //    absent-user outcome above.
    let password_valid = verify_password(&input.password, &user.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;

    if !password_valid {
        return Err(AppError::Core(CoreError::Unauthorized(
            INVALID_CREDENTIALS.into(),
        )));
    }

    // 3. Issue the pair inside one transaction.
    let tokens = state.tokens.clone();
    let response = with_transaction(&state.sessions, move |session: &mut PgSession| {
        async move {
            let pair = issue_token_pair(session, &tokens, &user).await?;
            Ok(auth_response(pair, &user))
        }
        .boxed()
    })
    .await?;

    Ok(Json(response))
}

/// POST /api/v1/auth/refresh
///
/// Exchange a live refresh token for a new pair, consuming the old one
/// (single-use rotation).
pub async fn refresh(
    State(state): State<AppState>,
    Json(input): Json<RefreshRequest>,
) -> AppResult<Json<RefreshResponse>> {
    // 1. Verify the refresh signature; failures are typed.
    state
        .tokens
        .verify_refresh(&input.refresh_token)
        .map_err(|e| unauthorized(refresh_verify_message(e)))?;

    // 2. A matching live record must exist.
    let record = RefreshTokenRepo::find_live(&state.pool, &input.refresh_token)
        .await?
        .ok_or_else(|| unauthorized("Refresh token is invalid or has been revoked"))?;

    // 3. The stored expiry is authoritative, not the token's own exp claim,
    //    so a server-side shortening always wins.
    if record.expires_at < Utc::now() {
        return Err(unauthorized("Refresh token has expired"));
    }

    // 4. The referenced user must still exist. The token tables cascade on
    //    user deletion, so with the shipped schema a live record implies a
    //    live user and this branch only fires on stores without the cascade.
    let user = UserRepo::find_by_id(&state.pool, record.user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "User",
            id: record.user_id,
        }))?;

    let tokens = state.tokens.clone();
    let refresh_token = input.refresh_token;

    let response = with_transaction(&state.sessions, move |session: &mut PgSession| {
        async move {
            // 5. Consume the old record first. A `false` here means a
            //    concurrent exchange won the race; this request's token is
            //    spent either way.
            let revoked = RefreshTokenRepo::revoke(session, &refresh_token).await?;
            if !revoked {
                return Err(unauthorized("Refresh token is invalid or has been revoked"));
            }

            // 6. Fresh payload from server-held user state; nothing from
            //    the decoded token is forwarded.
            let pair = issue_token_pair(session, &tokens, &user).await?;

            Ok(RefreshResponse {
                access_token: pair.access.token,
                refresh_token: pair.refresh.token,
            })
        }
        .boxed()
    })
    .await?;

    Ok(Json(response))
}

/// POST /api/v1/auth/logout
///
/// Revoke both tokens of a pair. Idempotent: repeating the call with the
/// same pair succeeds identically and leaks nothing about prior calls.
pub async fn logout(
    State(state): State<AppState>,
    bearer: BearerToken,
    Json(input): Json<LogoutRequest>,
) -> AppResult<Json<LogoutResponse>> {
    let access_token = bearer.0;
    let refresh_token = input.refresh_token;

    // 1. Verify both signatures independently.
    let access_claims = state
        .tokens
        .verify_access(&access_token)
        .map_err(|_| unauthorized("Invalid access token"))?;
    let refresh_claims = state
        .tokens
        .verify_refresh(&refresh_token)
        .map_err(|_| unauthorized("Invalid refresh token"))?;

    // 2. Subject mismatch short-circuits before any stored token state is
    //    consulted.
    if access_claims.sub != refresh_claims.sub {
        return Err(unauthorized("Token subject mismatch"));
    }

    // 3. Look up each token's record, revoked or not, so "absent" and
    //    "already revoked" are both safe no-ops.
    let access_record = AccessTokenRepo::find_by_token(&state.pool, &access_token).await?;
    let refresh_record = RefreshTokenRepo::find_by_token(&state.pool, &refresh_token).await?;

    // 4. A stored record bound to a different subject than claimed is a
    //    verification failure, not a no-op.
    if let Some(record) = &access_record {
        if record.user_id != access_claims.sub {
            return Err(unauthorized("Token subject mismatch"));
        }
    }
    if let Some(record) = &refresh_record {
        if record.user_id != refresh_claims.sub {
            return Err(unauthorized("Token subject mismatch"));
        }
    }

    let revoke_access = access_record.is_some_and(|r| !r.is_revoked);
    let revoke_refresh = refresh_record.is_some_and(|r| !r.is_revoked);

    // 5. Revoke whatever is still live, atomically.
    with_transaction(&state.sessions, move |session: &mut PgSession| {
        async move {
            if revoke_access {
                let revoked = AccessTokenRepo::revoke(session, &access_token).await?;
                if !revoked {
                    return Err(AppError::Core(CoreError::Internal(
                        "Failed to revoke access token".into(),
                    )));
                }
            }
            if revoke_refresh {
                let revoked = RefreshTokenRepo::revoke(session, &refresh_token).await?;
                if !revoked {
                    return Err(AppError::Core(CoreError::Internal(
                        "Failed to revoke refresh token".into(),
                    )));
                }
            }
            Ok(())
        }
        .boxed()
    })
    .await?;

    Ok(Json(LogoutResponse {
        message: "Logged out successfully".to_string(),
        logged_out_at: Utc::now(),
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A signed access/refresh pair, already persisted.
struct TokenPair {
    access: SignedToken,
    refresh: SignedToken,
}

/// Sign both tokens and persist their records as two sequential single-row
/// inserts inside the active transaction.
///
/// Uniqueness violations cannot occur here: every signed payload carries a
/// fresh random nonce, so any storage error is a real failure.
async fn issue_token_pair(
    session: &mut PgSession,
    tokens: &TokenService,
    user: &User,
) -> Result<TokenPair, AppError> {
    let access = tokens
        .sign_access(user.id, &user.username)
        .map_err(|e| AppError::InternalError(format!("Token signing error: {e}")))?;
    let refresh = tokens
        .sign_refresh(user.id, &user.username)
        .map_err(|e| AppError::InternalError(format!("Token signing error: {e}")))?;

    AccessTokenRepo::create(
        session,
        &CreateToken {
            user_id: user.id,
            token: access.token.clone(),
            expires_at: access.expires_at,
        },
    )
    .await?;

    RefreshTokenRepo::create(
        session,
        &CreateToken {
            user_id: user.id,
            token: refresh.token.clone(),
            expires_at: refresh.expires_at,
        },
    )
    .await?;

    Ok(TokenPair { access, refresh })
}

fn auth_response(pair: TokenPair, user: &User) -> AuthResponse {
    AuthResponse {
        access_token: pair.access.token,
        refresh_token: pair.refresh.token,
        user: PublicUser {
            id: user.id,
            username: user.username.clone(),
        },
    }
}

fn unauthorized(msg: impl Into<String>) -> AppError {
    AppError::Core(CoreError::Unauthorized(msg.into()))
}

fn refresh_verify_message(err: TokenError) -> &'static str {
    match err {
        TokenError::Expired => "Refresh token has expired",
        TokenError::Invalid => "Invalid refresh token",
    }
}
