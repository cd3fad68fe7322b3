//! Bearer-token extraction for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use keygate_core::error::CoreError;

use crate::error::AppError;
use crate::state::AppState;

/// Raw bearer token pulled from the `Authorization` header.
///
/// Extraction checks the header's shape only; signature verification is the
/// workflow's job, so it can produce its own typed failures (expired vs.
/// invalid vs. subject mismatch).
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl FromRequestParts<AppState> for BearerToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing Authorization header".into(),
                ))
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid Authorization format. Expected: Bearer <token>".into(),
            ))
        })?;

        Ok(BearerToken(token.to_string()))
    }
}
