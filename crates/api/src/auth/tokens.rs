//! Access/refresh token signing and verification.
//!
//! Both token kinds are HS256-signed JWTs carrying a [`Claims`] payload, but
//! they are signed with distinct secrets and distinct validity windows: a
//! leaked short-lived access token never unlocks the refresh exchange. Every
//! payload carries a random `jti` nonce so two tokens issued for the same
//! subject within the same timestamp resolution are still distinct strings,
//! which the storage layer's token-uniqueness constraint depends on.
//!
//! There is no decode-without-verification API here on purpose.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use keygate_core::types::{DbId, Timestamp};

/// Domain claims embedded in every signed token.
///
/// `sub`/`username` are the domain payload; `exp`/`iat`/`jti` are signing
/// metadata. On rotation a fresh `Claims` is always rebuilt from the user
/// row, never copied from a decoded token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject -- the user's internal database id.
    pub sub: DbId,
    /// The user's username at signing time.
    pub username: String,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Random nonce (UUID v4) guaranteeing token-string uniqueness.
    pub jti: String,
}

/// Typed verification failure.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("token is invalid")]
    Invalid,
}

/// Configuration for token signing: two secrets, two validity windows.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// HMAC-SHA256 secret for access tokens.
    pub access_secret: String,
    /// HMAC-SHA256 secret for refresh tokens.
    pub refresh_secret: String,
    /// Access token lifetime in minutes (default: 15).
    pub access_expiry_mins: i64,
    /// Refresh token lifetime in days (default: 7).
    pub refresh_expiry_days: i64,
}

/// Default access token expiry in minutes.
const DEFAULT_ACCESS_EXPIRY_MINS: i64 = 15;
/// Default refresh token expiry in days.
const DEFAULT_REFRESH_EXPIRY_DAYS: i64 = 7;

impl TokenConfig {
    /// Load token configuration from environment variables.
    ///
    /// | Env Var                     | Required | Default |
    /// |-----------------------------|----------|---------|
    /// | `ACCESS_TOKEN_SECRET`       | **yes**  | --      |
    /// | `REFRESH_TOKEN_SECRET`      | **yes**  | --      |
    /// | `ACCESS_TOKEN_EXPIRY_MINS`  | no       | `15`    |
    /// | `REFRESH_TOKEN_EXPIRY_DAYS` | no       | `7`     |
    ///
    /// # Panics
    ///
    /// Panics if either secret is unset or empty.
    pub fn from_env() -> Self {
        let access_secret = std::env::var("ACCESS_TOKEN_SECRET")
            .expect("ACCESS_TOKEN_SECRET must be set in the environment");
        assert!(
            !access_secret.is_empty(),
            "ACCESS_TOKEN_SECRET must not be empty"
        );

        let refresh_secret = std::env::var("REFRESH_TOKEN_SECRET")
            .expect("REFRESH_TOKEN_SECRET must be set in the environment");
        assert!(
            !refresh_secret.is_empty(),
            "REFRESH_TOKEN_SECRET must not be empty"
        );

        let access_expiry_mins: i64 = std::env::var("ACCESS_TOKEN_EXPIRY_MINS")
            .unwrap_or_else(|_| DEFAULT_ACCESS_EXPIRY_MINS.to_string())
            .parse()
            .expect("ACCESS_TOKEN_EXPIRY_MINS must be a valid i64");

        let refresh_expiry_days: i64 = std::env::var("REFRESH_TOKEN_EXPIRY_DAYS")
            .unwrap_or_else(|_| DEFAULT_REFRESH_EXPIRY_DAYS.to_string())
            .parse()
            .expect("REFRESH_TOKEN_EXPIRY_DAYS must be a valid i64");

        Self {
            access_secret,
            refresh_secret,
            access_expiry_mins,
            refresh_expiry_days,
        }
    }
}

/// A freshly signed token plus its expiry, ready to persist.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: Timestamp,
}

/// Signs and verifies access and refresh tokens from domain payloads.
#[derive(Clone)]
pub struct TokenService {
    config: TokenConfig,
}

impl TokenService {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }

    /// Sign a short-lived access token for the given user.
    pub fn sign_access(
        &self,
        user_id: DbId,
        username: &str,
    ) -> Result<SignedToken, jsonwebtoken::errors::Error> {
        let ttl = chrono::Duration::minutes(self.config.access_expiry_mins);
        sign(user_id, username, &self.config.access_secret, ttl)
    }

    /// Sign a long-lived refresh token for the given user.
    pub fn sign_refresh(
        &self,
        user_id: DbId,
        username: &str,
    ) -> Result<SignedToken, jsonwebtoken::errors::Error> {
        let ttl = chrono::Duration::days(self.config.refresh_expiry_days);
        sign(user_id, username, &self.config.refresh_secret, ttl)
    }

    /// Verify an access token's signature and expiry.
    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        verify(token, &self.config.access_secret)
    }

    /// Verify a refresh token's signature and expiry.
    ///
    /// Passing here is necessary but not sufficient: the stored record's
    /// `expires_at` and revocation flag remain authoritative.
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        verify(token, &self.config.refresh_secret)
    }
}

fn sign(
    user_id: DbId,
    username: &str,
    secret: &str,
    ttl: chrono::Duration,
) -> Result<SignedToken, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let expires_at = now + ttl;

    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: expires_at.timestamp(),
        iat: now.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };

    let token = encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(SignedToken { token, expires_at })
}

fn verify(token: &str, secret: &str) -> Result<Claims, TokenError> {
    let result = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(), // HS256, validates exp
    );
    match result {
        Ok(data) => Ok(data.claims),
        Err(e) => match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(TokenError::Expired),
            _ => Err(TokenError::Invalid),
        },
    }
}
