//! HTTP-level integration tests for the auth endpoints.
//!
//! Cover registration, login anti-enumeration, refresh rotation, idempotent
//! logout, and uniqueness under concurrent registration.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{body_json, post_json, post_json_auth};
use futures::FutureExt;
use sqlx::PgPool;

use keygate_api::auth::tokens::TokenService;
use keygate_api::txn::with_transaction;
use keygate_db::models::token::CreateToken;
use keygate_db::repositories::RefreshTokenRepo;
use keygate_db::session::{PgSession, PgSessionFactory};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Register a user via the API and return the JSON response containing
/// `accessToken`, `refreshToken`, and `user` info.
async fn register_user(app: axum::Router, username: &str, password: &str) -> serde_json::Value {
    let body = serde_json::json!({ "username": username, "password": password });
    let response = post_json(app, "/api/v1/auth/register", body).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

/// Log in via the API, asserting success.
async fn login_user(app: axum::Router, username: &str, password: &str) -> serde_json::Value {
    let body = serde_json::json!({ "username": username, "password": password });
    let response = post_json(app, "/api/v1/auth/login", body).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

// ---------------------------------------------------------------------------
// Register
// ---------------------------------------------------------------------------

/// Successful registration returns 201 with both tokens and minimal user info.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_register_success(pool: PgPool) {
    let app = common::build_test_app(pool);

    let json = register_user(app, "alice01", "Str0ngPass1").await;

    assert!(json["accessToken"].is_string(), "must contain accessToken");
    assert!(json["refreshToken"].is_string(), "must contain refreshToken");
    assert!(json["user"]["id"].is_number());
    assert_eq!(json["user"]["username"], "alice01");
    assert!(
        json["user"].get("passwordHash").is_none() && json["user"].get("password_hash").is_none(),
        "password hash must never appear on the wire"
    );
}

/// An immediate repeat with the same username returns 409.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_register_duplicate_username(pool: PgPool) {
    let app = common::build_test_app(pool);

    register_user(app.clone(), "alice01", "Str0ngPass1").await;

    let body = serde_json::json!({ "username": "alice01", "password": "OtherPass1" });
    let response = post_json(app, "/api/v1/auth/register", body).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

/// A too-short password is rejected before anything is stored.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_register_weak_password(pool: PgPool) {
    let app = common::build_test_app(pool.clone());

    let body = serde_json::json!({ "username": "alice01", "password": "short" });
    let response = post_json(app.clone(), "/api/v1/auth/register", body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The username must still be free afterwards.
    let json = register_user(app, "alice01", "Str0ngPass1").await;
    assert_eq!(json["user"]["username"], "alice01");
}

/// Two concurrent registrations with the same username resolve to exactly
/// one success and one conflict, never two successes.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_register_race_single_winner(pool: PgPool) {
    let app = common::build_test_app(pool);

    let body = serde_json::json!({ "username": "raceuser", "password": "Str0ngPass1" });
    let (a, b) = tokio::join!(
        post_json(app.clone(), "/api/v1/auth/register", body.clone()),
        post_json(app.clone(), "/api/v1/auth/register", body.clone()),
    );

    let mut statuses = vec![a.status(), b.status()];
    statuses.sort();
    assert_eq!(
        statuses,
        vec![StatusCode::CREATED, StatusCode::CONFLICT],
        "exactly one registration may win"
    );
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

/// Login succeeds with correct credentials and issues a fresh pair.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_login_success(pool: PgPool) {
    let app = common::build_test_app(pool);
    let registered = register_user(app.clone(), "loginuser", "Str0ngPass1").await;

    let json = login_user(app, "loginuser", "Str0ngPass1").await;

    assert!(json["accessToken"].is_string());
    assert!(json["refreshToken"].is_string());
    assert_eq!(json["user"]["username"], "loginuser");
    assert_ne!(
        json["accessToken"], registered["accessToken"],
        "each login issues new tokens"
    );
}

/// Wrong password and nonexistent username both return 401 with textually
/// identical messages, so usernames cannot be enumerated.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_login_failure_messages_are_identical(pool: PgPool) {
    let app = common::build_test_app(pool);
    register_user(app.clone(), "realuser", "Str0ngPass1").await;

    let wrong_password = post_json(
        app.clone(),
        "/api/v1/auth/login",
        serde_json::json!({ "username": "realuser", "password": "WrongPass1" }),
    )
    .await;
    let no_such_user = post_json(
        app,
        "/api/v1/auth/login",
        serde_json::json!({ "username": "ghost", "password": "WrongPass1" }),
    )
    .await;

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(no_such_user.status(), StatusCode::UNAUTHORIZED);

    let a = body_json(wrong_password).await;
    let b = body_json(no_such_user).await;
    assert_eq!(a["error"], b["error"], "messages must be identical");
}

/// Repeated issuance for the same user yields pairwise-distinct token strings.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_issued_tokens_are_pairwise_distinct(pool: PgPool) {
    let app = common::build_test_app(pool);
    let first = register_user(app.clone(), "denseuser", "Str0ngPass1").await;

    let mut tokens = vec![
        first["accessToken"].as_str().unwrap().to_string(),
        first["refreshToken"].as_str().unwrap().to_string(),
    ];
    for _ in 0..3 {
        let json = login_user(app.clone(), "denseuser", "Str0ngPass1").await;
        tokens.push(json["accessToken"].as_str().unwrap().to_string());
        tokens.push(json["refreshToken"].as_str().unwrap().to_string());
    }

    let mut deduped = tokens.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), tokens.len(), "all tokens must be distinct");
}

// ---------------------------------------------------------------------------
// Refresh
// ---------------------------------------------------------------------------

/// A valid refresh token returns a new pair without user info.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_refresh_success(pool: PgPool) {
    let app = common::build_test_app(pool);
    let registered = register_user(app.clone(), "refresher", "Str0ngPass1").await;
    let refresh_token = registered["refreshToken"].as_str().unwrap();

    let response = post_json(
        app,
        "/api/v1/auth/refresh",
        serde_json::json!({ "refreshToken": refresh_token }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json["accessToken"].is_string());
    assert!(json["refreshToken"].is_string());
    assert!(json.get("user").is_none(), "refresh response has no user");
    assert_ne!(json["refreshToken"].as_str().unwrap(), refresh_token);
}

/// Reusing a just-consumed refresh token yields 401 even though its embedded
/// expiry has not elapsed (single-use rotation).
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_refresh_rotation_consumes_token(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let registered = register_user(app.clone(), "rotator", "Str0ngPass1").await;
    let refresh_token = registered["refreshToken"].as_str().unwrap();

    let first = post_json(
        app.clone(),
        "/api/v1/auth/refresh",
        serde_json::json!({ "refreshToken": refresh_token }),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);

    // The consumed record is revoked, not deleted: issuance history is kept.
    let record = RefreshTokenRepo::find_by_token(&pool, refresh_token)
        .await
        .expect("lookup should succeed")
        .expect("record should still exist");
    assert!(record.is_revoked);

    let second = post_json(
        app,
        "/api/v1/auth/refresh",
        serde_json::json!({ "refreshToken": refresh_token }),
    )
    .await;
    assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
}

/// A syntactically invalid refresh token is rejected without a DB lookup.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_refresh_garbage_token(pool: PgPool) {
    let app = common::build_test_app(pool);

    let response = post_json(
        app,
        "/api/v1/auth/refresh",
        serde_json::json!({ "refreshToken": "not-a-jwt" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// The stored `expires_at` is authoritative over the token's own `exp`
/// claim: a record shortened server-side to a past expiry is rejected with
/// the "expired" message even though the JWT itself still verifies.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_refresh_stored_expiry_overrides_token_exp(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let registered = register_user(app.clone(), "shortened", "Str0ngPass1").await;
    let user_id = registered["user"]["id"].as_i64().unwrap();

    // Sign a refresh token whose embedded exp lies days in the future, then
    // store it with an expires_at already in the past.
    let tokens = TokenService::new(common::test_config().tokens);
    let signed = tokens.sign_refresh(user_id, "shortened").expect("sign");
    assert!(signed.expires_at > Utc::now());

    let factory = PgSessionFactory::new(pool);
    let token = signed.token.clone();
    with_transaction(&factory, move |session: &mut PgSession| {
        async move {
            RefreshTokenRepo::create(
                session,
                &CreateToken {
                    user_id,
                    token,
                    expires_at: Utc::now() - Duration::hours(1),
                },
            )
            .await?;
            Ok(())
        }
        .boxed()
    })
    .await
    .expect("insert should succeed");

    let response = post_json(
        app,
        "/api/v1/auth/refresh",
        serde_json::json!({ "refreshToken": signed.token }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let json = body_json(response).await;
    assert_eq!(
        json["error"], "Refresh token has expired",
        "stored expiry must produce the expired message, not invalid/revoked"
    );
}

/// An access token must not pass as a refresh token (distinct secrets).
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_refresh_rejects_access_token(pool: PgPool) {
    let app = common::build_test_app(pool);
    let registered = register_user(app.clone(), "crosser", "Str0ngPass1").await;
    let access_token = registered["accessToken"].as_str().unwrap();

    let response = post_json(
        app,
        "/api/v1/auth/refresh",
        serde_json::json!({ "refreshToken": access_token }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Logout
// ---------------------------------------------------------------------------

/// Logout revokes both tokens and repeating the call succeeds identically.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_logout_is_idempotent(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let registered = register_user(app.clone(), "leaver", "Str0ngPass1").await;
    let access_token = registered["accessToken"].as_str().unwrap();
    let refresh_token = registered["refreshToken"].as_str().unwrap();

    let body = serde_json::json!({ "refreshToken": refresh_token });

    let first = post_json_auth(app.clone(), "/api/v1/auth/logout", body.clone(), access_token).await;
    assert_eq!(first.status(), StatusCode::OK);
    let json = body_json(first).await;
    assert!(json["message"].is_string());
    assert!(json["loggedOutAt"].is_string());

    // The refresh record is now revoked.
    let record = RefreshTokenRepo::find_by_token(&pool, refresh_token)
        .await
        .expect("lookup should succeed")
        .expect("record should exist");
    assert!(record.is_revoked);

    // Second call with the same pair: identical success, never an error.
    let second = post_json_auth(app, "/api/v1/auth/logout", body, access_token).await;
    assert_eq!(second.status(), StatusCode::OK);
}

/// A consumed refresh token no longer works after logout.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_refresh_after_logout_fails(pool: PgPool) {
    let app = common::build_test_app(pool);
    let registered = register_user(app.clone(), "ghosted", "Str0ngPass1").await;
    let access_token = registered["accessToken"].as_str().unwrap();
    let refresh_token = registered["refreshToken"].as_str().unwrap();

    let logout = post_json_auth(
        app.clone(),
        "/api/v1/auth/logout",
        serde_json::json!({ "refreshToken": refresh_token }),
        access_token,
    )
    .await;
    assert_eq!(logout.status(), StatusCode::OK);

    let refresh = post_json(
        app,
        "/api/v1/auth/refresh",
        serde_json::json!({ "refreshToken": refresh_token }),
    )
    .await;
    assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);
}

/// Tokens belonging to different users are rejected before any revocation.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_logout_subject_mismatch(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let alice = register_user(app.clone(), "alice01", "Str0ngPass1").await;
    let bob = register_user(app.clone(), "bob01", "Str0ngPass1").await;

    let response = post_json_auth(
        app,
        "/api/v1/auth/logout",
        serde_json::json!({ "refreshToken": bob["refreshToken"].as_str().unwrap() }),
        alice["accessToken"].as_str().unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Neither token was revoked by the failed call.
    let bob_record = RefreshTokenRepo::find_by_token(&pool, bob["refreshToken"].as_str().unwrap())
        .await
        .expect("lookup should succeed")
        .expect("record should exist");
    assert!(!bob_record.is_revoked);
}

/// Logout without an Authorization header is rejected.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_logout_requires_bearer_header(pool: PgPool) {
    let app = common::build_test_app(pool);

    let response = post_json(
        app,
        "/api/v1/auth/logout",
        serde_json::json!({ "refreshToken": "whatever" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
