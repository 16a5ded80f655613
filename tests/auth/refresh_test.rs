use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;

use auth_api::modules::auth::model::{Role, User};
use auth_api::services::jwt::{TokenConfig, TokenService};

use crate::common::{test_email, TestContext, ACCESS_SECRET, REFRESH_SECRET};

fn token_service() -> TokenService {
    TokenService::new(TokenConfig::new(ACCESS_SECRET, REFRESH_SECRET))
}

fn user_record(id: &str, email: &str) -> User {
    let now = Utc::now();
    User {
        id: id.into(),
        username: "testuser".into(),
        email: email.into(),
        password_hash: String::new(),
        role: Role::Client,
        two_factor_enabled: false,
        totp_secret: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn refresh_with_valid_tokens_returns_new_access_token() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let (access_token, refresh_token) = ctx.signup_and_login(&email).await;

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({
            "refresh_token": refresh_token,
            "access_token": access_token
        }))
        .await;

    response.assert_status(StatusCode::OK);

    let body: serde_json::Value = response.json();
    let new_access = body["access_token"].as_str().unwrap();
    assert_eq!(body["token_type"], "Bearer");

    // The minted token verifies against the same secrets and keeps identity.
    let claims = token_service().verify_access(new_access).unwrap();
    assert_eq!(claims.email, email);
    assert!(claims.exp > Utc::now().timestamp());
}

#[tokio::test]
async fn refresh_accepts_an_expired_access_token() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let user_id = ctx.signup(&email).await;
    let (_, refresh_token) = {
        // Log in for a real refresh token.
        let response = ctx
            .server
            .post("/auth/login")
            .json(&json!({
                "email": &email,
                "password": crate::common::test_password()
            }))
            .await;
        let body: serde_json::Value = response.json();
        (
            body["access_token"].as_str().unwrap().to_string(),
            body["refresh_token"].as_str().unwrap().to_string(),
        )
    };

    // Mint an access token that expired five minutes ago, signed with the
    // server's secrets.
    let mut config = TokenConfig::new(ACCESS_SECRET, REFRESH_SECRET);
    config.access_ttl = Duration::minutes(-5);
    let expired_access = TokenService::new(config)
        .issue_session(&user_record(&user_id, &email))
        .unwrap()
        .access_token;

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({
            "refresh_token": refresh_token,
            "access_token": expired_access
        }))
        .await;

    response.assert_status(StatusCode::OK);

    let body: serde_json::Value = response.json();
    let claims = token_service()
        .verify_access(body["access_token"].as_str().unwrap())
        .unwrap();
    assert_eq!(claims.sub, user_id);
}

#[tokio::test]
async fn refresh_with_expired_refresh_token_returns_unauthorized() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let user_id = ctx.signup(&email).await;

    let mut config = TokenConfig::new(ACCESS_SECRET, REFRESH_SECRET);
    config.refresh_ttl = Duration::minutes(-5);
    let session = TokenService::new(config)
        .issue_session(&user_record(&user_id, &email))
        .unwrap();

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({
            "refresh_token": session.refresh_token,
            "access_token": session.access_token
        }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "TOKEN_EXPIRED");
}

#[tokio::test]
async fn refresh_with_forged_refresh_token_returns_unauthorized() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let (access_token, _) = ctx.signup_and_login(&email).await;

    // Refresh token signed with the wrong secret.
    let forged = TokenService::new(TokenConfig::new(ACCESS_SECRET, "attacker-secret"))
        .issue_session(&user_record("someone", &email))
        .unwrap()
        .refresh_token;

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({
            "refresh_token": forged,
            "access_token": access_token
        }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn refresh_with_access_token_in_refresh_slot_is_rejected() {
    let ctx = TestContext::new().await;
    let (access_token, _) = ctx.signup_and_login(&test_email()).await;

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({
            "refresh_token": access_token,
            "access_token": access_token
        }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_with_garbage_tokens_returns_bad_request() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({
            "refresh_token": "not.a.token",
            "access_token": "also.not.a.token"
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "MALFORMED_TOKEN");
}
