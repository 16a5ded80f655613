use axum::http::StatusCode;
use serde_json::json;

use crate::common::{test_email, test_password, TestContext};

#[tokio::test]
async fn login_with_correct_credentials_returns_token_pair() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.signup(&email).await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "email": &email,
            "password": test_password()
        }))
        .await;

    response.assert_status(StatusCode::OK);

    let body: serde_json::Value = response.json();
    assert!(body["access_token"].as_str().is_some());
    assert!(body["refresh_token"].as_str().is_some());
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["expires_in"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn login_with_wrong_password_returns_unauthorized() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.signup(&email).await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "email": &email,
            "password": "WrongPassword123!"
        }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "INVALID_CREDENTIALS");
    assert!(body.get("access_token").is_none());
}

#[tokio::test]
async fn login_with_unknown_email_is_indistinguishable_from_wrong_password() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.signup(&email).await;

    let unknown = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "email": test_email(),
            "password": test_password()
        }))
        .await;

    let wrong = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "email": &email,
            "password": "WrongPassword123!"
        }))
        .await;

    // Same status and code either way, so accounts cannot be enumerated.
    unknown.assert_status(StatusCode::UNAUTHORIZED);
    wrong.assert_status(StatusCode::UNAUTHORIZED);

    let unknown_body: serde_json::Value = unknown.json();
    let wrong_body: serde_json::Value = wrong.json();
    assert_eq!(unknown_body["error"], wrong_body["error"]);
}

#[tokio::test]
async fn login_with_malformed_email_returns_bad_request() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "email": "not-an-email",
            "password": test_password()
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_with_missing_body_returns_unprocessable() {
    let ctx = TestContext::new().await;

    let response = ctx.server.post("/auth/login").json(&json!({})).await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}
