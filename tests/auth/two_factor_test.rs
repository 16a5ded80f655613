use axum::http::StatusCode;
use serde_json::json;

use auth_api::modules::auth::store::UserStore;

use crate::common::{test_email, test_password, totp_code, TestContext};

#[tokio::test]
async fn enable_2fa_returns_secret_and_qr_code() {
    let ctx = TestContext::new().await;
    let (access_token, _) = ctx.signup_and_login(&test_email()).await;

    let response = ctx
        .server
        .post("/auth/enable-2fa")
        .authorization_bearer(&access_token)
        .await;

    response.assert_status(StatusCode::OK);

    let body: serde_json::Value = response.json();
    assert!(body["secret"].as_str().is_some());
    assert!(body["qr_code"]
        .as_str()
        .unwrap()
        .starts_with("otpauth://totp/"));
}

#[tokio::test]
async fn enable_2fa_without_auth_returns_unauthorized() {
    let ctx = TestContext::new().await;

    let response = ctx.server.post("/auth/enable-2fa").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn enable_2fa_persists_flag_and_secret() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let user_id = ctx.signup(&email).await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "password": test_password() }))
        .await;
    let login: serde_json::Value = response.json();
    let access_token = login["access_token"].as_str().unwrap();

    let response = ctx
        .server
        .post("/auth/enable-2fa")
        .authorization_bearer(access_token)
        .await;
    let body: serde_json::Value = response.json();

    let user = ctx.store.find_by_id(&user_id).await.unwrap().unwrap();
    assert!(user.two_factor_enabled);
    assert_eq!(user.totp_secret.as_deref(), body["secret"].as_str());
}

#[tokio::test]
async fn login_with_2fa_enabled_returns_pending_token_not_session() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let (access_token, _) = ctx.signup_and_login(&email).await;

    ctx.server
        .post("/auth/enable-2fa")
        .authorization_bearer(&access_token)
        .await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "password": test_password() }))
        .await;

    response.assert_status(StatusCode::OK);

    let body: serde_json::Value = response.json();
    assert_eq!(body["requires_2fa"], true);
    assert!(body["two_factor_token"].as_str().is_some());
    // No session material leaks alongside the pending token.
    assert!(body.get("access_token").is_none());
    assert!(body.get("refresh_token").is_none());
}

#[tokio::test]
async fn verify_totp_with_valid_code_returns_session() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let (access_token, _) = ctx.signup_and_login(&email).await;

    let enable: serde_json::Value = ctx
        .server
        .post("/auth/enable-2fa")
        .authorization_bearer(&access_token)
        .await
        .json();
    let secret = enable["secret"].as_str().unwrap();

    let login: serde_json::Value = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "password": test_password() }))
        .await
        .json();
    let pending_token = login["two_factor_token"].as_str().unwrap();

    let response = ctx
        .server
        .post("/auth/verify-totp")
        .authorization_bearer(pending_token)
        .json(&json!({ "code": totp_code(secret) }))
        .await;

    response.assert_status(StatusCode::OK);

    let body: serde_json::Value = response.json();
    assert!(body["access_token"].as_str().is_some());
    assert!(body["refresh_token"].as_str().is_some());
    assert_eq!(body["token_type"], "Bearer");
}

#[tokio::test]
async fn verify_totp_with_wrong_code_keeps_pending_token_usable() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let (access_token, _) = ctx.signup_and_login(&email).await;

    let enable: serde_json::Value = ctx
        .server
        .post("/auth/enable-2fa")
        .authorization_bearer(&access_token)
        .await
        .json();
    let secret = enable["secret"].as_str().unwrap();

    let login: serde_json::Value = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "password": test_password() }))
        .await
        .json();
    let pending_token = login["two_factor_token"].as_str().unwrap();

    let wrong = ctx
        .server
        .post("/auth/verify-totp")
        .authorization_bearer(pending_token)
        .json(&json!({ "code": "000000" }))
        .await;

    wrong.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = wrong.json();
    assert_eq!(body["error"], "INVALID_TOTP");

    // A failed attempt does not consume the pending token.
    let retry = ctx
        .server
        .post("/auth/verify-totp")
        .authorization_bearer(pending_token)
        .json(&json!({ "code": totp_code(secret) }))
        .await;

    retry.assert_status(StatusCode::OK);
}

#[tokio::test]
async fn verify_totp_without_pending_token_returns_unauthorized() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/auth/verify-totp")
        .json(&json!({ "code": "123456" }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "INVALID_PENDING_SESSION");
}

#[tokio::test]
async fn verify_totp_rejects_an_access_token() {
    let ctx = TestContext::new().await;
    let (access_token, _) = ctx.signup_and_login(&test_email()).await;

    let response = ctx
        .server
        .post("/auth/verify-totp")
        .authorization_bearer(&access_token)
        .json(&json!({ "code": "123456" }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "INVALID_PENDING_SESSION");
}

#[tokio::test]
async fn pending_token_is_rejected_on_protected_routes() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let (access_token, _) = ctx.signup_and_login(&email).await;

    ctx.server
        .post("/auth/enable-2fa")
        .authorization_bearer(&access_token)
        .await;

    let login: serde_json::Value = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "password": test_password() }))
        .await
        .json();
    let pending_token = login["two_factor_token"].as_str().unwrap();

    // A pending token must never pass where an access token is required.
    let response = ctx
        .server
        .post("/auth/enable-2fa")
        .authorization_bearer(pending_token)
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "WRONG_TOKEN_CLASS");
}
