use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use validator::Validate;

use crate::AppState;

use super::error::AuthError;
use super::middleware::{bearer_token, AuthUser};
use super::model::User;
use super::schema::{
    Enable2faResponse, ErrorResponse, LoginRequest, LoginRequires2faResponse, LoginResponse,
    RefreshTokenRequest, RefreshTokenResponse, SignupRequest, SignupResponse, UserResponse,
    VerifyTotpRequest,
};
use super::service::{Credentials, LoginOutcome, SignUpInput};

type ErrorReply = (StatusCode, Json<ErrorResponse>);

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), ErrorReply> {
    if let Err(e) = req.validate() {
        return Err(
            AuthError::ValidationFailed(e.to_string()).to_response(state.expose_errors)
        );
    }

    let user = state
        .auth
        .sign_up(SignUpInput {
            username: req.username,
            email: req.email,
            password: req.password,
            role: req.role,
        })
        .await
        .map_err(|e| e.to_response(state.expose_errors))?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            user: user_response(user),
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ErrorReply> {
    if let Err(e) = req.validate() {
        return Err(
            AuthError::ValidationFailed(e.to_string()).to_response(state.expose_errors)
        );
    }

    let outcome = state
        .auth
        .login(Credentials {
            email: req.email,
            password: req.password,
        })
        .await
        .map_err(|e| e.to_response(state.expose_errors))?;

    let response = match outcome {
        LoginOutcome::Session(session) => Json(LoginResponse {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            token_type: "Bearer",
            expires_in: session.expires_in,
        })
        .into_response(),
        LoginOutcome::TwoFactorRequired { pending_token } => Json(LoginRequires2faResponse {
            requires_2fa: true,
            two_factor_token: pending_token,
        })
        .into_response(),
    };

    Ok(response)
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<Json<RefreshTokenResponse>, ErrorReply> {
    let access_token = state
        .auth
        .refresh_session(&req.refresh_token, &req.access_token)
        .await
        .map_err(|e| e.to_response(state.expose_errors))?;

    Ok(Json(RefreshTokenResponse {
        access_token,
        token_type: "Bearer",
        expires_in: state.auth.access_ttl_secs(),
    }))
}

pub async fn enable_2fa(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<Enable2faResponse>, ErrorReply> {
    let enrollment = state
        .auth
        .enable_two_factor(&claims.sub, &claims.email)
        .await
        .map_err(|e| e.to_response(state.expose_errors))?;

    Ok(Json(Enable2faResponse {
        secret: enrollment.secret,
        qr_code: enrollment.provisioning_uri,
    }))
}

pub async fn verify_totp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<VerifyTotpRequest>,
) -> Result<Json<LoginResponse>, ErrorReply> {
    let pending_token = bearer_token(&headers)
        .ok_or_else(|| AuthError::InvalidPendingSession.to_response(state.expose_errors))?;

    let session = state
        .auth
        .verify_two_factor(pending_token, &req.code)
        .await
        .map_err(|e| e.to_response(state.expose_errors))?;

    Ok(Json(LoginResponse {
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        token_type: "Bearer",
        expires_in: session.expires_in,
    }))
}

fn user_response(user: User) -> UserResponse {
    UserResponse {
        id: user.id,
        username: user.username,
        email: user.email,
        role: user.role,
        two_factor_enabled: user.two_factor_enabled,
        created_at: user.created_at,
        updated_at: user.updated_at,
    }
}
