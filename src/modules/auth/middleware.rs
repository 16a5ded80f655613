use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap, StatusCode};
use axum::Json;

use super::error::AuthError;
use super::schema::ErrorResponse;
use crate::services::jwt::AccessClaims;
use crate::AppState;

/// Extractor guarding authenticated routes: pulls the bearer access token
/// from the Authorization header and verifies it before the handler runs.
pub struct AuthUser(pub AccessClaims);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::with_message(
                "INVALID_ACCESS_TOKEN",
                "Missing or invalid Authorization header",
            )),
        ))?;

        let claims = state
            .tokens
            .verify_access(token)
            .map_err(|e| AuthError::from(e).to_response(state.expose_errors))?;

        Ok(AuthUser(claims))
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
