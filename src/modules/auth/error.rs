use axum::http::StatusCode;
use axum::Json;

use super::schema::ErrorResponse;
use super::store::StoreError;
use crate::services::jwt::TokenError;

/// Failure taxonomy of the authentication core. Unknown email and wrong
/// password both collapse into `InvalidCredentials` so responses cannot be
/// used to enumerate accounts.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("email already exists")]
    EmailAlreadyExists,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("pending two-factor session is invalid or expired")]
    InvalidPendingSession,

    #[error("invalid TOTP code")]
    InvalidTotp,

    #[error("token expired")]
    TokenExpired,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("malformed token")]
    MalformedToken,

    #[error("unexpected token class")]
    WrongTokenClass,

    #[error("user not found")]
    UserNotFound,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code for client-side branching.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::EmailAlreadyExists => "EMAIL_EXISTS",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::InvalidPendingSession => "INVALID_PENDING_SESSION",
            Self::InvalidTotp => "INVALID_TOTP",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::MalformedToken => "MALFORMED_TOKEN",
            Self::WrongTokenClass => "WRONG_TOKEN_CLASS",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            Self::EmailAlreadyExists => StatusCode::CONFLICT,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::InvalidPendingSession => StatusCode::UNAUTHORIZED,
            Self::InvalidTotp => StatusCode::UNAUTHORIZED,
            Self::TokenExpired => StatusCode::UNAUTHORIZED,
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::MalformedToken => StatusCode::BAD_REQUEST,
            Self::WrongTokenClass => StatusCode::UNAUTHORIZED,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build the HTTP error envelope. With `expose_internal` off (production)
    /// the detail of `Internal` is swapped for a generic message; the code is
    /// kept either way.
    pub fn to_response(&self, expose_internal: bool) -> (StatusCode, Json<ErrorResponse>) {
        let message = match self {
            Self::Internal(_) if !expose_internal => {
                "Something went wrong, try again later".to_string()
            }
            other => other.to_string(),
        };

        (
            self.status_code(),
            Json(ErrorResponse::with_message(self.code(), message)),
        )
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidSignature => Self::InvalidSignature,
            TokenError::Expired => Self::TokenExpired,
            TokenError::Malformed => Self::MalformedToken,
            TokenError::WrongClass => Self::WrongTokenClass,
            TokenError::Encode(detail) => Self::Internal(detail),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => Self::EmailAlreadyExists,
            StoreError::NotFound => Self::UserNotFound,
            StoreError::Database(e) => Self::Internal(e.to_string()),
        }
    }
}
