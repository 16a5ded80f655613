use std::sync::Arc;

use super::error::AuthError;
use super::model::{NewUser, Role, User};
use super::store::UserStore;
use crate::services::hashing;
use crate::services::jwt::{SessionTokens, TokenService};
use crate::services::totp::{TotpService, TwoFactorEnrollment};

/// Transient login credentials. Never persisted, never logged.
#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug)]
pub struct SignUpInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// A correct password yields either a full session or, when the account has
/// 2FA enabled, only a pending token to be redeemed with a TOTP code.
#[derive(Debug)]
pub enum LoginOutcome {
    Session(SessionTokens),
    TwoFactorRequired { pending_token: String },
}

/// Orchestrates credential verification, token issuance and the two-factor
/// enrollment/verification flow on top of the user store. Multi-step writes
/// (signup, 2FA enrollment) run inside a single store transaction; the
/// transaction is rolled back on any early exit by dropping it uncommitted.
pub struct AuthService {
    store: Arc<dyn UserStore>,
    tokens: Arc<TokenService>,
    totp: TotpService,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, tokens: Arc<TokenService>, totp: TotpService) -> Self {
        Self {
            store,
            tokens,
            totp,
        }
    }

    /// Create an account. A duplicate email surfaces as
    /// [`AuthError::EmailAlreadyExists`]; the insert itself is atomic.
    pub async fn sign_up(&self, input: SignUpInput) -> Result<User, AuthError> {
        let password_hash = hashing::hash_password(&input.password)
            .map_err(|e| AuthError::Internal(format!("password hashing: {e}")))?;

        let mut tx = self.store.begin().await?;
        let user = tx
            .create_user(NewUser {
                username: input.username,
                email: input.email,
                password_hash,
                role: input.role,
            })
            .await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, "new user created");
        Ok(user)
    }

    /// Verify credentials. Unknown email and wrong password are deliberately
    /// indistinguishable to the caller.
    pub async fn login(&self, creds: Credentials) -> Result<LoginOutcome, AuthError> {
        let user = self
            .store
            .find_by_email(&creds.email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let password_ok = hashing::verify_password(&creds.password, &user.password_hash)
            .map_err(|e| AuthError::Internal(format!("password verification: {e}")))?;
        if !password_ok {
            tracing::warn!(user_id = %user.id, "failed password check");
            return Err(AuthError::InvalidCredentials);
        }

        if user.two_factor_enabled {
            let pending_token = self.tokens.issue_pending_2fa(&user)?;
            tracing::info!(user_id = %user.id, "password accepted, TOTP outstanding");
            return Ok(LoginOutcome::TwoFactorRequired { pending_token });
        }

        let session = self.tokens.issue_session(&user)?;
        tracing::info!(user_id = %user.id, "user logged in");
        Ok(LoginOutcome::Session(session))
    }

    /// Redeem a pending-2FA token with a TOTP code for a full session. A
    /// wrong code leaves the pending token intact, so the caller may retry
    /// until the token itself expires.
    pub async fn verify_two_factor(
        &self,
        pending_token: &str,
        code: &str,
    ) -> Result<SessionTokens, AuthError> {
        let claims = self
            .tokens
            .verify_pending_2fa(pending_token)
            .map_err(|_| AuthError::InvalidPendingSession)?;

        let user = self
            .store
            .find_by_id(&claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let secret = user.totp_secret.as_deref().ok_or_else(|| {
            AuthError::Internal("two-factor enabled without a stored secret".into())
        })?;

        if !self.totp.validate(code, secret) {
            tracing::warn!(user_id = %user.id, "TOTP code rejected");
            return Err(AuthError::InvalidTotp);
        }

        let session = self.tokens.issue_session(&user)?;
        tracing::info!(user_id = %user.id, "TOTP verified, session issued");
        Ok(session)
    }

    /// Turn on 2FA for an existing account: flag flip and secret storage are
    /// one transaction, so the account is never left enabled but secretless.
    /// The enrollment material is returned exactly once; enabling again
    /// replaces the secret.
    pub async fn enable_two_factor(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<TwoFactorEnrollment, AuthError> {
        let mut tx = self.store.begin().await?;

        tx.set_two_factor_enabled(user_id, true).await?;

        let enrollment = self
            .totp
            .generate_enrollment(email)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        tx.store_totp_secret(user_id, &enrollment.secret).await?;
        tx.commit().await?;

        tracing::info!(user_id, "two-factor authentication enabled");
        Ok(enrollment)
    }

    /// Mint a fresh access token from a refresh token and the previous
    /// access token. The refresh token is not rotated on use.
    pub async fn refresh_session(
        &self,
        refresh_token: &str,
        access_token: &str,
    ) -> Result<String, AuthError> {
        let new_access = self.tokens.refresh_session(refresh_token, access_token)?;
        Ok(new_access)
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.tokens.access_ttl_secs()
    }
}
