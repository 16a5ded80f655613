use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::modules::auth::model::{Role, User};

/// Discriminant claim stamped into every token so one class can never be
/// replayed as another, even where two classes share a signing secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenClass {
    Access,
    Refresh,
    Pending2fa,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub role: Role,
    pub email: String,
    pub token_use: TokenClass,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub token_use: TokenClass,
    pub exp: i64,
    pub iat: i64,
}

/// Claims of the short-lived token handed out after a correct password when
/// a TOTP code is still owed. Redeemable for a session until it expires; a
/// wrong code does not consume it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTwoFactorClaims {
    pub sub: String,
    pub role: Role,
    pub email: String,
    pub token_use: TokenClass,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token signature or algorithm mismatch")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
    #[error("unexpected token class")]
    WrongClass,
    #[error("token encoding failed: {0}")]
    Encode(String),
}

/// Signing secrets and lifetimes, passed in explicitly so tests can run
/// several services with distinct secrets side by side.
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub pending_ttl: Duration,
}

impl TokenConfig {
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            pending_ttl: Duration::minutes(5),
        }
    }
}

pub struct TokenService {
    config: TokenConfig,
}

impl TokenService {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.config.access_ttl.num_seconds()
    }

    /// Mint the access + refresh pair for a fully authenticated user.
    pub fn issue_session(&self, user: &User) -> Result<SessionTokens, TokenError> {
        let now = Utc::now();

        let access = AccessClaims {
            sub: user.id.clone(),
            role: user.role,
            email: user.email.clone(),
            token_use: TokenClass::Access,
            exp: (now + self.config.access_ttl).timestamp(),
            iat: now.timestamp(),
        };

        let refresh = RefreshClaims {
            sub: user.id.clone(),
            token_use: TokenClass::Refresh,
            exp: (now + self.config.refresh_ttl).timestamp(),
            iat: now.timestamp(),
        };

        Ok(SessionTokens {
            access_token: self.sign(&access, &self.config.access_secret)?,
            refresh_token: self.sign(&refresh, &self.config.refresh_secret)?,
            expires_in: self.config.access_ttl.num_seconds(),
        })
    }

    /// Mint the intermediate token issued in lieu of a session while a TOTP
    /// code is outstanding. Signed with the access secret; `token_use` keeps
    /// the classes apart.
    pub fn issue_pending_2fa(&self, user: &User) -> Result<String, TokenError> {
        let now = Utc::now();

        let claims = PendingTwoFactorClaims {
            sub: user.id.clone(),
            role: user.role,
            email: user.email.clone(),
            token_use: TokenClass::Pending2fa,
            exp: (now + self.config.pending_ttl).timestamp(),
            iat: now.timestamp(),
        };

        self.sign(&claims, &self.config.access_secret)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify(token, TokenClass::Access, &self.config.access_secret, true)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.verify(token, TokenClass::Refresh, &self.config.refresh_secret, true)
    }

    pub fn verify_pending_2fa(&self, token: &str) -> Result<PendingTwoFactorClaims, TokenError> {
        self.verify(token, TokenClass::Pending2fa, &self.config.access_secret, true)
    }

    /// Mint a fresh access token from a refresh token plus the last access
    /// token. Identity claims come from the access token, which must carry a
    /// valid signature but may be past its expiry; the refresh token is
    /// verified in full. The refresh token is not rotated on use.
    pub fn refresh_session(
        &self,
        refresh_token: &str,
        last_access_token: &str,
    ) -> Result<String, TokenError> {
        self.verify_refresh(refresh_token)?;

        let old: AccessClaims = self.verify(
            last_access_token,
            TokenClass::Access,
            &self.config.access_secret,
            false,
        )?;

        let now = Utc::now();
        let claims = AccessClaims {
            sub: old.sub,
            role: old.role,
            email: old.email,
            token_use: TokenClass::Access,
            exp: (now + self.config.access_ttl).timestamp(),
            iat: now.timestamp(),
        };

        self.sign(&claims, &self.config.access_secret)
    }

    fn sign<T: Serialize>(&self, claims: &T, secret: &str) -> Result<String, TokenError> {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| TokenError::Encode(e.to_string()))
    }

    fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        expected: TokenClass,
        secret: &str,
        check_exp: bool,
    ) -> Result<T, TokenError> {
        let key = DecodingKey::from_secret(secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = check_exp;

        // Two-step decode: establish the class marker first, then bind the
        // concrete claim shape. A token without a marker is never accepted.
        let probe = decode::<ClassProbe>(token, &key, &validation).map_err(map_decode_error)?;
        if probe.claims.token_use != Some(expected) {
            return Err(TokenError::WrongClass);
        }

        decode::<T>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::Malformed)
    }
}

#[derive(Deserialize)]
struct ClassProbe {
    token_use: Option<TokenClass>,
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> TokenError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::ImmatureSignature => TokenError::InvalidSignature,
        _ => TokenError::Malformed,
    }
}
