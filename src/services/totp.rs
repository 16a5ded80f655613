use std::time::{SystemTime, UNIX_EPOCH};

use totp_rs::{Algorithm, Secret, TOTP};

/// One-time enrollment material handed back when 2FA is switched on.
/// The secret is never re-derivable; a re-enroll replaces it.
#[derive(Debug, Clone)]
pub struct TwoFactorEnrollment {
    pub secret: String,
    pub provisioning_uri: String,
}

#[derive(Debug, thiserror::Error)]
#[error("totp provider error: {0}")]
pub struct TotpError(String);

/// RFC 6238 time-based one-time passwords: SHA-1, 6 digits, 30 second
/// steps, one step of clock-skew tolerance either side.
pub struct TotpService {
    issuer: String,
}

impl TotpService {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    /// Create a fresh random secret for `account` and the otpauth:// URI
    /// an authenticator app can be pointed at.
    pub fn generate_enrollment(&self, account: &str) -> Result<TwoFactorEnrollment, TotpError> {
        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|e| TotpError(format!("secret bytes: {e:?}")))?;

        let totp = self.build(secret_bytes, account.to_string())?;

        Ok(TwoFactorEnrollment {
            secret: secret.to_encoded().to_string(),
            provisioning_uri: totp.get_url(),
        })
    }

    /// Predicate check of a submitted code against a stored base32 secret.
    /// Any mismatch, malformed secret included, is `false`; rejection is an
    /// expected outcome here, not a failure.
    pub fn validate(&self, code: &str, secret: &str) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.validate_at(code, secret, now)
    }

    fn validate_at(&self, code: &str, secret: &str, timestamp: u64) -> bool {
        let Ok(secret_bytes) = Secret::Encoded(secret.to_string()).to_bytes() else {
            return false;
        };
        let Ok(totp) = self.build(secret_bytes, String::new()) else {
            return false;
        };
        totp.check(code, timestamp)
    }

    fn build(&self, secret_bytes: Vec<u8>, account: String) -> Result<TOTP, TotpError> {
        TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret_bytes,
            Some(self.issuer.clone()),
            account,
        )
        .map_err(|e| TotpError(format!("totp init: {e}")))
    }
}
