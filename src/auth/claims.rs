/// JWT Claims structure
///
/// Payload of an access token minted on refresh: the subject's username plus
/// the standard RFC 7519 claims.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::refresh_token::Subject;
use crate::error::{AppError, AuthError};

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Stable user id
    pub uid: String,
    /// Expiration time (Unix timestamp, seconds)
    pub exp: i64,
    /// Issued at (Unix timestamp, seconds)
    pub iat: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    /// Create claims for `subject` issued at `issued_at` and valid for `ttl`
    ///
    /// # Errors
    /// Returns an internal error if the expiry falls outside the representable range
    pub fn new(
        subject: &Subject,
        issued_at: DateTime<Utc>,
        ttl: Duration,
        issuer: String,
    ) -> Result<Self, AppError> {
        let expires_at = issued_at
            .checked_add_signed(ttl)
            .ok_or_else(|| AppError::Internal("Access token expiry out of range".to_string()))?;

        Ok(Self {
            sub: subject.username.clone(),
            uid: subject.id.to_string(),
            exp: expires_at.timestamp(),
            iat: issued_at.timestamp(),
            iss: issuer,
        })
    }

    /// Extract the user id from claims
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.uid).map_err(|_| AppError::Auth(AuthError::TokenInvalid))
    }

    /// The token is no longer valid from its `exp` second onwards
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }
}
