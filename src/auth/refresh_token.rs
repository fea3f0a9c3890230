/// Refresh Token records
///
/// Refresh tokens are:
/// - Cryptographically secure random 64-character strings (~380 bits)
/// - Hashed with SHA-256 before storage (the plaintext never reaches the store)
/// - Bound to exactly one subject, with an absolute expiry fixed at creation

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;

const TOKEN_LENGTH: usize = 64;

/// The identity a refresh token continues a session for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: Uuid,
    pub username: String,
}

impl Subject {
    pub fn new(id: Uuid, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// A persisted refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    /// Storage key
    pub id: Uuid,
    /// Plaintext value held by the client
    pub token: String,
    pub owner: Subject,
    pub issued_at: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
}

impl RefreshToken {
    /// Mint a new record for `owner` expiring `ttl` after `now`
    ///
    /// # Errors
    /// Returns an internal error if the expiry falls outside the representable range
    pub fn issue(owner: Subject, now: DateTime<Utc>, ttl: Duration) -> Result<Self, AppError> {
        let expiry_time = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AppError::Internal("Refresh token expiry out of range".to_string()))?;

        Ok(Self {
            id: Uuid::new_v4(),
            token: generate_refresh_token(),
            owner,
            issued_at: now,
            expiry_time,
        })
    }

    /// A token is no longer valid from its expiry instant onwards
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_time <= now
    }

    /// SHA-256 digest of the value, used as the lookup key at rest
    pub fn token_hash(&self) -> String {
        hash_token(&self.token)
    }
}

/// Generate a new refresh token value
///
/// Draws from the operating system CSPRNG and encodes as base62.
pub fn generate_refresh_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Hash a refresh token using SHA-256
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
