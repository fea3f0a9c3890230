/// JWT signing and verification for access tokens

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::Claims;
use crate::auth::refresh_token::Subject;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// Produces signed access tokens for a subject.
///
/// The refresh flow treats the result as opaque.
pub trait AccessTokenSigner: Send + Sync {
    fn sign_access_token(
        &self,
        subject: &Subject,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AppError>;
}

/// HS256 signer backed by the configured shared secret
#[derive(Clone)]
pub struct JwtSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl JwtSigner {
    pub fn new(config: &JwtSettings) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            ttl: config.access_token_ttl(),
        }
    }

    /// Validate an access token as of `now` and extract its claims
    ///
    /// # Errors
    /// Returns `TokenInvalid` if the token is malformed, tampered with,
    /// expired at `now`, minted by another issuer, or carries a bad `uid`
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        // Expiry is checked against the caller's clock below
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("JWT validation error: {}", e);
                AppError::Auth(AuthError::TokenInvalid)
            })?;

        if claims.is_expired_at(now) {
            tracing::warn!("JWT validation error: token expired");
            return Err(AppError::Auth(AuthError::TokenInvalid));
        }
        claims.user_id()?;

        Ok(claims)
    }
}

impl AccessTokenSigner for JwtSigner {
    fn sign_access_token(
        &self,
        subject: &Subject,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let claims = Claims::new(subject, issued_at, self.ttl, self.issuer.clone())?;

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }
}
