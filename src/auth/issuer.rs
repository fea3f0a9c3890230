/// Token Issuer
///
/// Mints access tokens through the configured signer and reports when they
/// will lapse. The reported expiry is informational; enforcement belongs to
/// whoever verifies the access token.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::auth::jwt::AccessTokenSigner;
use crate::auth::refresh_token::Subject;
use crate::error::AppError;

#[derive(Clone)]
pub struct TokenIssuer {
    signer: Arc<dyn AccessTokenSigner>,
    access_token_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(signer: Arc<dyn AccessTokenSigner>, access_token_ttl: Duration) -> Self {
        Self {
            signer,
            access_token_ttl,
        }
    }

    pub fn issue_access_token(
        &self,
        subject: &Subject,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        self.signer.sign_access_token(subject, now)
    }

    pub fn access_token_expiry(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
        now.checked_add_signed(self.access_token_ttl)
            .ok_or_else(|| AppError::Internal("Access token expiry out of range".to_string()))
    }
}
