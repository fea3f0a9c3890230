/// Session Routes
///
/// Exchange of a refresh token for a fresh access token.

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::RefreshTokenService;
use crate::error::{AppError, ErrorContext, ValidationError};

const MAX_REFRESH_TOKEN_LENGTH: usize = 512;

/// Token refresh request
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRefreshRequest {
    pub refresh_token: String,
}

impl TokenRefreshRequest {
    /// Boundary validation: the value must be non-blank and of sane length
    fn validated(&self) -> Result<&str, ValidationError> {
        let token = self.refresh_token.trim();
        if token.is_empty() {
            return Err(ValidationError::EmptyField("refreshToken".to_string()));
        }
        if token.len() > MAX_REFRESH_TOKEN_LENGTH {
            return Err(ValidationError::TooLong(
                "refreshToken".to_string(),
                MAX_REFRESH_TOKEN_LENGTH,
            ));
        }
        Ok(token)
    }
}

/// POST /auth/refresh-token
///
/// Exchange a refresh token for a new access token.
///
/// # Errors
/// - 400: Blank or oversized refresh token
/// - 401: Refresh token unknown (`TOKEN_NOT_FOUND`) or expired (`TOKEN_EXPIRED`)
/// - 503: Database unavailable
/// - 500: Internal server error
pub async fn refresh_token(
    form: web::Json<TokenRefreshRequest>,
    service: web::Data<RefreshTokenService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");
    let token = form.validated()?;

    match service.refresh(token).await {
        Ok(response) => {
            tracing::debug!(request_id = %context.request_id, "Refresh request completed");
            Ok(HttpResponse::Ok().json(response))
        }
        Err(e) => {
            context.log_error(&e);
            Err(e)
        }
    }
}
