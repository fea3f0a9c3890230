/// Refresh Protocol
///
/// Orchestrates the two session operations:
///
/// - `create_refresh_token`: resolve a subject by username and persist a new
///   refresh token for it (called by the login flow).
/// - `refresh`: exchange a presented refresh token for a new access token.
///
/// A refresh attempt either completes with a full `TokenRefreshResponse` or is
/// rejected with an `AuthError`. An expired token is deleted before the
/// rejection is returned. Storage failures propagate unchanged.

use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDateTime, Timelike, Utc};
use serde::Serialize;

use crate::auth::directory::SubjectDirectory;
use crate::auth::issuer::TokenIssuer;
use crate::auth::jwt::JwtSigner;
use crate::auth::refresh_token::RefreshToken;
use crate::auth::store::RefreshTokenStore;
use crate::clock::Clock;
use crate::configuration::{JwtSettings, RefreshPolicy};
use crate::error::{AppError, AuthError};

/// Scheme prefix placed in front of every minted access token
pub const TOKEN_TYPE_PREFIX: &str = "Bearer ";

/// Successful refresh envelope
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expiry: String,
}

#[derive(Clone)]
pub struct RefreshTokenService {
    store: Arc<dyn RefreshTokenStore>,
    directory: Arc<dyn SubjectDirectory>,
    issuer: TokenIssuer,
    clock: Arc<dyn Clock>,
    refresh_token_ttl: Duration,
    policy: RefreshPolicy,
}

impl RefreshTokenService {
    pub fn new(
        store: Arc<dyn RefreshTokenStore>,
        directory: Arc<dyn SubjectDirectory>,
        issuer: TokenIssuer,
        clock: Arc<dyn Clock>,
        refresh_token_ttl: Duration,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            store,
            directory,
            issuer,
            clock,
            refresh_token_ttl,
            policy,
        }
    }

    /// Wire the service with an HS256 signer and the configured lifetimes
    pub fn from_settings(
        config: &JwtSettings,
        store: Arc<dyn RefreshTokenStore>,
        directory: Arc<dyn SubjectDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let issuer = TokenIssuer::new(Arc::new(JwtSigner::new(config)), config.access_token_ttl());
        Self::new(
            store,
            directory,
            issuer,
            clock,
            config.refresh_token_ttl(),
            config.refresh_policy,
        )
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Look up a refresh token by its exact value
    pub async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError> {
        self.store.find_by_token(token).await
    }

    /// Create and persist a refresh token for `username`
    ///
    /// # Errors
    /// `SubjectNotFound` if the directory has no such user; nothing is
    /// persisted in that case
    pub async fn create_refresh_token(&self, username: &str) -> Result<RefreshToken, AppError> {
        let owner = self
            .directory
            .find_subject_by_username(username)
            .await?
            .ok_or_else(|| AuthError::SubjectNotFound(username.to_string()))?;

        let record = RefreshToken::issue(owner, self.clock.now(), self.refresh_token_ttl)?;
        self.store.insert(&record).await?;

        tracing::info!(
            user_id = %record.owner.id,
            expires_at = %record.expiry_time,
            "Refresh token created"
        );

        Ok(record)
    }

    /// Reject `record` if it has expired, deleting it first
    pub async fn verify_expiration(&self, record: RefreshToken) -> Result<RefreshToken, AppError> {
        if record.is_expired_at(self.clock.now()) {
            self.store.delete(&record).await?;
            tracing::info!(user_id = %record.owner.id, "Expired refresh token removed");
            return Err(AuthError::TokenExpired(record.token).into());
        }

        Ok(record)
    }

    /// Exchange a refresh token for a new access token
    ///
    /// # Errors
    /// - `TokenNotFound` if no record matches the presented value
    /// - `TokenExpired` if the record has expired (it is deleted)
    pub async fn refresh(&self, presented: &str) -> Result<TokenRefreshResponse, AppError> {
        let record = self
            .store
            .find_by_token(presented)
            .await?
            .ok_or_else(|| {
                tracing::warn!("Refresh token not found in store");
                AuthError::TokenNotFound(presented.to_string())
            })?;

        let record = self.verify_expiration(record).await?;

        let now = self.clock.now();
        let access_token = self.issuer.issue_access_token(&record.owner, now)?;
        let access_token_expiry = format_local_timestamp(self.issuer.access_token_expiry(now)?);

        let refresh_token = match self.policy {
            RefreshPolicy::Reuse => record.token,
            RefreshPolicy::Rotate => {
                let next = RefreshToken::issue(record.owner.clone(), now, self.refresh_token_ttl)?;
                if !self.store.replace(&record, &next).await? {
                    // Another request consumed it between lookup and replace
                    return Err(AuthError::TokenNotFound(record.token).into());
                }
                next.token
            }
        };

        tracing::info!(
            user_id = %record.owner.id,
            policy = ?self.policy,
            "Access token refreshed"
        );

        Ok(TokenRefreshResponse {
            access_token: format!("{}{}", TOKEN_TYPE_PREFIX, access_token),
            refresh_token,
            access_token_expiry,
        })
    }

    /// Delete every expired record; meant for an external scheduled job
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        let removed = self.store.delete_expired(self.clock.now()).await?;
        tracing::info!(removed = removed, "Expired refresh tokens purged");
        Ok(removed)
    }
}

/// Render an instant as an ISO-8601 local date-time without offset
pub fn format_local_timestamp(instant: DateTime<Utc>) -> String {
    format_iso_local(instant.with_timezone(&Local).naive_local())
}

/// Shortest ISO-8601 form: seconds are dropped when both they and the
/// fraction are zero, and the fraction uses 3, 6 or 9 digits as needed.
fn format_iso_local(value: NaiveDateTime) -> String {
    let nanos = value.nanosecond() % 1_000_000_000;
    let mut rendered = value.format("%Y-%m-%dT%H:%M").to_string();

    if value.second() == 0 && nanos == 0 {
        return rendered;
    }
    rendered.push_str(&format!(":{:02}", value.second()));

    match nanos {
        0 => {}
        n if n % 1_000_000 == 0 => rendered.push_str(&format!(".{:03}", n / 1_000_000)),
        n if n % 1_000 == 0 => rendered.push_str(&format!(".{:06}", n / 1_000)),
        n => rendered.push_str(&format!(".{:09}", n)),
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::auth::directory::InMemorySubjectDirectory;
    use crate::auth::jwt::AccessTokenSigner;
    use crate::auth::refresh_token::Subject;
    use crate::auth::store::InMemoryRefreshTokenStore;
    use crate::clock::ManualClock;
    use crate::error::DatabaseError;

    struct StaticSigner;

    impl AccessTokenSigner for StaticSigner {
        fn sign_access_token(
            &self,
            subject: &Subject,
            _issued_at: DateTime<Utc>,
        ) -> Result<String, AppError> {
            Ok(format!("jwt-for-{}", subject.username))
        }
    }

    struct Harness {
        service: RefreshTokenService,
        store: Arc<InMemoryRefreshTokenStore>,
        clock: ManualClock,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    async fn harness(policy: RefreshPolicy) -> Harness {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let directory = Arc::new(InMemorySubjectDirectory::new());
        directory.add("alice").await;
        let clock = ManualClock::new(t0());

        let service = RefreshTokenService::new(
            store.clone(),
            directory,
            TokenIssuer::new(Arc::new(StaticSigner), Duration::minutes(15)),
            Arc::new(clock.clone()),
            Duration::seconds(3600),
            policy,
        );

        Harness {
            service,
            store,
            clock,
        }
    }

    #[tokio::test]
    async fn test_create_sets_expiry_from_ttl() {
        let h = harness(RefreshPolicy::Reuse).await;
        let record = h.service.create_refresh_token("alice").await.unwrap();

        assert_eq!(record.owner.username, "alice");
        assert_eq!(record.expiry_time, t0() + Duration::seconds(3600));
        assert_eq!(
            h.service.find_by_token(&record.token).await.unwrap(),
            Some(record)
        );
    }

    #[tokio::test]
    async fn test_create_for_unknown_subject_persists_nothing() {
        let h = harness(RefreshPolicy::Reuse).await;
        let err = h.service.create_refresh_token("mallory").await.unwrap_err();

        assert_eq!(
            err.auth(),
            Some(&AuthError::SubjectNotFound("mallory".to_string()))
        );
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_refresh_within_ttl_echoes_token() {
        let h = harness(RefreshPolicy::Reuse).await;
        let record = h.service.create_refresh_token("alice").await.unwrap();

        h.clock.advance(Duration::seconds(10));
        let response = h.service.refresh(&record.token).await.unwrap();

        assert_eq!(response.access_token, "Bearer jwt-for-alice");
        assert_eq!(response.refresh_token, record.token);
        assert_eq!(
            response.access_token_expiry,
            format_local_timestamp(t0() + Duration::seconds(10) + Duration::minutes(15))
        );
    }

    #[tokio::test]
    async fn test_reused_token_stays_valid() {
        let h = harness(RefreshPolicy::Reuse).await;
        let record = h.service.create_refresh_token("alice").await.unwrap();

        h.service.refresh(&record.token).await.unwrap();
        h.clock.advance(Duration::seconds(1800));
        let second = h.service.refresh(&record.token).await.unwrap();

        assert_eq!(second.refresh_token, record.token);
    }

    #[tokio::test]
    async fn test_expired_token_is_deleted_then_rejected() {
        let h = harness(RefreshPolicy::Reuse).await;
        let record = h.service.create_refresh_token("alice").await.unwrap();

        h.clock.advance(Duration::seconds(3601));
        let err = h.service.refresh(&record.token).await.unwrap_err();

        assert_eq!(err.auth(), Some(&AuthError::TokenExpired(record.token.clone())));
        assert!(h.service.find_by_token(&record.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_token_rejected_at_exact_expiry() {
        let h = harness(RefreshPolicy::Reuse).await;
        let record = h.service.create_refresh_token("alice").await.unwrap();

        h.clock.set(record.expiry_time);
        let err = h.service.refresh(&record.token).await.unwrap_err();

        assert!(matches!(err, AppError::Auth(AuthError::TokenExpired(_))));
    }

    #[tokio::test]
    async fn test_unknown_token_rejected_regardless_of_time() {
        let h = harness(RefreshPolicy::Reuse).await;

        for offset in [0, 3600, 86_400 * 365] {
            h.clock.set(t0() + Duration::seconds(offset));
            let err = h.service.refresh("never-issued").await.unwrap_err();
            assert_eq!(
                err.auth(),
                Some(&AuthError::TokenNotFound("never-issued".to_string()))
            );
        }
    }

    #[tokio::test]
    async fn test_rotation_replaces_presented_token() {
        let h = harness(RefreshPolicy::Rotate).await;
        let record = h.service.create_refresh_token("alice").await.unwrap();

        h.clock.advance(Duration::seconds(100));
        let response = h.service.refresh(&record.token).await.unwrap();

        assert_ne!(response.refresh_token, record.token);
        let rotated = h
            .service
            .find_by_token(&response.refresh_token)
            .await
            .unwrap()
            .expect("rotated token should be stored");
        assert_eq!(rotated.expiry_time, t0() + Duration::seconds(100 + 3600));

        let err = h.service.refresh(&record.token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::TokenNotFound(_))));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let h = harness(RefreshPolicy::Reuse).await;
        let stale = h.service.create_refresh_token("alice").await.unwrap();
        h.clock.advance(Duration::seconds(3000));
        let fresh = h.service.create_refresh_token("alice").await.unwrap();

        h.clock.advance(Duration::seconds(700));
        assert_eq!(h.service.purge_expired().await.unwrap(), 1);

        assert!(h.service.find_by_token(&stale.token).await.unwrap().is_none());
        assert!(h.service.find_by_token(&fresh.token).await.unwrap().is_some());
    }

    struct BrokenStore;

    #[async_trait]
    impl RefreshTokenStore for BrokenStore {
        async fn find_by_token(&self, _token: &str) -> Result<Option<RefreshToken>, AppError> {
            Err(DatabaseError::ConnectionPool("pool timed out".to_string()).into())
        }

        async fn insert(&self, _record: &RefreshToken) -> Result<(), AppError> {
            Err(DatabaseError::ConnectionPool("pool timed out".to_string()).into())
        }

        async fn delete(&self, _record: &RefreshToken) -> Result<(), AppError> {
            Ok(())
        }

        async fn replace(&self, _old: &RefreshToken, _new: &RefreshToken) -> Result<bool, AppError> {
            Ok(false)
        }

        async fn delete_expired(&self, _now: DateTime<Utc>) -> Result<u64, AppError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_storage_failures_propagate() {
        let directory = Arc::new(InMemorySubjectDirectory::new());
        directory.add("alice").await;
        let service = RefreshTokenService::new(
            Arc::new(BrokenStore),
            directory,
            TokenIssuer::new(Arc::new(StaticSigner), Duration::minutes(15)),
            Arc::new(ManualClock::new(t0())),
            Duration::seconds(3600),
            RefreshPolicy::Reuse,
        );

        let err = service.refresh("anything").await.unwrap_err();
        assert!(matches!(err, AppError::Database(DatabaseError::ConnectionPool(_))));

        let err = service.create_refresh_token("alice").await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_is_an_error_not_a_panic() {
        let directory = Arc::new(InMemorySubjectDirectory::new());
        directory.add("alice").await;
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let service = RefreshTokenService::new(
            store.clone(),
            directory,
            TokenIssuer::new(Arc::new(StaticSigner), Duration::minutes(15)),
            Arc::new(ManualClock::new(t0())),
            Duration::seconds(1_000_000_000_000_000),
            RefreshPolicy::Reuse,
        );

        let err = service.create_refresh_token("alice").await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert!(store.is_empty().await);
    }

    fn naive(h: u32, m: u32, s: u32, nanos: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_nano_opt(h, m, s, nanos)
            .unwrap()
    }

    #[test]
    fn test_iso_local_uses_shortest_form() {
        assert_eq!(format_iso_local(naive(0, 15, 0, 0)), "2024-01-01T00:15");
        assert_eq!(format_iso_local(naive(0, 15, 10, 0)), "2024-01-01T00:15:10");
        assert_eq!(format_iso_local(naive(0, 15, 10, 250_000_000)), "2024-01-01T00:15:10.250");
        assert_eq!(format_iso_local(naive(0, 15, 10, 123_456_000)), "2024-01-01T00:15:10.123456");
        assert_eq!(format_iso_local(naive(0, 15, 10, 123_456_789)), "2024-01-01T00:15:10.123456789");
        assert_eq!(format_iso_local(naive(0, 15, 0, 5_000_000)), "2024-01-01T00:15:00.005");
    }
}
