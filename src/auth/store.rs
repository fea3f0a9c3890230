/// Refresh Token Store
///
/// Durable keyed storage of refresh-token records. Lookups are keyed by the
/// SHA-256 digest of the presented value; every mutation is atomic for the
/// record(s) it touches. No records are cached in process.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::refresh_token::{hash_token, RefreshToken, Subject};
use crate::error::AppError;

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Exact-match lookup on the token value. A miss is `Ok(None)`.
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError>;

    /// Persist a freshly minted record
    async fn insert(&self, record: &RefreshToken) -> Result<(), AppError>;

    /// Remove a record by identity. Removing an absent record is not an error.
    async fn delete(&self, record: &RefreshToken) -> Result<(), AppError>;

    /// Atomically remove `old` and persist `new`.
    ///
    /// Returns `false` without persisting `new` if `old` was already gone.
    async fn replace(&self, old: &RefreshToken, new: &RefreshToken) -> Result<bool, AppError>;

    /// Remove every record whose expiry is at or before `now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Stored form of a record: the digest replaces the plaintext value
#[derive(Debug, Clone)]
struct StoredToken {
    id: Uuid,
    owner: Subject,
    issued_at: DateTime<Utc>,
    expiry_time: DateTime<Utc>,
}

impl StoredToken {
    fn from_record(record: &RefreshToken) -> Self {
        Self {
            id: record.id,
            owner: record.owner.clone(),
            issued_at: record.issued_at,
            expiry_time: record.expiry_time,
        }
    }
}

/// Process-local store for tests and single-node development runs
#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenStore {
    tokens: RwLock<HashMap<String, StoredToken>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError> {
        let tokens = self.tokens.read().await;
        Ok(tokens.get(&hash_token(token)).map(|stored| RefreshToken {
            id: stored.id,
            token: token.to_string(),
            owner: stored.owner.clone(),
            issued_at: stored.issued_at,
            expiry_time: stored.expiry_time,
        }))
    }

    async fn insert(&self, record: &RefreshToken) -> Result<(), AppError> {
        let mut tokens = self.tokens.write().await;
        tokens.insert(record.token_hash(), StoredToken::from_record(record));
        Ok(())
    }

    async fn delete(&self, record: &RefreshToken) -> Result<(), AppError> {
        let mut tokens = self.tokens.write().await;
        let hash = record.token_hash();
        if tokens.get(&hash).map(|stored| stored.id) == Some(record.id) {
            tokens.remove(&hash);
        }
        Ok(())
    }

    async fn replace(&self, old: &RefreshToken, new: &RefreshToken) -> Result<bool, AppError> {
        let mut tokens = self.tokens.write().await;
        let old_hash = old.token_hash();
        if tokens.get(&old_hash).map(|stored| stored.id) != Some(old.id) {
            return Ok(false);
        }
        tokens.remove(&old_hash);
        tokens.insert(new.token_hash(), StoredToken::from_record(new));
        Ok(true)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, stored| stored.expiry_time > now);
        Ok((before - tokens.len()) as u64)
    }
}

/// Postgres-backed store
///
/// Expects the `refresh_tokens` and `users` tables from `migrations/`.
#[derive(Debug, Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, String, DateTime<Utc>, DateTime<Utc>)>(
            r#"
            SELECT rt.id, u.id, u.username, rt.created_at, rt.expires_at
            FROM refresh_tokens rt
            JOIN users u ON u.id = rt.user_id
            WHERE rt.token_hash = $1
            "#,
        )
        .bind(hash_token(token))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, user_id, username, created_at, expires_at)| RefreshToken {
            id,
            token: token.to_string(),
            owner: Subject::new(user_id, username),
            issued_at: created_at,
            expiry_time: expires_at,
        }))
    }

    async fn insert(&self, record: &RefreshToken) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id)
        .bind(record.owner.id)
        .bind(record.token_hash())
        .bind(record.expiry_time)
        .bind(record.issued_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, record: &RefreshToken) -> Result<(), AppError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE id = $1")
            .bind(record.id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn replace(&self, old: &RefreshToken, new: &RefreshToken) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE id = $1")
            .bind(old.id)
            .execute(&mut tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(new.id)
        .bind(new.owner.id)
        .bind(new.token_hash())
        .bind(new.expiry_time)
        .bind(new.issued_at)
        .execute(&mut tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
