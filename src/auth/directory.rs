/// Subject directory
///
/// Read-only lookup of the users refresh tokens are issued to. Accounts are
/// owned elsewhere; this service never writes them.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::refresh_token::Subject;
use crate::error::AppError;

#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    async fn find_subject_by_username(&self, username: &str) -> Result<Option<Subject>, AppError>;
}

#[derive(Debug, Default)]
pub struct InMemorySubjectDirectory {
    subjects: RwLock<HashMap<String, Subject>>,
}

impl InMemorySubjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `username` with a fresh id and return it
    pub async fn add(&self, username: &str) -> Subject {
        let subject = Subject::new(Uuid::new_v4(), username);
        self.subjects
            .write()
            .await
            .insert(username.to_string(), subject.clone());
        subject
    }
}

#[async_trait]
impl SubjectDirectory for InMemorySubjectDirectory {
    async fn find_subject_by_username(&self, username: &str) -> Result<Option<Subject>, AppError> {
        Ok(self.subjects.read().await.get(username).cloned())
    }
}

#[derive(Debug, Clone)]
pub struct PgSubjectDirectory {
    pool: PgPool,
}

impl PgSubjectDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubjectDirectory for PgSubjectDirectory {
    async fn find_subject_by_username(&self, username: &str) -> Result<Option<Subject>, AppError> {
        let row = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT id, username FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, username)| Subject::new(id, username)))
    }
}
