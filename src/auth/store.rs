use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repo_types::{normalize_email, NewUserRecord, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence for users and their single active refresh token.
///
/// Email lookups are case-insensitive. Only `find_by_email_with_password`
/// returns the password hash; every other read leaves it `None`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_email_with_password(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn create(&self, record: NewUserRecord) -> Result<User, StoreError>;
    /// Persists the user's refresh token and bumps `updated_at`. Last writer wins.
    async fn save(&self, user: &User) -> Result<(), StoreError>;
}

/// Map-backed store for tests and database-less runs.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lookup_email(&self, email: &str) -> Option<User> {
        let email = normalize_email(email);
        self.users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned()
    }
}

fn without_password(mut user: User) -> User {
    user.password_hash = None;
    user
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lookup_email(email).await.map(without_password))
    }

    async fn find_by_email_with_password(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lookup_email(email).await)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned().map(without_password))
    }

    async fn create(&self, record: NewUserRecord) -> Result<User, StoreError> {
        let email = normalize_email(&record.email);
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == email) {
            return Err(StoreError::DuplicateEmail);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: record.name,
            email,
            password_hash: Some(record.password_hash),
            role: record.role,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(without_password(user))
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let stored = users
            .get_mut(&user.id)
            .ok_or_else(|| anyhow::anyhow!("user {} does not exist", user.id))?;
        stored.refresh_token = user.refresh_token.clone();
        stored.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }
}
