use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    repo_types::{normalize_email, NewUserRecord, User, UserRow},
    store::{StoreError, UserStore},
};

/// Postgres-backed user store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_by_email(&self, email: &str, with_password: bool) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email,
                   CASE WHEN $2 THEN password_hash END AS password_hash,
                   role, refresh_token, created_at, updated_at
            FROM users
            WHERE email = lower($1)
            "#,
        )
        .bind(normalize_email(email))
        .bind(with_password)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        row.map(User::try_from).transpose().map_err(StoreError::from)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.fetch_by_email(email, false).await
    }

    async fn find_by_email_with_password(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.fetch_by_email(email, true).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, NULL::text AS password_hash,
                   role, refresh_token, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        row.map(User::try_from).transpose().map_err(StoreError::from)
    }

    async fn create(&self, record: NewUserRecord) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, name, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, email, NULL::text AS password_hash,
                      role, refresh_token, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.name)
        .bind(normalize_email(&record.email))
        .bind(&record.password_hash)
        .bind(record.role.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::DuplicateEmail,
            other => StoreError::Backend(anyhow::Error::new(other).context("insert user")),
        })?;
        Ok(User::try_from(row)?)
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(user.refresh_token.as_deref())
        .execute(&self.db)
        .await
        .context("save user session")?;
        if result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("user {} does not exist", user.id).into());
        }
        Ok(())
    }
}
