use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use tracing::warn;

use crate::{
    auth::{
        jwt::JwtKeys,
        repo::PgUserStore,
        services::AuthService,
        store::{InMemoryUserStore, UserStore},
    },
    config::{AppConfig, JwtConfig},
};

#[derive(Clone)]
pub struct AppState {
    pub keys: Arc<JwtKeys>,
    pub auth: AuthService,
}

impl AppState {
    /// Connects the configured store and runs migrations.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn UserStore> = match &config.database_url {
            Some(url) => {
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                Arc::new(PgUserStore::new(db))
            }
            None => {
                warn!("DATABASE_URL not set; users are kept in memory and lost on restart");
                Arc::new(InMemoryUserStore::new())
            }
        };
        Ok(Self::from_parts(&config.jwt, store))
    }

    pub fn from_parts(jwt: &JwtConfig, store: Arc<dyn UserStore>) -> Self {
        let keys = Arc::new(JwtKeys::from_config(jwt));
        let auth = AuthService::new(store, keys.clone());
        Self { keys, auth }
    }

    /// In-memory state with fixed test secrets.
    #[cfg(test)]
    pub fn fake() -> Self {
        let jwt = JwtConfig {
            access_secret: "test-access".into(),
            refresh_secret: "test-refresh".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            access_ttl_minutes: 15,
            refresh_ttl_minutes: 60 * 24 * 7,
        };
        Self::from_parts(&jwt, Arc::new(InMemoryUserStore::new()))
    }
}

impl FromRef<AppState> for Arc<JwtKeys> {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}
