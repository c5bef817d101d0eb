use anyhow::{bail, Context};
use serde::Deserialize;

/// Longest accepted token lifetime: 100 years.
const MAX_TTL_MINUTES: i64 = 100 * 365 * 24 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Postgres URL. Without one the service keeps users in memory.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_vars<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> anyhow::Result<String> {
            let value = var(key).with_context(|| format!("{key} must be set"))?;
            if value.trim().is_empty() {
                bail!("{key} must not be empty");
            }
            Ok(value)
        };
        let minutes = |key: &str, default: i64| -> anyhow::Result<i64> {
            match var(key) {
                None => Ok(default),
                Some(v) => {
                    let parsed = v
                        .parse::<i64>()
                        .with_context(|| format!("{key} must be a whole number of minutes"))?;
                    if parsed <= 0 {
                        bail!("{key} must be positive");
                    }
                    if parsed > MAX_TTL_MINUTES {
                        bail!("{key} must be at most {MAX_TTL_MINUTES} minutes");
                    }
                    Ok(parsed)
                }
            }
        };

        let jwt = JwtConfig {
            access_secret: required("JWT_SECRET")?,
            refresh_secret: required("JWT_REFRESH_SECRET")?,
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "medauth".into()),
            audience: var("JWT_AUDIENCE").unwrap_or_else(|| "medauth-users".into()),
            access_ttl_minutes: minutes("JWT_ACCESS_TTL_MINUTES", 15)?,
            refresh_ttl_minutes: minutes("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 7)?,
        };
        let database_url = var("DATABASE_URL").filter(|v| !v.trim().is_empty());

        Ok(Self { database_url, jwt })
    }
}
