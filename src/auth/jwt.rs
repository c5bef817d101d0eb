use std::{sync::Arc, time::Duration};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use super::claims::{Claims, TokenKind};
use crate::{config::JwtConfig, error::AuthError};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is invalid")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("token signing failed: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),
    #[error("token lifetime does not fit in a timestamp")]
    TtlOutOfRange,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        }
    }
}

/// Signing material for one token kind.
#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl KeyPair {
    fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::from_secs(u64::try_from(ttl_minutes).unwrap_or(0).saturating_mul(60)),
        }
    }
}

/// Access and refresh keys, each with its own secret and lifetime.
#[derive(Clone)]
pub struct JwtKeys {
    access: KeyPair,
    refresh: KeyPair,
    issuer: String,
    audience: String,
}

/// Freshly issued access + refresh tokens.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            access: KeyPair::new(&cfg.access_secret, cfg.access_ttl_minutes),
            refresh: KeyPair::new(&cfg.refresh_secret, cfg.refresh_ttl_minutes),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
        }
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn sign_with_kind(&self, user_id: Uuid, kind: TokenKind) -> Result<String, TokenError> {
        let keys = self.keys(kind);
        let now = OffsetDateTime::now_utc();
        let exp = i64::try_from(keys.ttl.as_secs())
            .ok()
            .and_then(|secs| now.checked_add(TimeDuration::seconds(secs)))
            .ok_or(TokenError::TtlOutOfRange)?;
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
            jti: Uuid::new_v4(),
        };
        let token =
            encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).map_err(TokenError::Sign)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.sign_with_kind(user_id, TokenKind::Access)
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.sign_with_kind(user_id, TokenKind::Refresh)
    }

    pub fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.sign_access(user_id)?,
            refresh_token: self.sign_refresh(user_id)?,
        })
    }

    fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.keys(kind).decoding, &validation)?;
        if data.claims.kind != kind {
            return Err(TokenError::Invalid);
        }
        debug!(user_id = %data.claims.sub, kind = ?kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_kind(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_kind(token, TokenKind::Refresh)
    }
}

/// Extracts and validates a bearer access token, returning the user ID.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<JwtKeys>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = Arc::<JwtKeys>::from_ref(state);
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
            .ok_or(AuthError::TokenInvalidOrExpired)?;

        let claims = keys.verify_access(token).map_err(|e| {
            warn!(error = %e, "access token rejected");
            AuthError::TokenInvalidOrExpired
        })?;

        Ok(AuthUser(claims.sub))
    }
}
