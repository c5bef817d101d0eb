use std::sync::Arc;

use anyhow::Context;
use lazy_static::lazy_static;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::PublicUser,
    jwt::{JwtKeys, TokenPair},
    password::{hash_password, verify_password},
    repo_types::{normalize_email, NewUser, NewUserRecord},
    store::UserStore,
};
use crate::error::AuthError;

lazy_static! {
    // Verified against when the email is unknown so both login failures cost the same.
    static ref DUMMY_HASH: Option<String> = hash_password("medauth-login-timing").ok();
}

/// Successful login: a fresh token pair plus the public user projection.
#[derive(Debug)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub user: PublicUser,
}

/// Register/login/logout/refresh over a user store.
///
/// A refresh token is only honored while it equals the one stored on the
/// user; login and refresh overwrite it, logout clears it.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    keys: Arc<JwtKeys>,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, keys: Arc<JwtKeys>) -> Self {
        // Hash up front so the first unknown-email login is not slower than the rest.
        lazy_static::initialize(&DUMMY_HASH);
        Self { store, keys }
    }

    #[cfg(test)]
    pub(crate) fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    /// Creates the account. Does not log the user in.
    #[instrument(skip(self, name, password, role))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Option<&str>,
    ) -> Result<PublicUser, AuthError> {
        let new_user = NewUser::new(name, email, password, role).map_err(|e| {
            warn!(error = %e, "registration rejected by validation");
            e
        })?;

        if self.store.find_by_email(&new_user.email).await?.is_some() {
            warn!(email = %new_user.email, "email already registered");
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = hash_password(&new_user.password).context("hash password")?;
        let user = self
            .store
            .create(NewUserRecord {
                name: new_user.name,
                email: new_user.email,
                password_hash,
                role: new_user.role,
            })
            .await?;

        info!(user_id = %user.id, email = %user.email, role = %user.role, "user registered");
        Ok(PublicUser::from(&user))
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(email);
        let Some(mut user) = self.store.find_by_email_with_password(&email).await? else {
            if let Some(hash) = &*DUMMY_HASH {
                let _ = verify_password(password, hash);
            }
            warn!(email = %email, "login unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        let hash = user
            .password_hash
            .take()
            .with_context(|| format!("user {} has no password hash", user.id))?;
        if !verify_password(password, &hash).context("verify password")? {
            warn!(email = %email, user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.keys.issue_pair(user.id)?;
        user.refresh_token = Some(tokens.refresh_token.clone());
        self.store.save(&user).await?;

        info!(user_id = %user.id, email = %user.email, "user logged in");
        Ok(LoginOutcome {
            tokens,
            user: PublicUser::from(&user),
        })
    }

    /// Clears the stored session. Succeeds whether or not the email exists.
    #[instrument(skip(self))]
    pub async fn logout(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        if let Some(mut user) = self.store.find_by_email(&email).await? {
            user.refresh_token = None;
            self.store.save(&user).await?;
            info!(user_id = %user.id, email = %user.email, "user logged out");
        }
        Ok(())
    }

    /// Exchanges the current refresh token for a new pair and rotates the stored one.
    ///
    /// Server-side faults are logged and reported as an invalid token, so the
    /// caller only ever sees "missing" or "invalid or expired".
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<TokenPair, AuthError> {
        match self.rotate(refresh_token).await {
            Err(AuthError::Internal(e)) => {
                error!(error = ?e, "refresh failed with internal error");
                Err(AuthError::TokenInvalidOrExpired)
            }
            other => other,
        }
    }

    async fn rotate(&self, refresh_token: Option<&str>) -> Result<TokenPair, AuthError> {
        let presented = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::TokenMissing)?;

        let claims = self.keys.verify_refresh(presented).map_err(|e| {
            warn!(error = %e, "refresh token rejected");
            AuthError::from(e)
        })?;

        let Some(mut user) = self.store.find_by_id(claims.sub).await? else {
            warn!(user_id = %claims.sub, "refresh token for unknown user");
            return Err(AuthError::TokenInvalidOrExpired);
        };

        if user.refresh_token.as_deref() != Some(presented) {
            warn!(user_id = %user.id, "refresh token does not match active session");
            return Err(AuthError::SessionMismatch);
        }

        let tokens = self.keys.issue_pair(user.id)?;
        user.refresh_token = Some(tokens.refresh_token.clone());
        self.store.save(&user).await?;

        info!(user_id = %user.id, email = %user.email, "token refreshed");
        Ok(tokens)
    }

    /// Public projection for the holder of a verified access token.
    #[instrument(skip(self))]
    pub async fn current_user(&self, user_id: Uuid) -> Result<PublicUser, AuthError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::TokenInvalidOrExpired)?;
        Ok(PublicUser::from(&user))
    }
}
