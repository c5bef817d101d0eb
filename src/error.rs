//! Auth error taxonomy and its HTTP rendering.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::auth::{
    jwt::TokenError,
    repo_types::ValidationErrors,
    store::StoreError,
};

/// Every outcome an auth operation can fail with.
///
/// Negative authentication outcomes are deliberately coarse: unknown email
/// and wrong password are both `InvalidCredentials`, and a stale session
/// renders exactly like a bad or expired token.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("request body is not valid JSON")]
    MalformedBody,

    #[error("email already registered")]
    DuplicateEmail,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("no token provided")]
    TokenMissing,

    #[error("token invalid or expired")]
    TokenInvalidOrExpired,

    #[error("refresh token does not match the active session")]
    SessionMismatch,

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => AuthError::DuplicateEmail,
            StoreError::Backend(e) => AuthError::Internal(e),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid | TokenError::Expired => AuthError::TokenInvalidOrExpired,
            TokenError::Sign(e) => AuthError::Internal(anyhow::Error::new(e).context("sign token")),
            e @ TokenError::TtlOutOfRange => AuthError::Internal(anyhow::Error::new(e)),
        }
    }
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_)
            | AuthError::MalformedBody
            | AuthError::DuplicateEmail
            | AuthError::TokenMissing => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials
            | AuthError::TokenInvalidOrExpired
            | AuthError::SessionMismatch => StatusCode::UNAUTHORIZED,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Never carries internal detail.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "Validation failed",
            AuthError::MalformedBody => "Invalid request body",
            AuthError::DuplicateEmail => "Email already registered",
            AuthError::InvalidCredentials => "Invalid credentials",
            AuthError::TokenMissing => "No token provided",
            AuthError::TokenInvalidOrExpired | AuthError::SessionMismatch => {
                "Invalid or expired token"
            }
            AuthError::Internal(_) => "Server error",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.public_message();
        let body = match &self {
            AuthError::Validation(errors) => json!({ "message": message, "errors": errors.0 }),
            AuthError::Internal(e) => {
                error!(error = ?e, "request failed with internal error");
                json!({ "message": message })
            }
            _ => json!({ "message": message }),
        };
        (status, Json(body)).into_response()
    }
}
