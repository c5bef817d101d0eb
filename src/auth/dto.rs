use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::repo_types::{Role, User};
use crate::error::AuthError;

/// Request body for user registration. Missing fields deserialize as empty so
/// validation can report them per field.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for logout.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogoutRequest {
    pub email: String,
}

/// Request body for token refresh. The token is kept as raw JSON so a
/// non-string value is rejected as a bad token, not as a bad body.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<Value>,
}

impl RefreshRequest {
    /// `None` when no token was sent; a non-string token is never valid.
    pub fn token(&self) -> Result<Option<&str>, AuthError> {
        match &self.refresh_token {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(t)) => Ok(Some(t.as_str())),
            Some(_) => Err(AuthError::TokenInvalidOrExpired),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Response returned after login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub message: &'static str,
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

/// Response returned after refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            role: u.role,
        }
    }
}
