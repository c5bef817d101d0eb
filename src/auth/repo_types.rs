use std::{fmt, str::FromStr};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const MIN_NAME_LEN: usize = 2;
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Doctor,
    #[default]
    Patient,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Doctor => "doctor",
            Role::Patient => "patient",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "doctor" => Ok(Role::Doctor),
            "patient" => Ok(Role::Patient),
            "admin" => Ok(Role::Admin),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

/// User record. `password_hash` is only populated when a lookup asks for it.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: Role,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Row shape in the `users` table; role is stored as text.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: String,
    pub refresh_token: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            password_hash: r.password_hash,
            role: r.role.parse()?,
            refresh_token: r.refresh_token,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Fields handed to a store to create a user. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUserRecord {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every field that failed validation, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.0.iter().map(|e| e.message.as_str()).collect();
        f.write_str(&messages.join(", "))
    }
}

impl std::error::Error for ValidationErrors {}

impl ValidationErrors {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    #[cfg(test)]
    pub(crate) fn has(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Registration input that passed every entity invariant.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl NewUser {
    pub fn new(
        name: &str,
        email: &str,
        password: &str,
        role: Option<&str>,
    ) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let name = name.trim().to_string();
        if name.is_empty() {
            errors.push("name", "Name is required");
        } else if name.chars().count() < MIN_NAME_LEN {
            errors.push("name", "Name must be at least 2 characters long");
        }

        let email = normalize_email(email);
        if email.is_empty() {
            errors.push("email", "Email is required");
        } else if !is_valid_email(&email) {
            errors.push("email", "Please fill a valid email address");
        }

        if password.is_empty() {
            errors.push("password", "Password is required");
        } else if password.chars().count() < MIN_PASSWORD_LEN {
            errors.push("password", "Password must be at least 6 characters long");
        }

        let role = match role.map(str::trim).filter(|r| !r.is_empty()) {
            None => Role::default(),
            Some(r) => r.parse().unwrap_or_else(|_| {
                errors.push("role", "Role must be one of doctor, patient, admin");
                Role::default()
            }),
        };

        if !errors.0.is_empty() {
            return Err(errors);
        }
        Ok(Self {
            name,
            email,
            password: password.to_string(),
            role,
        })
    }
}
