use std::{fmt, str::FromStr};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{claims::unix_micros, password::hash_password},
    error::{AppError, FieldError},
};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
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
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

/// Stored account. Has no `Serialize` impl: responses go through
/// `PublicUser`, so secret fields cannot leak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub google_id: Option<String>,
    pub photo: Option<String>,
    pub role: Role,
    /// Only populated when loaded with `Selection::WithSecrets`.
    pub password_hash: Option<String>,
    pub active: bool,
    pub password_changed_at: Option<OffsetDateTime>,
    pub password_reset_token: Option<String>,
    pub password_reset_token_expire: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl User {
    /// Hashes and stores a new password, stamping `password_changed_at`
    /// so that tokens issued earlier stop being accepted.
    pub fn set_password(&mut self, plain: &str, now: OffsetDateTime) -> anyhow::Result<()> {
        self.password_hash = Some(hash_password(plain)?);
        self.password_changed_at = Some(now);
        Ok(())
    }

    /// True if the password changed after a token issued at `issued_at`.
    /// Compared in microseconds.
    pub fn password_changed_after(&self, issued_at: OffsetDateTime) -> bool {
        self.password_changed_at
            .map(|changed| unix_micros(changed) > unix_micros(issued_at))
            .unwrap_or(false)
    }

    pub fn clear_reset_ticket(&mut self) {
        self.password_reset_token = None;
        self.password_reset_token_expire = None;
    }
}

/// Unsaved account as submitted by signup or built from an external
/// identity. Turned into a `User` by [`before_save`].
#[derive(Debug, Clone, Default)]
pub struct UserDraft {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
    pub google_id: Option<String>,
    pub photo: Option<String>,
}

lazy_static! {
    /// local@domain.tld, no whitespace, a dotted domain with a 2+ letter TLD.
    static ref EMAIL_SHAPE: Regex =
        Regex::new(r"^[^@\s]+@(?:[A-Za-z0-9-]+\.)+[A-Za-z]{2,}$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_SHAPE.is_match(email)
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Field rules for a new password, shared by signup and password changes.
pub fn validate_new_password(
    password: Option<&str>,
    confirm_password: Option<&str>,
) -> Vec<FieldError> {
    let mut errors = Vec::new();
    match password.filter(|p| !p.is_empty()) {
        None => errors.push(FieldError::new("password", "Password is required")),
        Some(p) if p.chars().count() < MIN_PASSWORD_LEN => errors.push(FieldError::new(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters long"),
        )),
        Some(_) => {}
    }
    match confirm_password.filter(|p| !p.is_empty()) {
        None => errors.push(FieldError::new(
            "confirmPassword",
            "Confirm Password is required",
        )),
        Some(c) if Some(c) != password => errors.push(FieldError::new(
            "confirmPassword",
            "Password and Confirm password do not match!",
        )),
        Some(_) => {}
    }
    errors
}

impl UserDraft {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();
        let external = present(&self.google_id).is_some();

        if present(&self.name).is_none() {
            errors.push(FieldError::new("name", "Name is required"));
        }
        match present(&self.email) {
            Some(email) if !is_valid_email(email) => {
                errors.push(FieldError::new("email", "Please enter a valid email"))
            }
            None if !external => errors.push(FieldError::new("email", "Email is required")),
            _ => {}
        }
        if !external {
            errors.extend(validate_new_password(
                self.password.as_deref(),
                self.confirm_password.as_deref(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

/// Explicit pre-persist step: validate, normalize, hash the password and
/// drop the confirmation. Provider accounts get no password at all.
pub fn before_save(draft: UserDraft, now: OffsetDateTime) -> Result<User, AppError> {
    draft.validate()?;

    let password_hash = match (&draft.google_id, draft.password.as_deref()) {
        (None, Some(plain)) => Some(hash_password(plain)?),
        _ => None,
    };

    Ok(User {
        id: Uuid::new_v4(),
        name: present(&draft.name).unwrap_or_default().to_string(),
        email: present(&draft.email).map(str::to_lowercase),
        google_id: present(&draft.google_id).map(str::to_string),
        photo: present(&draft.photo).map(str::to_string),
        role: Role::default(),
        password_hash,
        active: true,
        password_changed_at: None,
        password_reset_token: None,
        password_reset_token_expire: None,
        created_at: now,
    })
}
