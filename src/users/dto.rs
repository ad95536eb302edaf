use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const MIN_PASSWORD_LEN: usize = 5;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Emails are stored and compared in normalized form: trimmed, lowercased in
/// full, so `A@B.COM` and `a@b.com` are the same account.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<String, ApiError> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(ApiError::validation("email", "this field may not be blank"));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::validation("email", "enter a valid email address"));
    }
    Ok(email)
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(
            "password",
            format!("ensure this field has at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

/// Request body for account creation. Fields default so that a missing field
/// reads as blank and fails our validation rather than body deserialization.
#[derive(Debug, Default, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,
}

/// A creation payload that passed validation, email already normalized.
#[derive(Debug)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl CreateUserRequest {
    pub fn validate(self) -> Result<NewUser, ApiError> {
        let email = validate_email(&self.email)?;
        validate_password(&self.password)?;
        Ok(NewUser {
            email,
            password: self.password,
            name: self.name.trim().to_string(),
        })
    }
}

/// Request body for token issuance.
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Partial profile update; absent fields stay untouched.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateMeRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

/// Validated profile changes, ready for the repo layer.
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

impl UpdateMeRequest {
    pub fn validate(self) -> Result<ProfileChanges, ApiError> {
        let email = self.email.as_deref().map(validate_email).transpose()?;
        if let Some(password) = &self.password {
            validate_password(password)?;
        }
        Ok(ProfileChanges {
            email,
            password: self.password,
            name: self.name.map(|n| n.trim().to_string()),
        })
    }
}

/// Public profile shape; the password never leaves the server.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}
