use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::AuthError;

pub const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=20;
pub const PASSWORD_LEN: std::ops::RangeInclusive<usize> = 6..=20;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex compiles");
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn username(username: &str) -> Result<(), AuthError> {
    if !USERNAME_LEN.contains(&username.chars().count()) {
        return Err(AuthError::validation(
            "Username must be between 3 and 20 characters",
        ));
    }
    Ok(())
}

pub fn email(email: &str) -> Result<(), AuthError> {
    if !is_valid_email(email) {
        return Err(AuthError::validation("Invalid email format"));
    }
    Ok(())
}

pub fn password(password: &str) -> Result<(), AuthError> {
    if !PASSWORD_LEN.contains(&password.chars().count()) {
        return Err(AuthError::validation(
            "Password must be between 6 and 20 characters",
        ));
    }
    Ok(())
}

/// Turns an optional form field into `None` when blank.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
