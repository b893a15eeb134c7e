//! Input checks for login and registration, applied before any provider call.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppError, AppResult};

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 256;
pub const MAX_NAME_LEN: usize = 128;

pub fn check_email(email: &str) -> AppResult<()> {
    if email.trim().is_empty() {
        return Err(AppError::validation("missing_email", "email is required"));
    }
    if !EMAIL_REGEX.is_match(email.trim()) {
        return Err(AppError::validation("invalid_email", "email is not valid"));
    }
    Ok(())
}

pub fn check_login(email: &str, password: &str) -> AppResult<()> {
    check_email(email)?;
    if password.is_empty() {
        return Err(AppError::validation("missing_password", "password is required"));
    }
    Ok(())
}

pub fn check_registration(email: &str, password: &str, name: &str) -> AppResult<()> {
    check_email(email)?;
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "password_too_short".to_string(),
            format!("password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(AppError::validation("password_too_long", "password is too long"));
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("missing_name", "name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::validation("name_too_long", "name is too long"));
    }
    Ok(())
}
