//! Identity normalization and credential rules applied before anything
//! reaches the credential store.

use std::sync::LazyLock;

use regex::Regex;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{3,30}$").expect("username pattern is valid"));

/// Canonical form of an email address: trimmed and lowercased.
///
/// Uniqueness is enforced on this form, and every lookup uses it.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate that a password meets minimum strength requirements.
///
/// Requires at least [`MIN_PASSWORD_LENGTH`] characters with a lowercase
/// letter, an uppercase letter and a digit.
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain a lowercase letter".into());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain an uppercase letter".into());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain a digit".into());
    }
    Ok(())
}

/// Usernames are 3-30 characters of letters, digits and underscores.
pub fn validate_username(username: &str) -> Result<(), String> {
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        Err("Username must be 3-30 letters, digits or underscores".into())
    }
}
