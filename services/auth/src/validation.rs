//! Registration and password input rules

use regex::Regex;
use std::sync::LazyLock;

static USERNAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{3,32}$").expect("valid username pattern"));

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid email pattern")
});

/// Usernames are 3-32 characters of letters, digits, `_` and `-`
pub fn validate_username(username: &str) -> Result<(), String> {
    match username.chars().count() {
        0 => Err("Username is required".to_string()),
        n if !(3..=32).contains(&n) => {
            Err("Username must be between 3 and 32 characters".to_string())
        }
        _ if !USERNAME_PATTERN.is_match(username) => Err(
            "Username may only contain letters, numbers, underscores and hyphens".to_string(),
        ),
        _ => Ok(()),
    }
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        Err("Email is required".to_string())
    } else if email.len() > 254 || !EMAIL_PATTERN.is_match(email) {
        Err("Please enter a valid email address".to_string())
    } else {
        Ok(())
    }
}

/// Passwords are 8-128 characters with at least one letter and one digit
pub fn validate_password(password: &str) -> Result<(), String> {
    let length = password.chars().count();
    if length == 0 {
        return Err("Password is required".to_string());
    }
    if !(8..=128).contains(&length) {
        return Err("Password must be between 8 and 128 characters".to_string());
    }

    let has_letter = password.chars().any(char::is_alphabetic);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_letter && has_digit) {
        return Err("Password must contain at least one letter and one digit".to_string());
    }

    Ok(())
}

/// Derive a URL-safe page slug from a username
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    for c in input.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "page".to_string()
    } else {
        slug.to_string()
    }
}
