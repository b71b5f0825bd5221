//! Field checks shared by the account services.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AccountError, Result};

pub const MAX_FULLNAME_CHARS: usize = 50;
pub const MAX_ROLE_NAME_CHARS: usize = 50;
pub const MAX_DESCRIPTION_CHARS: usize = 200;

// Shape check only: local@domain.tld without whitespace.
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
});

/// Canonical form under which emails are stored and compared.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Normalizes `email` and checks its shape.
pub fn email(email: &str) -> Result<String> {
    let normalized = normalize_email(email);
    if normalized.is_empty() {
        return Err(AccountError::Validation("email is required".to_string()));
    }
    if !EMAIL.is_match(&normalized) {
        return Err(AccountError::Validation(format!(
            "invalid email format: {normalized}"
        )));
    }
    Ok(normalized)
}

/// Trims `value` and checks it is non-empty and at most `max_chars` long.
pub fn required_text(field: &str, value: &str, max_chars: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AccountError::Validation(format!("{field} is required")));
    }
    bounded(field, trimmed, max_chars)?;
    Ok(trimmed.to_string())
}

/// Trims `value`; blank input counts as absent.
pub fn optional_text(field: &str, value: Option<&str>, max_chars: usize) -> Result<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => {
            bounded(field, v, max_chars)?;
            Ok(Some(v.to_string()))
        }
        None => Ok(None),
    }
}

fn bounded(field: &str, value: &str, max_chars: usize) -> Result<()> {
    if value.chars().count() > max_chars {
        return Err(AccountError::Validation(format!(
            "{field} must be at most {max_chars} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(email("  Ada@Example.COM ").unwrap(), "ada@example.com");
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for bad in ["", "   ", "ada", "ada@", "@example.com", "ada@example", "a da@example.com", "a@b@c.com"] {
            assert!(matches!(email(bad), Err(AccountError::Validation(_))), "{bad:?}");
        }
    }

    #[test]
    fn length_is_counted_in_characters() {
        let fifty = "é".repeat(50);
        assert_eq!(required_text("fullname", &fifty, 50).unwrap(), fifty);
        assert!(required_text("fullname", &"é".repeat(51), 50).is_err());
    }

    #[test]
    fn blank_optional_text_is_none() {
        assert_eq!(optional_text("description", Some("  "), 200).unwrap(), None);
        assert_eq!(
            optional_text("description", Some(" admins "), 200).unwrap(),
            Some("admins".to_string())
        );
    }
}
