//! Value objects shared by accounts, baskets and the importer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Login e-mail. Trimmed, domain part lower-cased.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn new(value: impl AsRef<str>) -> Result<Self, EmailError> {
        let value = value.as_ref().trim();
        if value.is_empty() { return Err(EmailError::Empty); }
        if value.len() > 254 { return Err(EmailError::TooLong); }
        let (local, domain) = value.rsplit_once('@').ok_or(EmailError::Malformed)?;
        if local.is_empty() || domain.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
            return Err(EmailError::Malformed);
        }
        if value.chars().any(char::is_whitespace) { return Err(EmailError::Malformed); }
        Ok(Self(format!("{}@{}", local, domain.to_lowercase())))
    }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn local_part(&self) -> &str { self.0.rsplit_once('@').map(|(l, _)| l).unwrap_or(&self.0) }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum EmailError { Empty, TooLong, Malformed }
impl std::error::Error for EmailError {}
impl fmt::Display for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "email is required"),
            Self::TooLong => write!(f, "email is too long"),
            Self::Malformed => write!(f, "enter a valid email address"),
        }
    }
}

pub const MIN_PASSWORD_LENGTH: usize = 8;

const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "12345678", "123456789", "1234567890", "qwerty123",
    "qwertyuiop", "iloveyou", "11111111", "00000000", "abc12345", "sunshine", "princess",
    "football", "baseball", "welcome1", "letmein1", "admin123", "trustno1", "passw0rd",
];

/// Password policy checked on registration, profile edit and reset.
pub fn check_password(password: &str, email: Option<&Email>) -> Result<(), PasswordError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH { return Err(PasswordError::TooShort); }
    if password.chars().all(|c| c.is_ascii_digit()) { return Err(PasswordError::EntirelyNumeric); }
    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) { return Err(PasswordError::TooCommon); }
    if let Some(email) = email {
        let local = email.local_part().to_lowercase();
        if local.len() >= 3 && (lowered.contains(&local) || local.contains(&lowered)) {
            return Err(PasswordError::TooSimilar);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PasswordError { TooShort, EntirelyNumeric, TooCommon, TooSimilar }
impl std::error::Error for PasswordError {}
impl fmt::Display for PasswordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "password must contain at least {} characters", MIN_PASSWORD_LENGTH),
            Self::EntirelyNumeric => write!(f, "password is entirely numeric"),
            Self::TooCommon => write!(f, "password is too common"),
            Self::TooSimilar => write!(f, "password is too similar to the email"),
        }
    }
}

/// Comma-separated id list as sent by basket and contact removal.
/// Entries that are not plain digits are skipped.
pub fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|s| s.parse().ok())
        .collect()
}

/// Boolean switch spellings accepted for the shop state.
pub fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Some(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalizes_domain() {
        let email = Email::new("  Buyer.One@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "Buyer.One@example.com");
        assert_eq!(email.local_part(), "Buyer.One");
    }

    #[test]
    fn test_email_rejects_garbage() {
        assert_eq!(Email::new(""), Err(EmailError::Empty));
        assert_eq!(Email::new("new_email"), Err(EmailError::Malformed));
        assert_eq!(Email::new("a@localhost"), Err(EmailError::Malformed));
        assert_eq!(Email::new("a b@example.com"), Err(EmailError::Malformed));
    }

    #[test]
    fn test_password_policy() {
        let email = Email::new("testbuyer@gmail.com").unwrap();
        assert_eq!(check_password("1", None), Err(PasswordError::TooShort));
        assert_eq!(check_password("1234567890123", None), Err(PasswordError::EntirelyNumeric));
        assert_eq!(check_password("Password123", None), Err(PasswordError::TooCommon));
        assert_eq!(check_password("testbuyer2024", Some(&email)), Err(PasswordError::TooSimilar));
        assert!(check_password("TestPassword1", Some(&email)).is_ok());
    }

    #[test]
    fn test_id_list_skips_non_digits() {
        assert_eq!(parse_id_list("1,2, 3,x,-4,,5a"), vec![1, 2, 3]);
        assert!(parse_id_list("a,b").is_empty());
    }

    #[test]
    fn test_switch() {
        assert_eq!(parse_switch("On"), Some(true));
        assert_eq!(parse_switch("0"), Some(false));
        assert_eq!(parse_switch("maybe"), None);
    }
}
