//! Email addresses as typed into the login and registration forms.
//!
//! The BookSwap API matches addresses case-insensitively, so an [`Email`] is
//! always stored trimmed and lowercased. Error messages are shown next to the
//! form field as-is.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Why an address was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("Enter your email address")]
    Empty,
    #[error("Email address must be at most {max} characters")]
    TooLong { max: usize },
    #[error("Enter a valid email address, like name@example.com")]
    Malformed,
}

/// A trimmed, lowercased email address with one `@`, a non-empty local part
/// and a dotted domain.
///
/// ```
/// use bookswap_core::Email;
///
/// let email = Email::parse("  Reader@BookSwap.Example ").unwrap();
/// assert_eq!(email.as_str(), "reader@bookswap.example");
///
/// assert!(Email::parse("reader@localhost").is_err());
/// assert!(Email::parse("two@@signs.example").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// RFC 5321 path limit.
    pub const MAX_LENGTH: usize = 254;

    /// Normalize and validate user input.
    ///
    /// # Errors
    ///
    /// Returns the [`EmailError`] to show next to the field.
    pub fn parse(input: &str) -> Result<Self, EmailError> {
        let email = input.trim().to_lowercase();
        if email.is_empty() {
            return Err(EmailError::Empty);
        }
        if email.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        let (local, domain) = email.split_once('@').ok_or(EmailError::Malformed)?;
        let domain_ok = domain
            .split('.')
            .all(|label| !label.is_empty() && !label.starts_with('-') && !label.ends_with('-'))
            && domain.contains('.');
        if local.is_empty() || domain.contains('@') || !domain_ok || email.contains(char::is_whitespace)
        {
            return Err(EmailError::Malformed);
        }

        Ok(Self(email))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Domain part, after the `@`.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split_once('@').map_or("", |(_, domain)| domain)
    }

    /// Address with the local part hidden, for logs: `r***@bookswap.example`.
    #[must_use]
    pub fn masked(&self) -> String {
        let first = self.0.chars().next().unwrap_or('*');
        format!("{first}***@{}", self.domain())
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_input_is_normalized() {
        let email = Email::parse("  Ada.Lovelace+books@BookSwap.Example\n").unwrap();
        assert_eq!(email.as_str(), "ada.lovelace+books@bookswap.example");
        assert_eq!(email.domain(), "bookswap.example");
    }

    #[test]
    fn test_blank_input_is_empty() {
        assert_eq!(Email::parse(""), Err(EmailError::Empty));
        assert_eq!(Email::parse("   "), Err(EmailError::Empty));
    }

    #[test]
    fn test_malformed_addresses() {
        for input in [
            "no-at-symbol",
            "@bookswap.example",
            "reader@",
            "reader@localhost",
            "reader@bookswap..example",
            "reader@-bookswap.example",
            "two@@bookswap.example",
            "two@signs@bookswap.example",
            "read er@bookswap.example",
        ] {
            assert_eq!(Email::parse(input), Err(EmailError::Malformed), "{input}");
        }
    }

    #[test]
    fn test_too_long() {
        let input = format!("{}@bookswap.example", "a".repeat(250));
        assert_eq!(
            Email::parse(&input),
            Err(EmailError::TooLong { max: 254 })
        );
    }

    #[test]
    fn test_masked_hides_local_part() {
        let email = Email::parse("reader@bookswap.example").unwrap();
        assert_eq!(email.masked(), "r***@bookswap.example");
    }

    #[test]
    fn test_messages_are_form_ready() {
        assert_eq!(
            EmailError::Malformed.to_string(),
            "Enter a valid email address, like name@example.com"
        );
    }

    #[test]
    fn test_serde_validates() {
        let email: Email = serde_json::from_str("\"Reader@BookSwap.example\"").unwrap();
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"reader@bookswap.example\"");
        assert!(serde_json::from_str::<Email>("\"nope\"").is_err());
    }
}
