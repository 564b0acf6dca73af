use serde::{Deserialize, Serialize};

use gatekeep_core::{DomainError, DomainResult, ValueObject};

/// Normalized e-mail address.
///
/// Addresses are trimmed and lower-cased on the way in, so lookups by e-mail
/// are insensitive to the casing a caller typed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let normalized = raw.trim().to_lowercase();
        // Basic shape check: something on both sides of a single '@'.
        let mut parts = normalized.split('@');
        let valid = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty()
        );
        if !valid {
            return Err(DomainError::validation("invalid email format"));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl ValueObject for Email {}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let email = Email::parse("  Ada@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "ada@example.com");
    }

    #[test]
    fn rejects_malformed_addresses() {
        for raw in ["", "ada", "@example.com", "ada@", "a@b@c"] {
            assert!(Email::parse(raw).is_err(), "{raw} should be rejected");
        }
    }
}
