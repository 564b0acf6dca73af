use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use gatekeep_core::{DomainError, DomainResult, ValueObject};

/// Permission code.
///
/// Permissions are modeled as opaque strings (e.g. "edit_doc"). Codes are
/// compared exactly: they are case-sensitive and never normalized.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionCode(Cow<'static, str>);

impl PermissionCode {
    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    /// Validate caller-supplied input.
    ///
    /// Rejects empty codes and codes with surrounding whitespace instead of
    /// trimming them, since a trimmed code would silently differ from the one
    /// the caller asked for.
    pub fn parse(code: impl Into<Cow<'static, str>>) -> DomainResult<Self> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(DomainError::validation("permission code cannot be empty"));
        }
        if code.trim() != code {
            return Err(DomainError::validation(
                "permission code cannot start or end with whitespace",
            ));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for PermissionCode {}

impl core::fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
