use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use gatekeep_core::{DomainError, DomainResult, ValueObject};

/// Role code used for RBAC.
///
/// Like permission codes, role codes are globally unique, exact-match and
/// never normalized. Which permissions a role carries is decided by its
/// association rows, not by the code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleCode(Cow<'static, str>);

impl RoleCode {
    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    pub fn parse(code: impl Into<Cow<'static, str>>) -> DomainResult<Self> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(DomainError::validation("role code cannot be empty"));
        }
        if code.trim() != code {
            return Err(DomainError::validation(
                "role code cannot start or end with whitespace",
            ));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for RoleCode {}

impl core::fmt::Display for RoleCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
