use serde::{Deserialize, Serialize};

use gatekeep_core::{OrganizationId, UserId};

use crate::{CredentialClaims, PermissionCode};

/// The authenticated principal performing a request.
///
/// Derived from a verified credential; never constructed from raw request
/// input.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActingPrincipal {
    pub user_id: UserId,

    /// Administrative override of the self-only rule.
    pub elevated: bool,
}

impl ActingPrincipal {
    pub fn new(user_id: UserId, elevated: bool) -> Self {
        Self { user_id, elevated }
    }

    /// Build the acting principal from verified claims.
    ///
    /// A principal is elevated only when its credential carries `admin_code`.
    pub fn from_claims(claims: &CredentialClaims, admin_code: &PermissionCode) -> Self {
        let elevated = claims
            .permissions
            .iter()
            .any(|p| p == admin_code);
        Self::new(claims.user_id, elevated)
    }
}

/// Subject of permission resolution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PrincipalRef {
    User(UserId),
    Organization(OrganizationId),
}

impl core::fmt::Display for PrincipalRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PrincipalRef::User(id) => write!(f, "user:{id}"),
            PrincipalRef::Organization(id) => write!(f, "organization:{id}"),
        }
    }
}

impl From<UserId> for PrincipalRef {
    fn from(value: UserId) -> Self {
        PrincipalRef::User(value)
    }
}

impl From<OrganizationId> for PrincipalRef {
    fn from(value: OrganizationId) -> Self {
        PrincipalRef::Organization(value)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn claims_with(codes: &[&'static str]) -> CredentialClaims {
        CredentialClaims::new(
            UserId::new(5),
            "x@example.com",
            "X",
            codes.iter().map(|c| PermissionCode::new(*c)).collect(),
            Utc::now(),
            Duration::hours(1),
        )
    }

    #[test]
    fn admin_code_elevates() {
        let admin = PermissionCode::new("admin");
        assert!(ActingPrincipal::from_claims(&claims_with(&["admin"]), &admin).elevated);
        assert!(!ActingPrincipal::from_claims(&claims_with(&["edit_doc"]), &admin).elevated);
    }

    #[test]
    fn elevation_match_is_exact() {
        let admin = PermissionCode::new("admin");
        assert!(!ActingPrincipal::from_claims(&claims_with(&["Admin"]), &admin).elevated);
    }

    #[test]
    fn only_the_configured_code_elevates() {
        let root = PermissionCode::new("root");
        assert!(ActingPrincipal::from_claims(&claims_with(&["root"]), &root).elevated);
        assert!(!ActingPrincipal::from_claims(&claims_with(&["*"]), &root).elevated);
        assert!(!ActingPrincipal::from_claims(&claims_with(&["admin"]), &root).elevated);
    }
}
