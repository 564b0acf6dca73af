use gatekeep_auth::{ActingPrincipal, CredentialClaims, PermissionCode};
use gatekeep_core::UserId;

/// Principal context for a request (verified credential + derived gate input).
///
/// Inserted by the auth middleware; handlers never build it from request
/// input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    claims: CredentialClaims,
    principal: ActingPrincipal,
}

impl PrincipalContext {
    pub fn new(claims: CredentialClaims, admin_permission: &PermissionCode) -> Self {
        let principal = ActingPrincipal::from_claims(&claims, admin_permission);
        Self { claims, principal }
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn principal(&self) -> &ActingPrincipal {
        &self.principal
    }

    pub fn claims(&self) -> &CredentialClaims {
        &self.claims
    }
}
