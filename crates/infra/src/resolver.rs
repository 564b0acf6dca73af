//! Effective-permission resolution over a [`GrantStore`].
//!
//! Every call reads live data through one `grant_snapshot`; nothing is
//! cached between calls.

use std::sync::Arc;

use tracing::debug;

use gatekeep_auth::{resolve_permissions, PrincipalRef};
use gatekeep_core::{OrganizationId, UserId};
use gatekeep_directory::Permission;

use crate::store::{GrantStore, StoreError};

pub struct PermissionResolver<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for PermissionResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> PermissionResolver<S>
where
    S: GrantStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Direct grants plus the permissions of every role assigned to the user.
    pub async fn resolve_user_permissions(&self, user: UserId) -> Result<Vec<Permission>, StoreError> {
        self.resolve(PrincipalRef::User(user)).await
    }

    /// Direct grants plus the permissions of the organization's own roles and
    /// of the roles bundled in its active tariff.
    pub async fn resolve_organization_permissions(
        &self,
        organization: OrganizationId,
    ) -> Result<Vec<Permission>, StoreError> {
        self.resolve(PrincipalRef::Organization(organization)).await
    }

    pub async fn resolve(&self, principal: PrincipalRef) -> Result<Vec<Permission>, StoreError> {
        let snapshot = self.store.grant_snapshot(principal).await?;
        let resolved = resolve_permissions(&snapshot.direct, snapshot.role_permissions());
        debug!(
            %principal,
            direct = snapshot.direct.len(),
            roles = snapshot.roles.len(),
            resolved = resolved.len(),
            "permissions resolved"
        );
        Ok(resolved)
    }
}
