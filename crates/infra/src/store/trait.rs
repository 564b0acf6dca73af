use async_trait::async_trait;
use thiserror::Error;

use gatekeep_auth::{PermissionCode, PrincipalRef};
use gatekeep_core::{EntityKind, OrganizationId, PermissionId, RecordId, RoleId, TariffId, UserId};
use gatekeep_directory::{
    Email, Organization, OrganizationChanges, OrganizationDraft, Page, Permission,
    PermissionChanges, PermissionDraft, Role, RoleChanges, RoleDraft, Tariff, TariffChanges,
    TariffDraft, User, UserChanges, UserDraft,
};

use crate::associations::AssociationKind;

/// Store operation error.
///
/// `NotFound`, `Conflict` and `MissingMembers` are decisions the caller may
/// surface. `Backend` is an infrastructure failure and carries the operation
/// name for the logs only.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: i64 },

    /// Uniqueness or referential integrity would be violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Some members of an association batch do not exist.
    #[error("unknown {entity} ids: {ids:?}")]
    MissingMembers { entity: EntityKind, ids: Vec<i64> },

    #[error("storage failure in {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },
}

impl StoreError {
    pub fn not_found<I: RecordId>(id: I) -> Self {
        Self::NotFound {
            entity: I::KIND,
            id: id.raw(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            message: message.into(),
        }
    }
}

/// A role together with the permissions it carried when the snapshot was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrants {
    pub role: Role,
    pub permissions: Vec<Permission>,
}

/// Everything permission resolution needs about one principal, read in a
/// single consistent view of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantSnapshot {
    /// Permissions granted directly to the principal.
    pub direct: Vec<Permission>,

    /// Roles that apply to the principal, ascending by role id. For
    /// organizations this includes the roles bundled in the active tariff.
    pub roles: Vec<RoleGrants>,
}

impl GrantSnapshot {
    pub fn role_permissions(&self) -> impl Iterator<Item = &Permission> {
        self.roles.iter().flat_map(|r| r.permissions.iter())
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the e-mail is taken and `NotFound` when the
    /// referenced organization does not exist.
    async fn insert_user(&self, draft: UserDraft) -> Result<User, StoreError>;

    async fn user(&self, id: UserId) -> Result<User, StoreError>;

    async fn user_by_email(&self, email: &Email) -> Result<Option<User>, StoreError>;

    /// Users ascending by id.
    async fn list_users(&self, page: Page) -> Result<Vec<User>, StoreError>;

    async fn update_user(&self, id: UserId, changes: UserChanges) -> Result<User, StoreError>;

    /// Removes the user and every association row that references it.
    async fn delete_user(&self, id: UserId) -> Result<(), StoreError>;

    async fn set_user_tariff(&self, id: UserId, tariff: Option<TariffId>)
    -> Result<User, StoreError>;
}

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    async fn insert_organization(&self, draft: OrganizationDraft)
    -> Result<Organization, StoreError>;

    async fn organization(&self, id: OrganizationId) -> Result<Organization, StoreError>;

    async fn list_organizations(&self, page: Page) -> Result<Vec<Organization>, StoreError>;

    async fn update_organization(
        &self,
        id: OrganizationId,
        changes: OrganizationChanges,
    ) -> Result<Organization, StoreError>;

    /// Removes the organization and its association rows; members keep their
    /// accounts with the organization reference cleared.
    async fn delete_organization(&self, id: OrganizationId) -> Result<(), StoreError>;

    async fn set_organization_tariff(
        &self,
        id: OrganizationId,
        tariff: Option<TariffId>,
    ) -> Result<Organization, StoreError>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Fails with `Conflict` when the code is taken.
    async fn insert_permission(&self, draft: PermissionDraft) -> Result<Permission, StoreError>;

    async fn permission(&self, id: PermissionId) -> Result<Permission, StoreError>;

    async fn permission_by_code(
        &self,
        code: &PermissionCode,
    ) -> Result<Option<Permission>, StoreError>;

    async fn list_permissions(&self, page: Page) -> Result<Vec<Permission>, StoreError>;

    async fn update_permission(
        &self,
        id: PermissionId,
        changes: PermissionChanges,
    ) -> Result<Permission, StoreError>;

    async fn delete_permission(&self, id: PermissionId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn insert_role(&self, draft: RoleDraft) -> Result<Role, StoreError>;

    async fn role(&self, id: RoleId) -> Result<Role, StoreError>;

    async fn list_roles(&self, page: Page) -> Result<Vec<Role>, StoreError>;

    async fn update_role(&self, id: RoleId, changes: RoleChanges) -> Result<Role, StoreError>;

    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TariffStore: Send + Sync {
    async fn insert_tariff(&self, draft: TariffDraft) -> Result<Tariff, StoreError>;

    async fn tariff(&self, id: TariffId) -> Result<Tariff, StoreError>;

    async fn list_tariffs(&self, page: Page) -> Result<Vec<Tariff>, StoreError>;

    async fn update_tariff(&self, id: TariffId, changes: TariffChanges)
    -> Result<Tariff, StoreError>;

    /// Removes the tariff and its role bundle; subscribers keep their records
    /// with the tariff reference cleared.
    async fn delete_tariff(&self, id: TariffId) -> Result<(), StoreError>;
}

/// Many-to-many association rows, addressed by [`AssociationKind`] and raw ids.
///
/// Every `attach` / `detach` call is one transaction.
#[async_trait]
pub trait AssociationStore: Send + Sync {
    /// Owner missing: `NotFound`. Any member missing: `MissingMembers` and
    /// nothing is written. Already-present rows are left as they are.
    async fn attach(&self, kind: AssociationKind, owner: i64, members: &[i64])
    -> Result<(), StoreError>;

    /// Owner missing: `NotFound`. Rows that do not exist are ignored.
    async fn detach(&self, kind: AssociationKind, owner: i64, members: &[i64])
    -> Result<(), StoreError>;

    /// Associated permissions ascending by id. Only valid for kinds whose
    /// members are permissions.
    async fn associated_permissions(
        &self,
        kind: AssociationKind,
        owner: i64,
    ) -> Result<Vec<Permission>, StoreError>;

    /// Associated roles ascending by id. Only valid for kinds whose members
    /// are roles.
    async fn associated_roles(&self, kind: AssociationKind, owner: i64)
    -> Result<Vec<Role>, StoreError>;
}

#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Read direct grants and applicable roles (with their permissions) in one
    /// read transaction. A principal that does not exist is `NotFound`.
    async fn grant_snapshot(&self, principal: PrincipalRef) -> Result<GrantSnapshot, StoreError>;
}

/// The full directory capability set.
pub trait Directory:
    UserStore + OrganizationStore + PermissionStore + RoleStore + TariffStore + AssociationStore + GrantStore
{
}

impl<T> Directory for T where
    T: UserStore
        + OrganizationStore
        + PermissionStore
        + RoleStore
        + TariffStore
        + AssociationStore
        + GrantStore
{
}
