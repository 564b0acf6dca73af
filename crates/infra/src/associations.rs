//! Association manager: attach, detach and list the many-to-many relations.
//!
//! The six relations share one behaviour, so they are modelled as marker types
//! implementing [`Association`] and driven by a single generic manager.
//!
//! - Attach is idempotent and all-or-nothing per batch.
//! - Detach tolerates members that are not attached.
//! - Both return the member list as it stands afterwards.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use gatekeep_core::{Entity, EntityKind, OrganizationId, RecordId, RoleId, TariffId, UserId};
use gatekeep_directory::{Permission, Role};

use crate::store::{AssociationStore, StoreError};

/// The association relations kept by the directory.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    /// A role's owned permission set.
    RolePermissions,
    UserRoles,
    UserPermissions,
    OrganizationRoles,
    OrganizationPermissions,
    /// A tariff's bundled roles.
    TariffRoles,
}

impl AssociationKind {
    pub const ALL: [AssociationKind; 6] = [
        AssociationKind::RolePermissions,
        AssociationKind::UserRoles,
        AssociationKind::UserPermissions,
        AssociationKind::OrganizationRoles,
        AssociationKind::OrganizationPermissions,
        AssociationKind::TariffRoles,
    ];

    pub fn owner_kind(self) -> EntityKind {
        match self {
            AssociationKind::RolePermissions => EntityKind::Role,
            AssociationKind::UserRoles | AssociationKind::UserPermissions => EntityKind::User,
            AssociationKind::OrganizationRoles | AssociationKind::OrganizationPermissions => {
                EntityKind::Organization
            }
            AssociationKind::TariffRoles => EntityKind::Tariff,
        }
    }

    pub fn member_kind(self) -> EntityKind {
        match self {
            AssociationKind::RolePermissions
            | AssociationKind::UserPermissions
            | AssociationKind::OrganizationPermissions => EntityKind::Permission,
            AssociationKind::UserRoles
            | AssociationKind::OrganizationRoles
            | AssociationKind::TariffRoles => EntityKind::Role,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssociationKind::RolePermissions => "role_permissions",
            AssociationKind::UserRoles => "user_roles",
            AssociationKind::UserPermissions => "user_permissions",
            AssociationKind::OrganizationRoles => "organization_roles",
            AssociationKind::OrganizationPermissions => "organization_permissions",
            AssociationKind::TariffRoles => "tariff_roles",
        }
    }
}

impl core::fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records that can appear on the member side of an association.
#[async_trait]
pub trait AssociationMember: Entity + Sized + Send + 'static {
    async fn associated<S>(
        store: &S,
        kind: AssociationKind,
        owner: i64,
    ) -> Result<Vec<Self>, StoreError>
    where
        S: AssociationStore + ?Sized;
}

#[async_trait]
impl AssociationMember for Permission {
    async fn associated<S>(
        store: &S,
        kind: AssociationKind,
        owner: i64,
    ) -> Result<Vec<Self>, StoreError>
    where
        S: AssociationStore + ?Sized,
    {
        store.associated_permissions(kind, owner).await
    }
}

#[async_trait]
impl AssociationMember for Role {
    async fn associated<S>(
        store: &S,
        kind: AssociationKind,
        owner: i64,
    ) -> Result<Vec<Self>, StoreError>
    where
        S: AssociationStore + ?Sized,
    {
        store.associated_roles(kind, owner).await
    }
}

/// Type-level description of one association relation.
pub trait Association: Send + Sync + 'static {
    const KIND: AssociationKind;
    type Owner: RecordId;
    type Member: AssociationMember;
}

macro_rules! association {
    ($(#[$doc:meta])* $name:ident, $kind:expr, $owner:ty, $member:ty) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl Association for $name {
            const KIND: AssociationKind = $kind;
            type Owner = $owner;
            type Member = $member;
        }
    };
}

association!(
    /// Role → Permission.
    RolePermissions, AssociationKind::RolePermissions, RoleId, Permission
);
association!(UserRoles, AssociationKind::UserRoles, UserId, Role);
association!(UserPermissions, AssociationKind::UserPermissions, UserId, Permission);
association!(OrganizationRoles, AssociationKind::OrganizationRoles, OrganizationId, Role);
association!(
    OrganizationPermissions,
    AssociationKind::OrganizationPermissions,
    OrganizationId,
    Permission
);
association!(
    /// Tariff → Role bundle.
    TariffRoles, AssociationKind::TariffRoles, TariffId, Role
);

/// Identifier type of an association's members.
pub type MemberId<A> = <<A as Association>::Member as Entity>::Id;

#[derive(Debug, Error)]
pub enum AssociationError {
    #[error("at least one member id is required")]
    EmptyBatch,

    #[error("invalid member id: {0}")]
    InvalidMember(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Check a caller batch before any store access: non-empty, positive ids,
/// duplicates collapsed. The result is ascending.
fn normalize_batch<I: RecordId>(members: &[I]) -> Result<Vec<i64>, AssociationError> {
    if members.is_empty() {
        return Err(AssociationError::EmptyBatch);
    }
    let mut ids = BTreeSet::new();
    for member in members {
        let raw = member.raw();
        if raw <= 0 {
            return Err(AssociationError::InvalidMember(raw));
        }
        ids.insert(raw);
    }
    Ok(ids.into_iter().collect())
}

pub struct AssociationManager<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for AssociationManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> AssociationManager<S>
where
    S: AssociationStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn attach<A: Association>(
        &self,
        owner: A::Owner,
        members: &[MemberId<A>],
    ) -> Result<Vec<A::Member>, AssociationError> {
        let ids = normalize_batch(members)?;
        self.store.attach(A::KIND, owner.raw(), &ids).await?;
        info!(association = %A::KIND, owner = owner.raw(), members = ?ids, "attached");
        self.list::<A>(owner).await
    }

    pub async fn detach<A: Association>(
        &self,
        owner: A::Owner,
        members: &[MemberId<A>],
    ) -> Result<Vec<A::Member>, AssociationError> {
        let ids = normalize_batch(members)?;
        self.store.detach(A::KIND, owner.raw(), &ids).await?;
        info!(association = %A::KIND, owner = owner.raw(), members = ?ids, "detached");
        self.list::<A>(owner).await
    }

    pub async fn list<A: Association>(
        &self,
        owner: A::Owner,
    ) -> Result<Vec<A::Member>, AssociationError> {
        Ok(A::Member::associated(&*self.store, A::KIND, owner.raw()).await?)
    }
}
