//! In-memory directory for tests/dev.
//!
//! All tables sit behind one `RwLock`, so every operation (including a whole
//! attach batch or a grant snapshot) observes and mutates a single consistent
//! state. Referential rules mirror the Postgres schema: association rows
//! cascade with either endpoint, tariff and organization references are
//! cleared when their target is deleted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use gatekeep_auth::{PermissionCode, PrincipalRef, RoleCode};
use gatekeep_core::{EntityKind, OrganizationId, PermissionId, RecordId, RoleId, TariffId, UserId};
use gatekeep_directory::{
    Email, Organization, OrganizationChanges, OrganizationDraft, Page, Permission,
    PermissionChanges, PermissionDraft, Role, RoleChanges, RoleDraft, Tariff, TariffChanges,
    TariffDraft, User, UserChanges, UserDraft,
};

use super::r#trait::{
    AssociationStore, GrantSnapshot, GrantStore, OrganizationStore, PermissionStore, RoleGrants,
    RoleStore, StoreError, TariffStore, UserStore,
};
use crate::associations::AssociationKind;

#[derive(Debug, Default)]
struct Tables {
    last_id: BTreeMap<EntityKind, i64>,
    users: BTreeMap<UserId, User>,
    organizations: BTreeMap<OrganizationId, Organization>,
    permissions: BTreeMap<PermissionId, Permission>,
    roles: BTreeMap<RoleId, Role>,
    tariffs: BTreeMap<TariffId, Tariff>,
    /// (owner, member) pairs per relation.
    links: BTreeMap<AssociationKind, BTreeSet<(i64, i64)>>,
}

impl Tables {
    fn next_id<I: RecordId>(&mut self) -> I {
        let last = self.last_id.entry(I::KIND).or_insert(0);
        *last += 1;
        I::from_raw(*last)
    }

    fn exists(&self, kind: EntityKind, id: i64) -> bool {
        match kind {
            EntityKind::User => self.users.contains_key(&UserId::from_raw(id)),
            EntityKind::Organization => self.organizations.contains_key(&OrganizationId::from_raw(id)),
            EntityKind::Permission => self.permissions.contains_key(&PermissionId::from_raw(id)),
            EntityKind::Role => self.roles.contains_key(&RoleId::from_raw(id)),
            EntityKind::Tariff => self.tariffs.contains_key(&TariffId::from_raw(id)),
        }
    }

    fn ensure<I: RecordId>(&self, id: I) -> Result<(), StoreError> {
        if self.exists(I::KIND, id.raw()) {
            Ok(())
        } else {
            Err(StoreError::not_found(id))
        }
    }

    fn ensure_raw(&self, kind: EntityKind, id: i64) -> Result<(), StoreError> {
        if self.exists(kind, id) {
            Ok(())
        } else {
            Err(StoreError::NotFound { entity: kind, id })
        }
    }

    fn member_ids(&self, kind: AssociationKind, owner: i64) -> Vec<i64> {
        self.links
            .get(&kind)
            .map(|rows| {
                rows.range((owner, i64::MIN)..=(owner, i64::MAX))
                    .map(|(_, member)| *member)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn permissions_of(&self, kind: AssociationKind, owner: i64) -> Vec<Permission> {
        self.member_ids(kind, owner)
            .into_iter()
            .filter_map(|id| self.permissions.get(&PermissionId::from_raw(id)).cloned())
            .collect()
    }

    fn roles_of(&self, kind: AssociationKind, owner: i64) -> Vec<Role> {
        self.member_ids(kind, owner)
            .into_iter()
            .filter_map(|id| self.roles.get(&RoleId::from_raw(id)).cloned())
            .collect()
    }

    /// Drop every association row that has `id` of `kind` on either side.
    fn cascade(&mut self, kind: EntityKind, id: i64) {
        for assoc in AssociationKind::ALL {
            let owner_side = assoc.owner_kind() == kind;
            let member_side = assoc.member_kind() == kind;
            if !owner_side && !member_side {
                continue;
            }
            if let Some(rows) = self.links.get_mut(&assoc) {
                rows.retain(|(owner, member)| {
                    !(owner_side && *owner == id) && !(member_side && *member == id)
                });
            }
        }
    }

    fn email_taken(&self, email: &Email, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email.as_str() && Some(u.id) != except)
    }

    fn permission_code_taken(&self, code: &PermissionCode, except: Option<PermissionId>) -> bool {
        self.permissions
            .values()
            .any(|p| &p.code == code && Some(p.id) != except)
    }

    fn role_code_taken(&self, code: &RoleCode, except: Option<RoleId>) -> bool {
        self.roles
            .values()
            .any(|r| &r.code == code && Some(r.id) != except)
    }

    fn role_grants(&self, role_ids: impl IntoIterator<Item = i64>) -> Vec<RoleGrants> {
        role_ids
            .into_iter()
            .filter_map(|id| self.roles.get(&RoleId::from_raw(id)))
            .map(|role| RoleGrants {
                role: role.clone(),
                permissions: self.permissions_of(AssociationKind::RolePermissions, role.id.raw()),
            })
            .collect()
    }
}

fn paged<T>(rows: impl ExactSizeIterator<Item = T>, page: Page) -> Vec<T> {
    let window = page.window(rows.len());
    rows.skip(window.start).take(window.len()).collect()
}

/// In-memory implementation of every directory store trait.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    inner: RwLock<Tables>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, operation: &'static str) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::backend(operation, "lock poisoned"))
    }

    fn write(&self, operation: &'static str) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::backend(operation, "lock poisoned"))
    }
}

#[async_trait]
impl UserStore for InMemoryDirectory {
    async fn insert_user(&self, draft: UserDraft) -> Result<User, StoreError> {
        let mut t = self.write("insert_user")?;
        if t.email_taken(&draft.email, None) {
            return Err(StoreError::conflict("email already registered"));
        }
        if let Some(org) = draft.organization_id {
            t.ensure(org)?;
        }
        let user = User {
            id: t.next_id(),
            name: draft.name,
            email: draft.email.into_string(),
            password_hash: draft.password_hash,
            organization_id: draft.organization_id,
            tariff_id: None,
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user(&self, id: UserId) -> Result<User, StoreError> {
        let t = self.read("user")?;
        t.users.get(&id).cloned().ok_or_else(|| StoreError::not_found(id))
    }

    async fn user_by_email(&self, email: &Email) -> Result<Option<User>, StoreError> {
        let t = self.read("user_by_email")?;
        Ok(t.users.values().find(|u| u.email == email.as_str()).cloned())
    }

    async fn list_users(&self, page: Page) -> Result<Vec<User>, StoreError> {
        let t = self.read("list_users")?;
        Ok(paged(t.users.values().cloned(), page))
    }

    async fn update_user(&self, id: UserId, changes: UserChanges) -> Result<User, StoreError> {
        let mut t = self.write("update_user")?;
        t.ensure(id)?;
        if let Some(email) = &changes.email {
            if t.email_taken(email, Some(id)) {
                return Err(StoreError::conflict("email already registered"));
            }
        }
        if let Some(org) = changes.organization_id {
            t.ensure(org)?;
        }
        let user = t.users.get_mut(&id).ok_or_else(|| StoreError::not_found(id))?;
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(email) = changes.email {
            user.email = email.into_string();
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        if let Some(org) = changes.organization_id {
            user.organization_id = Some(org);
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: UserId) -> Result<(), StoreError> {
        let mut t = self.write("delete_user")?;
        t.users.remove(&id).ok_or_else(|| StoreError::not_found(id))?;
        t.cascade(EntityKind::User, id.raw());
        Ok(())
    }

    async fn set_user_tariff(&self, id: UserId, tariff: Option<TariffId>) -> Result<User, StoreError> {
        let mut t = self.write("set_user_tariff")?;
        t.ensure(id)?;
        if let Some(tariff) = tariff {
            t.ensure(tariff)?;
        }
        let user = t.users.get_mut(&id).ok_or_else(|| StoreError::not_found(id))?;
        user.tariff_id = tariff;
        Ok(user.clone())
    }
}

#[async_trait]
impl OrganizationStore for InMemoryDirectory {
    async fn insert_organization(&self, draft: OrganizationDraft) -> Result<Organization, StoreError> {
        let mut t = self.write("insert_organization")?;
        let org = Organization {
            id: t.next_id(),
            name: draft.name,
            tariff_id: None,
        };
        t.organizations.insert(org.id, org.clone());
        Ok(org)
    }

    async fn organization(&self, id: OrganizationId) -> Result<Organization, StoreError> {
        let t = self.read("organization")?;
        t.organizations
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id))
    }

    async fn list_organizations(&self, page: Page) -> Result<Vec<Organization>, StoreError> {
        let t = self.read("list_organizations")?;
        Ok(paged(t.organizations.values().cloned(), page))
    }

    async fn update_organization(
        &self,
        id: OrganizationId,
        changes: OrganizationChanges,
    ) -> Result<Organization, StoreError> {
        let mut t = self.write("update_organization")?;
        let org = t
            .organizations
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(id))?;
        if let Some(name) = changes.name {
            org.name = name;
        }
        Ok(org.clone())
    }

    async fn delete_organization(&self, id: OrganizationId) -> Result<(), StoreError> {
        let mut t = self.write("delete_organization")?;
        t.organizations
            .remove(&id)
            .ok_or_else(|| StoreError::not_found(id))?;
        t.cascade(EntityKind::Organization, id.raw());
        for user in t.users.values_mut() {
            if user.organization_id == Some(id) {
                user.organization_id = None;
            }
        }
        Ok(())
    }

    async fn set_organization_tariff(
        &self,
        id: OrganizationId,
        tariff: Option<TariffId>,
    ) -> Result<Organization, StoreError> {
        let mut t = self.write("set_organization_tariff")?;
        t.ensure(id)?;
        if let Some(tariff) = tariff {
            t.ensure(tariff)?;
        }
        let org = t
            .organizations
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(id))?;
        org.tariff_id = tariff;
        Ok(org.clone())
    }
}

#[async_trait]
impl PermissionStore for InMemoryDirectory {
    async fn insert_permission(&self, draft: PermissionDraft) -> Result<Permission, StoreError> {
        let mut t = self.write("insert_permission")?;
        if t.permission_code_taken(&draft.code, None) {
            return Err(StoreError::conflict(format!(
                "permission code '{}' already exists",
                draft.code
            )));
        }
        let permission = Permission {
            id: t.next_id(),
            name: draft.name,
            code: draft.code,
            description: draft.description,
        };
        t.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn permission(&self, id: PermissionId) -> Result<Permission, StoreError> {
        let t = self.read("permission")?;
        t.permissions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id))
    }

    async fn permission_by_code(&self, code: &PermissionCode) -> Result<Option<Permission>, StoreError> {
        let t = self.read("permission_by_code")?;
        Ok(t.permissions.values().find(|p| &p.code == code).cloned())
    }

    async fn list_permissions(&self, page: Page) -> Result<Vec<Permission>, StoreError> {
        let t = self.read("list_permissions")?;
        Ok(paged(t.permissions.values().cloned(), page))
    }

    async fn update_permission(
        &self,
        id: PermissionId,
        changes: PermissionChanges,
    ) -> Result<Permission, StoreError> {
        let mut t = self.write("update_permission")?;
        t.ensure(id)?;
        if let Some(code) = &changes.code {
            if t.permission_code_taken(code, Some(id)) {
                return Err(StoreError::conflict(format!(
                    "permission code '{code}' already exists"
                )));
            }
        }
        let permission = t
            .permissions
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(id))?;
        if let Some(name) = changes.name {
            permission.name = name;
        }
        if let Some(code) = changes.code {
            permission.code = code;
        }
        if let Some(description) = changes.description {
            permission.description = description;
        }
        Ok(permission.clone())
    }

    async fn delete_permission(&self, id: PermissionId) -> Result<(), StoreError> {
        let mut t = self.write("delete_permission")?;
        t.permissions
            .remove(&id)
            .ok_or_else(|| StoreError::not_found(id))?;
        t.cascade(EntityKind::Permission, id.raw());
        Ok(())
    }
}

#[async_trait]
impl RoleStore for InMemoryDirectory {
    async fn insert_role(&self, draft: RoleDraft) -> Result<Role, StoreError> {
        let mut t = self.write("insert_role")?;
        if t.role_code_taken(&draft.code, None) {
            return Err(StoreError::conflict(format!(
                "role code '{}' already exists",
                draft.code
            )));
        }
        let role = Role {
            id: t.next_id(),
            name: draft.name,
            code: draft.code,
            description: draft.description,
        };
        t.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn role(&self, id: RoleId) -> Result<Role, StoreError> {
        let t = self.read("role")?;
        t.roles.get(&id).cloned().ok_or_else(|| StoreError::not_found(id))
    }

    async fn list_roles(&self, page: Page) -> Result<Vec<Role>, StoreError> {
        let t = self.read("list_roles")?;
        Ok(paged(t.roles.values().cloned(), page))
    }

    async fn update_role(&self, id: RoleId, changes: RoleChanges) -> Result<Role, StoreError> {
        let mut t = self.write("update_role")?;
        t.ensure(id)?;
        if let Some(code) = &changes.code {
            if t.role_code_taken(code, Some(id)) {
                return Err(StoreError::conflict(format!("role code '{code}' already exists")));
            }
        }
        let role = t.roles.get_mut(&id).ok_or_else(|| StoreError::not_found(id))?;
        if let Some(name) = changes.name {
            role.name = name;
        }
        if let Some(code) = changes.code {
            role.code = code;
        }
        if let Some(description) = changes.description {
            role.description = description;
        }
        Ok(role.clone())
    }

    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError> {
        let mut t = self.write("delete_role")?;
        t.roles.remove(&id).ok_or_else(|| StoreError::not_found(id))?;
        t.cascade(EntityKind::Role, id.raw());
        Ok(())
    }
}

#[async_trait]
impl TariffStore for InMemoryDirectory {
    async fn insert_tariff(&self, draft: TariffDraft) -> Result<Tariff, StoreError> {
        let mut t = self.write("insert_tariff")?;
        let tariff = Tariff {
            id: t.next_id(),
            name: draft.name,
            description: draft.description,
            price: draft.price,
        };
        t.tariffs.insert(tariff.id, tariff.clone());
        Ok(tariff)
    }

    async fn tariff(&self, id: TariffId) -> Result<Tariff, StoreError> {
        let t = self.read("tariff")?;
        t.tariffs.get(&id).cloned().ok_or_else(|| StoreError::not_found(id))
    }

    async fn list_tariffs(&self, page: Page) -> Result<Vec<Tariff>, StoreError> {
        let t = self.read("list_tariffs")?;
        Ok(paged(t.tariffs.values().cloned(), page))
    }

    async fn update_tariff(&self, id: TariffId, changes: TariffChanges) -> Result<Tariff, StoreError> {
        let mut t = self.write("update_tariff")?;
        let tariff = t.tariffs.get_mut(&id).ok_or_else(|| StoreError::not_found(id))?;
        if let Some(name) = changes.name {
            tariff.name = name;
        }
        if let Some(description) = changes.description {
            tariff.description = description;
        }
        if let Some(price) = changes.price {
            tariff.price = price;
        }
        Ok(tariff.clone())
    }

    async fn delete_tariff(&self, id: TariffId) -> Result<(), StoreError> {
        let mut t = self.write("delete_tariff")?;
        t.tariffs.remove(&id).ok_or_else(|| StoreError::not_found(id))?;
        t.cascade(EntityKind::Tariff, id.raw());
        for user in t.users.values_mut() {
            if user.tariff_id == Some(id) {
                user.tariff_id = None;
            }
        }
        for org in t.organizations.values_mut() {
            if org.tariff_id == Some(id) {
                org.tariff_id = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AssociationStore for InMemoryDirectory {
    async fn attach(&self, kind: AssociationKind, owner: i64, members: &[i64]) -> Result<(), StoreError> {
        let mut t = self.write("attach")?;
        t.ensure_raw(kind.owner_kind(), owner)?;

        let member_kind = kind.member_kind();
        let mut missing: Vec<i64> = members
            .iter()
            .copied()
            .filter(|id| !t.exists(member_kind, *id))
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            missing.dedup();
            return Err(StoreError::MissingMembers {
                entity: member_kind,
                ids: missing,
            });
        }

        let rows = t.links.entry(kind).or_default();
        for member in members {
            rows.insert((owner, *member));
        }
        Ok(())
    }

    async fn detach(&self, kind: AssociationKind, owner: i64, members: &[i64]) -> Result<(), StoreError> {
        let mut t = self.write("detach")?;
        t.ensure_raw(kind.owner_kind(), owner)?;
        if let Some(rows) = t.links.get_mut(&kind) {
            for member in members {
                rows.remove(&(owner, *member));
            }
        }
        Ok(())
    }

    async fn associated_permissions(
        &self,
        kind: AssociationKind,
        owner: i64,
    ) -> Result<Vec<Permission>, StoreError> {
        if kind.member_kind() != EntityKind::Permission {
            return Err(StoreError::backend(
                "associated_permissions",
                format!("{kind} does not hold permissions"),
            ));
        }
        let t = self.read("associated_permissions")?;
        t.ensure_raw(kind.owner_kind(), owner)?;
        Ok(t.permissions_of(kind, owner))
    }

    async fn associated_roles(&self, kind: AssociationKind, owner: i64) -> Result<Vec<Role>, StoreError> {
        if kind.member_kind() != EntityKind::Role {
            return Err(StoreError::backend(
                "associated_roles",
                format!("{kind} does not hold roles"),
            ));
        }
        let t = self.read("associated_roles")?;
        t.ensure_raw(kind.owner_kind(), owner)?;
        Ok(t.roles_of(kind, owner))
    }
}

#[async_trait]
impl GrantStore for InMemoryDirectory {
    async fn grant_snapshot(&self, principal: PrincipalRef) -> Result<GrantSnapshot, StoreError> {
        let t = self.read("grant_snapshot")?;
        match principal {
            PrincipalRef::User(id) => {
                t.ensure(id)?;
                Ok(GrantSnapshot {
                    direct: t.permissions_of(AssociationKind::UserPermissions, id.raw()),
                    roles: t.role_grants(t.member_ids(AssociationKind::UserRoles, id.raw())),
                })
            }
            PrincipalRef::Organization(id) => {
                let org = t
                    .organizations
                    .get(&id)
                    .ok_or_else(|| StoreError::not_found(id))?;
                let mut role_ids: BTreeSet<i64> = t
                    .member_ids(AssociationKind::OrganizationRoles, id.raw())
                    .into_iter()
                    .collect();
                if let Some(tariff) = org.tariff_id {
                    role_ids.extend(t.member_ids(AssociationKind::TariffRoles, tariff.raw()));
                }
                Ok(GrantSnapshot {
                    direct: t.permissions_of(AssociationKind::OrganizationPermissions, id.raw()),
                    roles: t.role_grants(role_ids),
                })
            }
        }
    }
}
