//! Postgres-backed directory.
//!
//! Referential integrity is enforced by the schema: association tables use
//! composite primary keys and `ON DELETE CASCADE` on both foreign keys, while
//! tariff and organization references on records use `ON DELETE SET NULL`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate e-mail or code |
//! | Database (foreign key violation) | `23503` | `Conflict` | Referenced row deleted concurrently |
//! | Database (check violation) | `23514` | `Conflict` | Constraint such as `price >= 0` |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed / other | N/A | `Backend` | Network errors, connection failures, etc. |
//!
//! Missing records are detected by explicit existence checks inside the same
//! transaction and reported as `NotFound` / `MissingMembers`.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{FromRow, PgConnection, Row};
use tracing::instrument;

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

/// Schema statements, applied in order by [`PostgresDirectory::init_schema`].
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tariffs (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        price BIGINT NOT NULL DEFAULT 0 CHECK (price >= 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS organizations (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        tariff_id BIGINT REFERENCES tariffs(id) ON DELETE SET NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        organization_id BIGINT REFERENCES organizations(id) ON DELETE SET NULL,
        tariff_id BIGINT REFERENCES tariffs(id) ON DELETE SET NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS permissions (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        code TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        code TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_permissions (
        role_id BIGINT NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        permission_id BIGINT NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
        PRIMARY KEY (role_id, permission_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        role_id BIGINT NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, role_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_permissions (
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        permission_id BIGINT NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, permission_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS organization_roles (
        organization_id BIGINT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
        role_id BIGINT NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        PRIMARY KEY (organization_id, role_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS organization_permissions (
        organization_id BIGINT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
        permission_id BIGINT NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
        PRIMARY KEY (organization_id, permission_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tariff_roles (
        tariff_id BIGINT NOT NULL REFERENCES tariffs(id) ON DELETE CASCADE,
        role_id BIGINT NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        PRIMARY KEY (tariff_id, role_id)
    )
    "#,
];

fn table_of(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User => "users",
        EntityKind::Organization => "organizations",
        EntityKind::Permission => "permissions",
        EntityKind::Role => "roles",
        EntityKind::Tariff => "tariffs",
    }
}

/// Column layout of one association table.
struct LinkTable {
    table: &'static str,
    owner_column: &'static str,
    member_column: &'static str,
}

fn link_table(kind: AssociationKind) -> LinkTable {
    let (owner_column, member_column) = match kind {
        AssociationKind::RolePermissions => ("role_id", "permission_id"),
        AssociationKind::UserRoles => ("user_id", "role_id"),
        AssociationKind::UserPermissions => ("user_id", "permission_id"),
        AssociationKind::OrganizationRoles => ("organization_id", "role_id"),
        AssociationKind::OrganizationPermissions => ("organization_id", "permission_id"),
        AssociationKind::TariffRoles => ("tariff_id", "role_id"),
    };
    LinkTable {
        table: kind.as_str(),
        owner_column,
        member_column,
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, organization_id, tariff_id";
const ORGANIZATION_COLUMNS: &str = "id, name, tariff_id";
const PERMISSION_COLUMNS: &str = "id, name, code, description";
const ROLE_COLUMNS: &str = "id, name, code, description";
const TARIFF_COLUMNS: &str = "id, name, description, price";

/// Postgres-backed directory store.
///
/// `PostgresDirectory` is `Send + Sync` and cheap to clone; all operations go
/// through the SQLx connection pool.
#[derive(Debug, Clone)]
pub struct PostgresDirectory {
    pool: Arc<PgPool>,
}

impl PostgresDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create every table that does not exist yet, in one transaction.
    #[instrument(skip(self), err)]
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("init_schema", e))?;
        }
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }

    async fn delete_by_id(&self, kind: EntityKind, id: i64, operation: &'static str) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", table_of(kind));
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: kind, id });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn ensure_exists(
    conn: &mut PgConnection,
    kind: EntityKind,
    id: i64,
    operation: &'static str,
) -> Result<(), StoreError> {
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)", table_of(kind));
    let exists: bool = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::NotFound { entity: kind, id })
    }
}

async fn linked_permissions(
    conn: &mut PgConnection,
    kind: AssociationKind,
    owner: i64,
) -> Result<Vec<Permission>, StoreError> {
    let link = link_table(kind);
    let sql = format!(
        "SELECT p.id, p.name, p.code, p.description FROM permissions p \
         JOIN {table} l ON l.{member} = p.id \
         WHERE l.{owner} = $1 ORDER BY p.id",
        table = link.table,
        member = link.member_column,
        owner = link.owner_column,
    );
    let rows: Vec<PermissionRow> = sqlx::query_as(&sql)
        .bind(owner)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("linked_permissions", e))?;
    Ok(rows.into_iter().map(Into::into).collect())
}

async fn linked_roles(
    conn: &mut PgConnection,
    kind: AssociationKind,
    owner: i64,
) -> Result<Vec<Role>, StoreError> {
    let link = link_table(kind);
    let sql = format!(
        "SELECT r.id, r.name, r.code, r.description FROM roles r \
         JOIN {table} l ON l.{member} = r.id \
         WHERE l.{owner} = $1 ORDER BY r.id",
        table = link.table,
        member = link.member_column,
        owner = link.owner_column,
    );
    let rows: Vec<RoleRow> = sqlx::query_as(&sql)
        .bind(owner)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("linked_roles", e))?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Attach each role's permission set. One query per role, inside the caller's
/// transaction.
async fn with_permissions(conn: &mut PgConnection, roles: Vec<Role>) -> Result<Vec<RoleGrants>, StoreError> {
    let mut grants = Vec::with_capacity(roles.len());
    for role in roles {
        let permissions = linked_permissions(conn, AssociationKind::RolePermissions, role.id.raw()).await?;
        grants.push(RoleGrants { role, permissions });
    }
    Ok(grants)
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl UserStore for PostgresDirectory {
    #[instrument(skip(self, draft), fields(email = %draft.email), err)]
    async fn insert_user(&self, draft: UserDraft) -> Result<User, StoreError> {
        let mut tx = self.begin().await?;
        if let Some(org) = draft.organization_id {
            ensure_exists(&mut tx, EntityKind::Organization, org.raw(), "insert_user").await?;
        }
        let sql = format!(
            "INSERT INTO users (name, email, password_hash, organization_id) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        );
        let row: UserRow = sqlx::query_as(&sql)
            .bind(&draft.name)
            .bind(draft.email.as_str())
            .bind(&draft.password_hash)
            .bind(draft.organization_id.map(RecordId::raw))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_write_error("insert_user", e, "email already registered"))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(row.into())
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn user(&self, id: UserId) -> Result<User, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id.raw())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user", e))?;
        row.map(Into::into).ok_or_else(|| StoreError::not_found(id))
    }

    #[instrument(skip(self), err)]
    async fn user_by_email(&self, email: &Email) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(email.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_by_email", e))?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self), err)]
    async fn list_users(&self, page: Page) -> Result<Vec<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id LIMIT $1 OFFSET $2");
        let rows: Vec<UserRow> = sqlx::query_as(&sql)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, changes), fields(user_id = %id), err)]
    async fn update_user(&self, id: UserId, changes: UserChanges) -> Result<User, StoreError> {
        let mut tx = self.begin().await?;
        ensure_exists(&mut tx, EntityKind::User, id.raw(), "update_user").await?;
        if let Some(org) = changes.organization_id {
            ensure_exists(&mut tx, EntityKind::Organization, org.raw(), "update_user").await?;
        }
        let sql = format!(
            "UPDATE users SET \
                name = COALESCE($2, name), \
                email = COALESCE($3, email), \
                password_hash = COALESCE($4, password_hash), \
                organization_id = COALESCE($5, organization_id) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id.raw())
            .bind(changes.name)
            .bind(changes.email.map(Email::into_string))
            .bind(changes.password_hash)
            .bind(changes.organization_id.map(RecordId::raw))
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_write_error("update_user", e, "email already registered"))?;
        let row = row.ok_or_else(|| StoreError::not_found(id))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(row.into())
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn delete_user(&self, id: UserId) -> Result<(), StoreError> {
        self.delete_by_id(EntityKind::User, id.raw(), "delete_user").await
    }

    #[instrument(skip(self), fields(user_id = %id, tariff_id = ?tariff), err)]
    async fn set_user_tariff(&self, id: UserId, tariff: Option<TariffId>) -> Result<User, StoreError> {
        let mut tx = self.begin().await?;
        ensure_exists(&mut tx, EntityKind::User, id.raw(), "set_user_tariff").await?;
        if let Some(tariff) = tariff {
            ensure_exists(&mut tx, EntityKind::Tariff, tariff.raw(), "set_user_tariff").await?;
        }
        let sql = format!("UPDATE users SET tariff_id = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
        let row: UserRow = sqlx::query_as(&sql)
            .bind(id.raw())
            .bind(tariff.map(RecordId::raw))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_user_tariff", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(row.into())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Organizations
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl OrganizationStore for PostgresDirectory {
    #[instrument(skip(self, draft), err)]
    async fn insert_organization(&self, draft: OrganizationDraft) -> Result<Organization, StoreError> {
        let sql = format!("INSERT INTO organizations (name) VALUES ($1) RETURNING {ORGANIZATION_COLUMNS}");
        let row: OrganizationRow = sqlx::query_as(&sql)
            .bind(&draft.name)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_organization", e))?;
        Ok(row.into())
    }

    #[instrument(skip(self), fields(organization_id = %id), err)]
    async fn organization(&self, id: OrganizationId) -> Result<Organization, StoreError> {
        let sql = format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = $1");
        let row: Option<OrganizationRow> = sqlx::query_as(&sql)
            .bind(id.raw())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("organization", e))?;
        row.map(Into::into).ok_or_else(|| StoreError::not_found(id))
    }

    #[instrument(skip(self), err)]
    async fn list_organizations(&self, page: Page) -> Result<Vec<Organization>, StoreError> {
        let sql = format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations ORDER BY id LIMIT $1 OFFSET $2");
        let rows: Vec<OrganizationRow> = sqlx::query_as(&sql)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_organizations", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, changes), fields(organization_id = %id), err)]
    async fn update_organization(
        &self,
        id: OrganizationId,
        changes: OrganizationChanges,
    ) -> Result<Organization, StoreError> {
        let sql = format!(
            "UPDATE organizations SET name = COALESCE($2, name) WHERE id = $1 RETURNING {ORGANIZATION_COLUMNS}"
        );
        let row: Option<OrganizationRow> = sqlx::query_as(&sql)
            .bind(id.raw())
            .bind(changes.name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_organization", e))?;
        row.map(Into::into).ok_or_else(|| StoreError::not_found(id))
    }

    #[instrument(skip(self), fields(organization_id = %id), err)]
    async fn delete_organization(&self, id: OrganizationId) -> Result<(), StoreError> {
        self.delete_by_id(EntityKind::Organization, id.raw(), "delete_organization").await
    }

    #[instrument(skip(self), fields(organization_id = %id, tariff_id = ?tariff), err)]
    async fn set_organization_tariff(
        &self,
        id: OrganizationId,
        tariff: Option<TariffId>,
    ) -> Result<Organization, StoreError> {
        let mut tx = self.begin().await?;
        ensure_exists(&mut tx, EntityKind::Organization, id.raw(), "set_organization_tariff").await?;
        if let Some(tariff) = tariff {
            ensure_exists(&mut tx, EntityKind::Tariff, tariff.raw(), "set_organization_tariff").await?;
        }
        let sql = format!(
            "UPDATE organizations SET tariff_id = $2 WHERE id = $1 RETURNING {ORGANIZATION_COLUMNS}"
        );
        let row: OrganizationRow = sqlx::query_as(&sql)
            .bind(id.raw())
            .bind(tariff.map(RecordId::raw))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_organization_tariff", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(row.into())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Permissions
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PermissionStore for PostgresDirectory {
    #[instrument(skip(self, draft), fields(code = %draft.code), err)]
    async fn insert_permission(&self, draft: PermissionDraft) -> Result<Permission, StoreError> {
        let sql = format!(
            "INSERT INTO permissions (name, code, description) VALUES ($1, $2, $3) RETURNING {PERMISSION_COLUMNS}"
        );
        let row: PermissionRow = sqlx::query_as(&sql)
            .bind(&draft.name)
            .bind(draft.code.as_str())
            .bind(&draft.description)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| {
                map_write_error(
                    "insert_permission",
                    e,
                    &format!("permission code '{}' already exists", draft.code),
                )
            })?;
        Ok(row.into())
    }

    #[instrument(skip(self), fields(permission_id = %id), err)]
    async fn permission(&self, id: PermissionId) -> Result<Permission, StoreError> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = $1");
        let row: Option<PermissionRow> = sqlx::query_as(&sql)
            .bind(id.raw())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("permission", e))?;
        row.map(Into::into).ok_or_else(|| StoreError::not_found(id))
    }

    #[instrument(skip(self), fields(code = %code), err)]
    async fn permission_by_code(&self, code: &PermissionCode) -> Result<Option<Permission>, StoreError> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE code = $1");
        let row: Option<PermissionRow> = sqlx::query_as(&sql)
            .bind(code.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("permission_by_code", e))?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self), err)]
    async fn list_permissions(&self, page: Page) -> Result<Vec<Permission>, StoreError> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY id LIMIT $1 OFFSET $2");
        let rows: Vec<PermissionRow> = sqlx::query_as(&sql)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_permissions", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, changes), fields(permission_id = %id), err)]
    async fn update_permission(
        &self,
        id: PermissionId,
        changes: PermissionChanges,
    ) -> Result<Permission, StoreError> {
        let sql = format!(
            "UPDATE permissions SET \
                name = COALESCE($2, name), \
                code = COALESCE($3, code), \
                description = COALESCE($4, description) \
             WHERE id = $1 RETURNING {PERMISSION_COLUMNS}"
        );
        let row: Option<PermissionRow> = sqlx::query_as(&sql)
            .bind(id.raw())
            .bind(changes.name)
            .bind(changes.code.as_ref().map(PermissionCode::as_str))
            .bind(changes.description)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_write_error("update_permission", e, "permission code already exists"))?;
        row.map(Into::into).ok_or_else(|| StoreError::not_found(id))
    }

    #[instrument(skip(self), fields(permission_id = %id), err)]
    async fn delete_permission(&self, id: PermissionId) -> Result<(), StoreError> {
        self.delete_by_id(EntityKind::Permission, id.raw(), "delete_permission").await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl RoleStore for PostgresDirectory {
    #[instrument(skip(self, draft), fields(code = %draft.code), err)]
    async fn insert_role(&self, draft: RoleDraft) -> Result<Role, StoreError> {
        let sql = format!(
            "INSERT INTO roles (name, code, description) VALUES ($1, $2, $3) RETURNING {ROLE_COLUMNS}"
        );
        let row: RoleRow = sqlx::query_as(&sql)
            .bind(&draft.name)
            .bind(draft.code.as_str())
            .bind(&draft.description)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| {
                map_write_error(
                    "insert_role",
                    e,
                    &format!("role code '{}' already exists", draft.code),
                )
            })?;
        Ok(row.into())
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn role(&self, id: RoleId) -> Result<Role, StoreError> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1");
        let row: Option<RoleRow> = sqlx::query_as(&sql)
            .bind(id.raw())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("role", e))?;
        row.map(Into::into).ok_or_else(|| StoreError::not_found(id))
    }

    #[instrument(skip(self), err)]
    async fn list_roles(&self, page: Page) -> Result<Vec<Role>, StoreError> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY id LIMIT $1 OFFSET $2");
        let rows: Vec<RoleRow> = sqlx::query_as(&sql)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, changes), fields(role_id = %id), err)]
    async fn update_role(&self, id: RoleId, changes: RoleChanges) -> Result<Role, StoreError> {
        let sql = format!(
            "UPDATE roles SET \
                name = COALESCE($2, name), \
                code = COALESCE($3, code), \
                description = COALESCE($4, description) \
             WHERE id = $1 RETURNING {ROLE_COLUMNS}"
        );
        let row: Option<RoleRow> = sqlx::query_as(&sql)
            .bind(id.raw())
            .bind(changes.name)
            .bind(changes.code.as_ref().map(RoleCode::as_str))
            .bind(changes.description)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_write_error("update_role", e, "role code already exists"))?;
        row.map(Into::into).ok_or_else(|| StoreError::not_found(id))
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError> {
        self.delete_by_id(EntityKind::Role, id.raw(), "delete_role").await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tariffs
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl TariffStore for PostgresDirectory {
    #[instrument(skip(self, draft), err)]
    async fn insert_tariff(&self, draft: TariffDraft) -> Result<Tariff, StoreError> {
        let sql = format!(
            "INSERT INTO tariffs (name, description, price) VALUES ($1, $2, $3) RETURNING {TARIFF_COLUMNS}"
        );
        let row: TariffRow = sqlx::query_as(&sql)
            .bind(&draft.name)
            .bind(&draft.description)
            .bind(draft.price)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_tariff", e))?;
        Ok(row.into())
    }

    #[instrument(skip(self), fields(tariff_id = %id), err)]
    async fn tariff(&self, id: TariffId) -> Result<Tariff, StoreError> {
        let sql = format!("SELECT {TARIFF_COLUMNS} FROM tariffs WHERE id = $1");
        let row: Option<TariffRow> = sqlx::query_as(&sql)
            .bind(id.raw())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("tariff", e))?;
        row.map(Into::into).ok_or_else(|| StoreError::not_found(id))
    }

    #[instrument(skip(self), err)]
    async fn list_tariffs(&self, page: Page) -> Result<Vec<Tariff>, StoreError> {
        let sql = format!("SELECT {TARIFF_COLUMNS} FROM tariffs ORDER BY id LIMIT $1 OFFSET $2");
        let rows: Vec<TariffRow> = sqlx::query_as(&sql)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_tariffs", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, changes), fields(tariff_id = %id), err)]
    async fn update_tariff(&self, id: TariffId, changes: TariffChanges) -> Result<Tariff, StoreError> {
        let sql = format!(
            "UPDATE tariffs SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                price = COALESCE($4, price) \
             WHERE id = $1 RETURNING {TARIFF_COLUMNS}"
        );
        let row: Option<TariffRow> = sqlx::query_as(&sql)
            .bind(id.raw())
            .bind(changes.name)
            .bind(changes.description)
            .bind(changes.price)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_tariff", e))?;
        row.map(Into::into).ok_or_else(|| StoreError::not_found(id))
    }

    #[instrument(skip(self), fields(tariff_id = %id), err)]
    async fn delete_tariff(&self, id: TariffId) -> Result<(), StoreError> {
        self.delete_by_id(EntityKind::Tariff, id.raw(), "delete_tariff").await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Associations
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl AssociationStore for PostgresDirectory {
    /// Runs in one transaction:
    /// 1. Check the owner exists
    /// 2. Check every member exists (`= ANY`)
    /// 3. Insert the batch with `ON CONFLICT DO NOTHING`
    /// 4. Commit
    ///
    /// A member deleted between steps 2 and 3 makes the insert fail with a
    /// foreign key violation, which aborts the whole batch.
    #[instrument(skip(self, members), fields(association = %kind, member_count = members.len()), err)]
    async fn attach(&self, kind: AssociationKind, owner: i64, members: &[i64]) -> Result<(), StoreError> {
        let link = link_table(kind);
        let member_kind = kind.member_kind();
        let mut tx = self.begin().await?;

        ensure_exists(&mut tx, kind.owner_kind(), owner, "attach").await?;

        let sql = format!("SELECT id FROM {} WHERE id = ANY($1)", table_of(member_kind));
        let found: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(members)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("attach", e))?;

        let mut missing: Vec<i64> = members
            .iter()
            .copied()
            .filter(|id| !found.contains(id))
            .collect();
        if !missing.is_empty() {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            missing.sort_unstable();
            missing.dedup();
            return Err(StoreError::MissingMembers {
                entity: member_kind,
                ids: missing,
            });
        }

        let sql = format!(
            "INSERT INTO {table} ({owner_col}, {member_col}) \
             SELECT $1, m FROM UNNEST($2::bigint[]) AS m \
             ON CONFLICT DO NOTHING",
            table = link.table,
            owner_col = link.owner_column,
            member_col = link.member_column,
        );
        sqlx::query(&sql)
            .bind(owner)
            .bind(members)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("attach", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    #[instrument(skip(self, members), fields(association = %kind, member_count = members.len()), err)]
    async fn detach(&self, kind: AssociationKind, owner: i64, members: &[i64]) -> Result<(), StoreError> {
        let link = link_table(kind);
        let mut tx = self.begin().await?;

        ensure_exists(&mut tx, kind.owner_kind(), owner, "detach").await?;

        let sql = format!(
            "DELETE FROM {table} WHERE {owner_col} = $1 AND {member_col} = ANY($2)",
            table = link.table,
            owner_col = link.owner_column,
            member_col = link.member_column,
        );
        sqlx::query(&sql)
            .bind(owner)
            .bind(members)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("detach", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    #[instrument(skip(self), fields(association = %kind), err)]
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
        let mut tx = self.begin().await?;
        ensure_exists(&mut tx, kind.owner_kind(), owner, "associated_permissions").await?;
        let permissions = linked_permissions(&mut tx, kind, owner).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(permissions)
    }

    #[instrument(skip(self), fields(association = %kind), err)]
    async fn associated_roles(&self, kind: AssociationKind, owner: i64) -> Result<Vec<Role>, StoreError> {
        if kind.member_kind() != EntityKind::Role {
            return Err(StoreError::backend(
                "associated_roles",
                format!("{kind} does not hold roles"),
            ));
        }
        let mut tx = self.begin().await?;
        ensure_exists(&mut tx, kind.owner_kind(), owner, "associated_roles").await?;
        let roles = linked_roles(&mut tx, kind, owner).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(roles)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Grants
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl GrantStore for PostgresDirectory {
    /// Reads under `REPEATABLE READ` so that direct grants, role membership
    /// and each role's permission set come from the same snapshot.
    #[instrument(skip(self), fields(principal = %principal), err)]
    async fn grant_snapshot(&self, principal: PrincipalRef) -> Result<GrantSnapshot, StoreError> {
        let mut tx = self.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("grant_snapshot", e))?;

        let snapshot = match principal {
            PrincipalRef::User(id) => {
                ensure_exists(&mut tx, EntityKind::User, id.raw(), "grant_snapshot").await?;
                let direct = linked_permissions(&mut tx, AssociationKind::UserPermissions, id.raw()).await?;
                let roles = linked_roles(&mut tx, AssociationKind::UserRoles, id.raw()).await?;
                GrantSnapshot {
                    direct,
                    roles: with_permissions(&mut tx, roles).await?,
                }
            }
            PrincipalRef::Organization(id) => {
                ensure_exists(&mut tx, EntityKind::Organization, id.raw(), "grant_snapshot").await?;
                let direct =
                    linked_permissions(&mut tx, AssociationKind::OrganizationPermissions, id.raw()).await?;
                let roles: Vec<RoleRow> = sqlx::query_as(
                    r#"
                    SELECT r.id, r.name, r.code, r.description
                    FROM roles r
                    WHERE r.id IN (
                        SELECT role_id FROM organization_roles WHERE organization_id = $1
                        UNION
                        SELECT tr.role_id
                        FROM tariff_roles tr
                        JOIN organizations o ON o.tariff_id = tr.tariff_id
                        WHERE o.id = $1
                    )
                    ORDER BY r.id
                    "#,
                )
                .bind(id.raw())
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("grant_snapshot", e))?;
                let roles = roles.into_iter().map(Into::into).collect();
                GrantSnapshot {
                    direct,
                    roles: with_permissions(&mut tx, roles).await?,
                }
            }
        };

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(snapshot)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────────────

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            if let Some(code) = db_err.code() {
                match code.as_ref() {
                    // Unique violation
                    "23505" => StoreError::Conflict("duplicate value".to_string()),
                    // Foreign key violation: a referenced row vanished mid-transaction
                    "23503" => StoreError::Conflict("referenced record no longer exists".to_string()),
                    // Check constraint violation
                    "23514" => StoreError::Conflict("value violates a constraint".to_string()),
                    _ => StoreError::backend(operation, msg),
                }
            } else {
                StoreError::backend(operation, msg)
            }
        }
        sqlx::Error::PoolClosed => StoreError::backend(operation, "connection pool closed"),
        _ => StoreError::backend(operation, format!("sqlx error: {err}")),
    }
}

/// Like [`map_sqlx_error`], but with a caller-specific message for unique
/// violations.
fn map_write_error(operation: &'static str, err: sqlx::Error, on_duplicate: &str) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Conflict(on_duplicate.to_string())
    } else {
        map_sqlx_error(operation, err)
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

// SQLx row types

#[derive(Debug)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    password_hash: String,
    organization_id: Option<i64>,
    tariff_id: Option<i64>,
}

impl<'r> FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            organization_id: row.try_get("organization_id")?,
            tariff_id: row.try_get("tariff_id")?,
        })
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::from_raw(row.id),
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            organization_id: row.organization_id.map(OrganizationId::from_raw),
            tariff_id: row.tariff_id.map(TariffId::from_raw),
        }
    }
}

#[derive(Debug)]
struct OrganizationRow {
    id: i64,
    name: String,
    tariff_id: Option<i64>,
}

impl<'r> FromRow<'r, PgRow> for OrganizationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrganizationRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            tariff_id: row.try_get("tariff_id")?,
        })
    }
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Organization {
            id: OrganizationId::from_raw(row.id),
            name: row.name,
            tariff_id: row.tariff_id.map(TariffId::from_raw),
        }
    }
}

#[derive(Debug)]
struct PermissionRow {
    id: i64,
    name: String,
    code: String,
    description: String,
}

impl<'r> FromRow<'r, PgRow> for PermissionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(PermissionRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            code: row.try_get("code")?,
            description: row.try_get("description")?,
        })
    }
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        Permission {
            id: PermissionId::from_raw(row.id),
            name: row.name,
            code: PermissionCode::new(row.code),
            description: row.description,
        }
    }
}

#[derive(Debug)]
struct RoleRow {
    id: i64,
    name: String,
    code: String,
    description: String,
}

impl<'r> FromRow<'r, PgRow> for RoleRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RoleRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            code: row.try_get("code")?,
            description: row.try_get("description")?,
        })
    }
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Role {
            id: RoleId::from_raw(row.id),
            name: row.name,
            code: RoleCode::new(row.code),
            description: row.description,
        }
    }
}

#[derive(Debug)]
struct TariffRow {
    id: i64,
    name: String,
    description: String,
    price: i64,
}

impl<'r> FromRow<'r, PgRow> for TariffRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TariffRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: row.try_get("price")?,
        })
    }
}

impl From<TariffRow> for Tariff {
    fn from(row: TariffRow) -> Self {
        Tariff {
            id: TariffId::from_raw(row.id),
            name: row.name,
            description: row.description,
            price: row.price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_association_has_a_table_in_the_schema() {
        for kind in AssociationKind::ALL {
            let link = link_table(kind);
            let ddl = SCHEMA
                .iter()
                .find(|s| s.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", link.table)))
                .unwrap_or_else(|| panic!("no DDL for {}", link.table));
            assert!(ddl.contains(link.owner_column));
            assert!(ddl.contains(link.member_column));
            assert_eq!(ddl.matches("ON DELETE CASCADE").count(), 2);
        }
    }

    #[test]
    fn link_columns_match_endpoint_tables() {
        for kind in AssociationKind::ALL {
            let link = link_table(kind);
            let owner_table = table_of(kind.owner_kind());
            let member_table = table_of(kind.member_kind());
            assert!(link.owner_column.starts_with(owner_table.trim_end_matches('s')));
            assert!(link.member_column.starts_with(member_table.trim_end_matches('s')));
        }
    }
}
