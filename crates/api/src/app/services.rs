//! Service facade: every operation the HTTP layer exposes, wired over one
//! `Arc<dyn Directory>`.
//!
//! Gate checks happen here, before any store access, so the same rules hold
//! for every transport.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use gatekeep_auth::{
    authorize, authorize_elevated, ActingPrincipal, Argon2PasswordHasher, AuthzError, Hs256Jwt,
    PasswordHashError, PasswordHasher, PasswordPolicy, PermissionCode, TokenError,
};
use gatekeep_core::{DomainError, OrganizationId, PermissionId, RecordId, RoleId, TariffId, UserId};
use gatekeep_directory::{
    Email, NewOrganization, NewPermission, NewRole, NewTariff, NewUser, Organization,
    OrganizationPatch, Page, Permission, PermissionDraft, PermissionPatch, Role, RolePatch, Tariff,
    TariffPatch, User, UserPatch,
};
use gatekeep_infra::associations::{MemberId, RolePermissions, TariffRoles, UserPermissions};
use gatekeep_infra::config::AdminBootstrap;
use gatekeep_infra::{
    AppConfig, Association, AssociationError, AssociationManager, Credential, CredentialIssuer,
    Directory, InMemoryDirectory, IssueError, PermissionResolver, StoreError,
};

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Service-level error; one variant per HTTP error class.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid email or password")]
    AuthenticationFailed,

    #[error("{0}")]
    Forbidden(String),

    /// Carries the underlying cause for the logs; never sent to clients.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::InvalidArgument(msg),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::MissingMembers { .. } => Self::Conflict(err.to_string()),
            StoreError::Backend { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<AssociationError> for ServiceError {
    fn from(err: AssociationError) -> Self {
        match err {
            AssociationError::EmptyBatch | AssociationError::InvalidMember(_) => {
                Self::InvalidArgument(err.to_string())
            }
            AssociationError::Store(e) => e.into(),
        }
    }
}

impl From<IssueError> for ServiceError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            IssueError::AuthenticationFailed => Self::AuthenticationFailed,
            IssueError::Store(e) => e.into(),
            IssueError::Token(e) => e.into(),
            IssueError::Hash(e) => e.into(),
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(err: AuthzError) -> Self {
        Self::Forbidden(err.to_string())
    }
}

impl From<PasswordHashError> for ServiceError {
    fn from(err: PasswordHashError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        Self::Internal(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Views
// ─────────────────────────────────────────────────────────────────────────────

/// A user together with its resolved permission set.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    #[serde(flatten)]
    pub user: User,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganizationView {
    #[serde(flatten)]
    pub organization: Organization,
    pub permissions: Vec<Permission>,
}

/// A role together with the permissions it owns.
#[derive(Debug, Clone, Serialize)]
pub struct RoleView {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<Permission>,
}

/// A tariff together with its bundled roles.
#[derive(Debug, Clone, Serialize)]
pub struct TariffView {
    #[serde(flatten)]
    pub tariff: Tariff,
    pub roles: Vec<Role>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Services
// ─────────────────────────────────────────────────────────────────────────────

pub struct AppServices {
    directory: Arc<dyn Directory>,
    associations: AssociationManager<dyn Directory>,
    resolver: PermissionResolver<dyn Directory>,
    issuer: CredentialIssuer<dyn Directory>,
    hasher: Arc<dyn PasswordHasher>,
    policy: PasswordPolicy,
    jwt: Arc<Hs256Jwt>,
    admin_permission: PermissionCode,
}

impl AppServices {
    pub fn new(directory: Arc<dyn Directory>, hasher: Arc<dyn PasswordHasher>, config: &AppConfig) -> Self {
        let jwt = Hs256Jwt::new(config.jwt_secret.as_bytes());
        Self {
            associations: AssociationManager::new(Arc::clone(&directory)),
            resolver: PermissionResolver::new(Arc::clone(&directory)),
            issuer: CredentialIssuer::new(
                Arc::clone(&directory),
                Arc::clone(&hasher),
                jwt.clone(),
                config.token_ttl,
            ),
            directory,
            hasher,
            policy: PasswordPolicy::new(config.password_min_len),
            jwt: Arc::new(jwt),
            admin_permission: config.admin_permission.clone(),
        }
    }

    /// In-memory directory with the default Argon2 parameters.
    pub fn in_memory(config: &AppConfig) -> Self {
        Self::new(
            Arc::new(InMemoryDirectory::new()),
            Arc::new(Argon2PasswordHasher::new()),
            config,
        )
    }

    pub fn jwt(&self) -> Arc<Hs256Jwt> {
        Arc::clone(&self.jwt)
    }

    pub fn admin_permission(&self) -> &PermissionCode {
        &self.admin_permission
    }

    fn hash_password(&self, password: &str) -> Result<String, ServiceError> {
        Ok(self.hasher.hash(password)?)
    }

    // ── Authentication ──────────────────────────────────────────────────────

    pub async fn login(&self, email: &str, password: &str) -> Result<Credential, ServiceError> {
        Ok(self.issuer.authenticate(email, password).await?)
    }

    /// Ensure the administrator account exists and holds the administrative
    /// permission. Existing accounts keep their password.
    pub async fn bootstrap_admin(&self, admin: &AdminBootstrap) -> Result<User, ServiceError> {
        let permission = match self.directory.permission_by_code(&self.admin_permission).await? {
            Some(p) => p,
            None => {
                self.directory
                    .insert_permission(PermissionDraft {
                        name: "Administrator".to_string(),
                        code: self.admin_permission.clone(),
                        description: "Administrative override of the self-only rule".to_string(),
                    })
                    .await?
            }
        };

        let email = Email::parse(&admin.email)?;
        let user = match self.directory.user_by_email(&email).await? {
            Some(user) => user,
            None => {
                self.register_user(NewUser {
                    name: "Administrator".to_string(),
                    email: admin.email.clone(),
                    password: admin.password.clone(),
                    organization_id: None,
                })
                .await?
            }
        };

        self.associations
            .attach::<UserPermissions>(user.id, &[permission.id])
            .await?;
        info!(user_id = %user.id, code = %self.admin_permission, "administrator ensured");
        Ok(user)
    }

    // ── Users ───────────────────────────────────────────────────────────────

    /// Public registration.
    pub async fn register_user(&self, input: NewUser) -> Result<User, ServiceError> {
        let draft = input.into_draft(&self.policy, |p| self.hash_password(p))?;
        let user = self.directory.insert_user(draft).await?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    pub async fn list_users(&self, page: Page) -> Result<Vec<User>, ServiceError> {
        Ok(self.directory.list_users(page).await?)
    }

    pub async fn get_user(&self, id: UserId) -> Result<UserView, ServiceError> {
        let user = self.directory.user(id).await?;
        let permissions = self.resolver.resolve_user_permissions(id).await?;
        Ok(UserView { user, permissions })
    }

    pub async fn update_user(
        &self,
        acting: Option<&ActingPrincipal>,
        id: UserId,
        patch: UserPatch,
    ) -> Result<User, ServiceError> {
        authorize(acting, id)?;
        let changes = patch.into_changes(&self.policy, |p| self.hash_password(p))?;
        let user = self.directory.update_user(id, changes).await?;
        info!(user_id = %id, "user updated");
        Ok(user)
    }

    pub async fn delete_user(&self, acting: Option<&ActingPrincipal>, id: UserId) -> Result<(), ServiceError> {
        authorize(acting, id)?;
        self.directory.delete_user(id).await?;
        info!(user_id = %id, "user deleted");
        Ok(())
    }

    pub async fn resolve_user_permissions(&self, id: UserId) -> Result<Vec<Permission>, ServiceError> {
        Ok(self.resolver.resolve_user_permissions(id).await?)
    }

    pub async fn user_tariff(&self, id: UserId) -> Result<Tariff, ServiceError> {
        let user = self.directory.user(id).await?;
        let tariff = user
            .tariff_id
            .ok_or_else(|| ServiceError::NotFound(format!("user {id} has no tariff")))?;
        Ok(self.directory.tariff(tariff).await?)
    }

    pub async fn set_user_tariff(
        &self,
        acting: Option<&ActingPrincipal>,
        id: UserId,
        tariff: TariffId,
    ) -> Result<Tariff, ServiceError> {
        authorize_elevated(acting)?;
        let tariff = TariffId::checked(tariff.get())?;
        self.directory.set_user_tariff(id, Some(tariff)).await?;
        info!(user_id = %id, tariff_id = %tariff, "user tariff set");
        Ok(self.directory.tariff(tariff).await?)
    }

    pub async fn clear_user_tariff(&self, acting: Option<&ActingPrincipal>, id: UserId) -> Result<(), ServiceError> {
        authorize_elevated(acting)?;
        self.directory.set_user_tariff(id, None).await?;
        info!(user_id = %id, "user tariff cleared");
        Ok(())
    }

    // ── Organizations ───────────────────────────────────────────────────────

    pub async fn create_organization(
        &self,
        acting: Option<&ActingPrincipal>,
        input: NewOrganization,
    ) -> Result<Organization, ServiceError> {
        authorize_elevated(acting)?;
        let organization = self.directory.insert_organization(input.validate()?).await?;
        info!(organization_id = %organization.id, "organization created");
        Ok(organization)
    }

    pub async fn list_organizations(&self, page: Page) -> Result<Vec<Organization>, ServiceError> {
        Ok(self.directory.list_organizations(page).await?)
    }

    pub async fn get_organization(&self, id: OrganizationId) -> Result<OrganizationView, ServiceError> {
        let organization = self.directory.organization(id).await?;
        let permissions = self.resolver.resolve_organization_permissions(id).await?;
        Ok(OrganizationView {
            organization,
            permissions,
        })
    }

    pub async fn update_organization(
        &self,
        acting: Option<&ActingPrincipal>,
        id: OrganizationId,
        patch: OrganizationPatch,
    ) -> Result<Organization, ServiceError> {
        authorize_elevated(acting)?;
        Ok(self.directory.update_organization(id, patch.validate()?).await?)
    }

    pub async fn delete_organization(
        &self,
        acting: Option<&ActingPrincipal>,
        id: OrganizationId,
    ) -> Result<(), ServiceError> {
        authorize_elevated(acting)?;
        self.directory.delete_organization(id).await?;
        info!(organization_id = %id, "organization deleted");
        Ok(())
    }

    pub async fn resolve_organization_permissions(
        &self,
        id: OrganizationId,
    ) -> Result<Vec<Permission>, ServiceError> {
        Ok(self.resolver.resolve_organization_permissions(id).await?)
    }

    pub async fn organization_tariff(&self, id: OrganizationId) -> Result<Tariff, ServiceError> {
        let organization = self.directory.organization(id).await?;
        let tariff = organization
            .tariff_id
            .ok_or_else(|| ServiceError::NotFound(format!("organization {id} has no tariff")))?;
        Ok(self.directory.tariff(tariff).await?)
    }

    pub async fn set_organization_tariff(
        &self,
        acting: Option<&ActingPrincipal>,
        id: OrganizationId,
        tariff: TariffId,
    ) -> Result<Tariff, ServiceError> {
        authorize_elevated(acting)?;
        let tariff = TariffId::checked(tariff.get())?;
        self.directory.set_organization_tariff(id, Some(tariff)).await?;
        info!(organization_id = %id, tariff_id = %tariff, "organization tariff set");
        Ok(self.directory.tariff(tariff).await?)
    }

    pub async fn clear_organization_tariff(
        &self,
        acting: Option<&ActingPrincipal>,
        id: OrganizationId,
    ) -> Result<(), ServiceError> {
        authorize_elevated(acting)?;
        self.directory.set_organization_tariff(id, None).await?;
        info!(organization_id = %id, "organization tariff cleared");
        Ok(())
    }

    // ── Permissions ─────────────────────────────────────────────────────────

    pub async fn create_permission(
        &self,
        acting: Option<&ActingPrincipal>,
        input: NewPermission,
    ) -> Result<Permission, ServiceError> {
        authorize_elevated(acting)?;
        let permission = self.directory.insert_permission(input.validate()?).await?;
        info!(permission_id = %permission.id, code = %permission.code, "permission created");
        Ok(permission)
    }

    pub async fn list_permissions(&self, page: Page) -> Result<Vec<Permission>, ServiceError> {
        Ok(self.directory.list_permissions(page).await?)
    }

    pub async fn get_permission(&self, id: PermissionId) -> Result<Permission, ServiceError> {
        Ok(self.directory.permission(id).await?)
    }

    pub async fn update_permission(
        &self,
        acting: Option<&ActingPrincipal>,
        id: PermissionId,
        patch: PermissionPatch,
    ) -> Result<Permission, ServiceError> {
        authorize_elevated(acting)?;
        Ok(self.directory.update_permission(id, patch.validate()?).await?)
    }

    pub async fn delete_permission(
        &self,
        acting: Option<&ActingPrincipal>,
        id: PermissionId,
    ) -> Result<(), ServiceError> {
        authorize_elevated(acting)?;
        self.directory.delete_permission(id).await?;
        info!(permission_id = %id, "permission deleted");
        Ok(())
    }

    // ── Roles ───────────────────────────────────────────────────────────────

    pub async fn create_role(&self, acting: Option<&ActingPrincipal>, input: NewRole) -> Result<Role, ServiceError> {
        authorize_elevated(acting)?;
        let role = self.directory.insert_role(input.validate()?).await?;
        info!(role_id = %role.id, code = %role.code, "role created");
        Ok(role)
    }

    pub async fn list_roles(&self, page: Page) -> Result<Vec<Role>, ServiceError> {
        Ok(self.directory.list_roles(page).await?)
    }

    pub async fn get_role(&self, id: RoleId) -> Result<RoleView, ServiceError> {
        let role = self.directory.role(id).await?;
        let permissions = self.associations.list::<RolePermissions>(id).await?;
        Ok(RoleView { role, permissions })
    }

    pub async fn update_role(
        &self,
        acting: Option<&ActingPrincipal>,
        id: RoleId,
        patch: RolePatch,
    ) -> Result<Role, ServiceError> {
        authorize_elevated(acting)?;
        Ok(self.directory.update_role(id, patch.validate()?).await?)
    }

    pub async fn delete_role(&self, acting: Option<&ActingPrincipal>, id: RoleId) -> Result<(), ServiceError> {
        authorize_elevated(acting)?;
        self.directory.delete_role(id).await?;
        info!(role_id = %id, "role deleted");
        Ok(())
    }

    // ── Tariffs ─────────────────────────────────────────────────────────────

    pub async fn create_tariff(&self, acting: Option<&ActingPrincipal>, input: NewTariff) -> Result<Tariff, ServiceError> {
        authorize_elevated(acting)?;
        let tariff = self.directory.insert_tariff(input.validate()?).await?;
        info!(tariff_id = %tariff.id, "tariff created");
        Ok(tariff)
    }

    pub async fn list_tariffs(&self, page: Page) -> Result<Vec<Tariff>, ServiceError> {
        Ok(self.directory.list_tariffs(page).await?)
    }

    pub async fn get_tariff(&self, id: TariffId) -> Result<TariffView, ServiceError> {
        let tariff = self.directory.tariff(id).await?;
        let roles = self.associations.list::<TariffRoles>(id).await?;
        Ok(TariffView { tariff, roles })
    }

    pub async fn update_tariff(
        &self,
        acting: Option<&ActingPrincipal>,
        id: TariffId,
        patch: TariffPatch,
    ) -> Result<Tariff, ServiceError> {
        authorize_elevated(acting)?;
        Ok(self.directory.update_tariff(id, patch.validate()?).await?)
    }

    pub async fn delete_tariff(&self, acting: Option<&ActingPrincipal>, id: TariffId) -> Result<(), ServiceError> {
        authorize_elevated(acting)?;
        self.directory.delete_tariff(id).await?;
        info!(tariff_id = %id, "tariff deleted");
        Ok(())
    }

    // ── Associations ────────────────────────────────────────────────────────

    /// Grant changes are elevated-only so that nobody can grant themselves
    /// roles or permissions.
    pub async fn attach<A: Association>(
        &self,
        acting: Option<&ActingPrincipal>,
        owner: A::Owner,
        members: &[i64],
    ) -> Result<Vec<A::Member>, ServiceError> {
        authorize_elevated(acting)?;
        Ok(self.associations.attach::<A>(owner, &member_ids::<A>(members)).await?)
    }

    pub async fn detach<A: Association>(
        &self,
        acting: Option<&ActingPrincipal>,
        owner: A::Owner,
        members: &[i64],
    ) -> Result<Vec<A::Member>, ServiceError> {
        authorize_elevated(acting)?;
        Ok(self.associations.detach::<A>(owner, &member_ids::<A>(members)).await?)
    }

    pub async fn list_members<A: Association>(&self, owner: A::Owner) -> Result<Vec<A::Member>, ServiceError> {
        Ok(self.associations.list::<A>(owner).await?)
    }
}

fn member_ids<A: Association>(raw: &[i64]) -> Vec<MemberId<A>> {
    raw.iter().copied().map(<MemberId<A> as RecordId>::from_raw).collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use gatekeep_auth::JwtValidator;
    use gatekeep_infra::associations::UserRoles;

    use super::*;

    fn services() -> AppServices {
        let config = AppConfig {
            jwt_secret: "test-secret".to_string(),
            ..AppConfig::default()
        };
        AppServices::new(
            Arc::new(InMemoryDirectory::new()),
            Arc::new(Argon2PasswordHasher::with_params(8, 1, 1).unwrap()),
            &config,
        )
    }

    fn admin() -> ActingPrincipal {
        ActingPrincipal::new(UserId::new(1_000), true)
    }

    fn new_user(name: &str, email: &str, password: &str) -> NewUser {
        NewUser {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            organization_id: None,
        }
    }

    async fn editor_with_edit_doc(svc: &AppServices) -> (Role, Permission) {
        let edit_doc = svc
            .create_permission(
                Some(&admin()),
                NewPermission {
                    name: "Edit documents".to_string(),
                    code: "edit_doc".to_string(),
                    description: None,
                },
            )
            .await
            .unwrap();
        let editor = svc
            .create_role(
                Some(&admin()),
                NewRole {
                    name: "Editor".to_string(),
                    code: "editor".to_string(),
                    description: None,
                },
            )
            .await
            .unwrap();
        svc.attach::<RolePermissions>(Some(&admin()), editor.id, &[edit_doc.id.get()])
            .await
            .unwrap();
        (editor, edit_doc)
    }

    #[tokio::test]
    async fn role_derived_permission_reaches_the_credential() {
        let svc = services();
        let ada = svc
            .register_user(new_user("Ada", "ada@example.com", "hunter2"))
            .await
            .unwrap();
        let (editor, _) = editor_with_edit_doc(&svc).await;

        svc.attach::<UserRoles>(Some(&admin()), ada.id, &[editor.id.get()])
            .await
            .unwrap();

        let view = svc.get_user(ada.id).await.unwrap();
        let codes: Vec<&str> = view.permissions.iter().map(|p| p.code.as_str()).collect();
        assert_eq!(codes, vec!["edit_doc"]);

        let credential = svc.login("ada@example.com", "hunter2").await.unwrap();
        let claims = svc.jwt().validate(&credential.token, Utc::now()).unwrap();
        assert_eq!(claims.user_id, ada.id);
        assert_eq!(claims.name, "Ada");
        assert_eq!(claims.permissions, vec![PermissionCode::new("edit_doc")]);
    }

    #[tokio::test]
    async fn deleting_a_role_removes_its_grants() {
        let svc = services();
        let ada = svc
            .register_user(new_user("Ada", "ada@example.com", "hunter2"))
            .await
            .unwrap();
        let (editor, _) = editor_with_edit_doc(&svc).await;
        svc.attach::<UserRoles>(Some(&admin()), ada.id, &[editor.id.get()])
            .await
            .unwrap();

        svc.delete_role(Some(&admin()), editor.id).await.unwrap();

        assert!(svc.list_members::<UserRoles>(ada.id).await.unwrap().is_empty());
        assert!(svc.resolve_user_permissions(ada.id).await.unwrap().is_empty());
        assert!(matches!(
            svc.get_role(editor.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn password_policy_boundary() {
        let svc = services();

        let short = svc
            .register_user(new_user("Ada", "ada@example.com", "abcd"))
            .await
            .unwrap_err();
        assert!(matches!(short, ServiceError::InvalidArgument(_)));

        svc.register_user(new_user("Ada", "ada@example.com", "abcde"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn self_service_or_elevated() {
        let svc = services();
        let ada = svc
            .register_user(new_user("Ada", "ada@example.com", "hunter2"))
            .await
            .unwrap();
        let bob = svc
            .register_user(new_user("Bob", "bob@example.com", "hunter2"))
            .await
            .unwrap();

        let rename = |name: &str| UserPatch {
            name: Some(name.to_string()),
            ..UserPatch::default()
        };

        let as_ada = ActingPrincipal::new(ada.id, false);
        let updated = svc
            .update_user(Some(&as_ada), ada.id, rename("Ada L."))
            .await
            .unwrap();
        assert_eq!(updated.name, "Ada L.");

        let denied = svc.update_user(Some(&as_ada), bob.id, rename("Mallory")).await;
        assert!(matches!(denied, Err(ServiceError::Forbidden(_))));

        svc.update_user(Some(&admin()), bob.id, rename("Robert"))
            .await
            .unwrap();

        let anonymous = svc.delete_user(None, ada.id).await;
        assert!(matches!(anonymous, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn principals_cannot_grant_themselves_roles() {
        let svc = services();
        let ada = svc
            .register_user(new_user("Ada", "ada@example.com", "hunter2"))
            .await
            .unwrap();
        let (editor, _) = editor_with_edit_doc(&svc).await;

        let as_ada = ActingPrincipal::new(ada.id, false);
        let err = svc
            .attach::<UserRoles>(Some(&as_ada), ada.id, &[editor.id.get()])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn attach_errors_map_to_http_classes() {
        let svc = services();
        let (editor, edit_doc) = editor_with_edit_doc(&svc).await;

        let missing_member = svc
            .attach::<RolePermissions>(Some(&admin()), editor.id, &[edit_doc.id.get(), 999])
            .await
            .unwrap_err();
        assert!(matches!(missing_member, ServiceError::Conflict(_)));

        let missing_owner = svc
            .attach::<RolePermissions>(Some(&admin()), RoleId::new(999), &[edit_doc.id.get()])
            .await
            .unwrap_err();
        assert!(matches!(missing_owner, ServiceError::NotFound(_)));

        let empty = svc
            .attach::<RolePermissions>(Some(&admin()), editor.id, &[])
            .await
            .unwrap_err();
        assert!(matches!(empty, ServiceError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn organization_tariff_roles_flow_into_resolution() {
        let svc = services();
        let (editor, _) = editor_with_edit_doc(&svc).await;
        let org = svc
            .create_organization(Some(&admin()), NewOrganization { name: "Acme".to_string() })
            .await
            .unwrap();
        let pro = svc
            .create_tariff(
                Some(&admin()),
                NewTariff {
                    name: "Pro".to_string(),
                    description: None,
                    price: 4_900,
                },
            )
            .await
            .unwrap();
        svc.attach::<TariffRoles>(Some(&admin()), pro.id, &[editor.id.get()])
            .await
            .unwrap();

        assert!(matches!(
            svc.organization_tariff(org.id).await,
            Err(ServiceError::NotFound(_))
        ));

        let tariff = svc
            .set_organization_tariff(Some(&admin()), org.id, pro.id)
            .await
            .unwrap();
        assert_eq!(tariff.id, pro.id);

        let view = svc.get_organization(org.id).await.unwrap();
        assert_eq!(view.permissions.len(), 1);
        assert_eq!(view.organization.tariff_id, Some(pro.id));

        svc.clear_organization_tariff(Some(&admin()), org.id)
            .await
            .unwrap();
        assert!(svc
            .resolve_organization_permissions(org.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn bootstrap_admin_is_idempotent_and_elevates() {
        let svc = services();
        let bootstrap = AdminBootstrap {
            email: "root@example.com".to_string(),
            password: "changeme".to_string(),
        };

        let first = svc.bootstrap_admin(&bootstrap).await.unwrap();
        let second = svc.bootstrap_admin(&bootstrap).await.unwrap();
        assert_eq!(first.id, second.id);

        let credential = svc.login("root@example.com", "changeme").await.unwrap();
        let claims = svc.jwt().validate(&credential.token, Utc::now()).unwrap();
        let principal = ActingPrincipal::from_claims(&claims, svc.admin_permission());
        assert!(principal.elevated);
    }

    #[tokio::test]
    async fn login_failures_do_not_reveal_which_check_failed() {
        let svc = services();
        svc.register_user(new_user("Ada", "ada@example.com", "hunter2"))
            .await
            .unwrap();

        assert!(matches!(
            svc.login("ada@example.com", "wrong-pass").await,
            Err(ServiceError::AuthenticationFailed)
        ));
        assert!(matches!(
            svc.login("eve@example.com", "hunter2").await,
            Err(ServiceError::AuthenticationFailed)
        ));
        assert!(matches!(
            svc.login("", "").await,
            Err(ServiceError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn non_positive_tariff_id_is_invalid_before_store_access() {
        let svc = services();
        let ada = svc
            .register_user(new_user("Ada", "ada@example.com", "hunter2"))
            .await
            .unwrap();

        assert!(matches!(
            svc.set_user_tariff(Some(&admin()), ada.id, TariffId::new(0)).await,
            Err(ServiceError::InvalidArgument(_))
        ));
        assert!(matches!(
            svc.set_organization_tariff(Some(&admin()), OrganizationId::new(7), TariffId::new(-1))
                .await,
            Err(ServiceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn backend_failures_become_internal() {
        let err: ServiceError = StoreError::backend("list_users", "connection reset").into();
        assert!(matches!(err, ServiceError::Internal(_)));
    }
}
