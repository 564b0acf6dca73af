//! Login: password verification, permission resolution and credential minting.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use gatekeep_auth::{
    CredentialClaims, Hs256Jwt, PasswordHashError, PasswordHasher, TokenError,
};
use gatekeep_directory::{Email, Permission, User};

use crate::resolver::PermissionResolver;
use crate::store::{GrantStore, StoreError, UserStore};

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown e-mail and wrong password are deliberately the same error.
    #[error("invalid email or password")]
    AuthenticationFailed,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Hash(#[from] PasswordHashError),
}

/// A freshly minted credential and the data it was minted from.
#[derive(Debug, Clone, Serialize)]
pub struct Credential {
    pub token: String,
    pub claims: CredentialClaims,
    pub user: User,
    pub permissions: Vec<Permission>,
}

pub struct CredentialIssuer<S: ?Sized> {
    store: Arc<S>,
    resolver: PermissionResolver<S>,
    hasher: Arc<dyn PasswordHasher>,
    jwt: Hs256Jwt,
    ttl: Duration,
}

impl<S> CredentialIssuer<S>
where
    S: UserStore + GrantStore + ?Sized,
{
    pub fn new(store: Arc<S>, hasher: Arc<dyn PasswordHasher>, jwt: Hs256Jwt, ttl: Duration) -> Self {
        Self {
            resolver: PermissionResolver::new(Arc::clone(&store)),
            store,
            hasher,
            jwt,
            ttl,
        }
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Credential, IssueError> {
        self.authenticate_at(email, password, Utc::now()).await
    }

    /// Like [`authenticate`](Self::authenticate) with an explicit issue time.
    pub async fn authenticate_at(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Credential, IssueError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(IssueError::InvalidArgument(
                "email and password are required".to_string(),
            ));
        }

        let user = match self.verify(email, password).await? {
            Some(user) => user,
            None => {
                warn!(target: "audit", email = %email.trim(), "login rejected");
                return Err(IssueError::AuthenticationFailed);
            }
        };

        let permissions = self.resolver.resolve_user_permissions(user.id).await?;
        let codes = permissions.iter().map(|p| p.code.clone()).collect();
        let claims = CredentialClaims::new(user.id, &user.email, &user.name, codes, now, self.ttl);
        let token = self.jwt.mint(&claims)?;

        info!(
            target: "audit",
            user_id = %user.id,
            permissions = permissions.len(),
            expires_at = claims.exp,
            "login succeeded"
        );

        Ok(Credential {
            token,
            claims,
            user,
            permissions,
        })
    }

    /// `None` for an unknown e-mail and for a wrong password alike.
    async fn verify(&self, email: &str, password: &str) -> Result<Option<User>, IssueError> {
        let Ok(email) = Email::parse(email) else {
            return Ok(None);
        };
        let Some(user) = self.store.user_by_email(&email).await? else {
            return Ok(None);
        };
        if self.hasher.verify(password, &user.password_hash)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use gatekeep_auth::{Argon2PasswordHasher, JwtValidator, PasswordPolicy};
    use gatekeep_core::{DomainError, PermissionId};
    use gatekeep_directory::{NewPermission, NewRole, NewUser};

    use super::*;
    use crate::associations::{AssociationManager, RolePermissions, UserRoles};
    use crate::store::{InMemoryDirectory, PermissionStore, RoleStore};

    const SECRET: &str = "test-secret";

    fn hasher() -> Arc<dyn PasswordHasher> {
        Arc::new(Argon2PasswordHasher::with_params(8, 1, 1).unwrap())
    }

    async fn setup() -> (Arc<InMemoryDirectory>, CredentialIssuer<InMemoryDirectory>, PermissionId) {
        let store = Arc::new(InMemoryDirectory::new());
        let hasher = hasher();

        let draft = NewUser {
            name: "Ada".to_string(),
            email: "Ada@Example.com".to_string(),
            password: "hunter2".to_string(),
            organization_id: None,
        }
        .into_draft(&PasswordPolicy::default(), |p: &str| {
            hasher
                .hash(p)
                .map_err(|e| DomainError::validation(e.to_string()))
        })
        .unwrap();
        let ada = store.insert_user(draft).await.unwrap();

        let edit = store
            .insert_permission(
                NewPermission {
                    name: "Edit documents".to_string(),
                    code: "edit_doc".to_string(),
                    description: None,
                }
                .validate()
                .unwrap(),
            )
            .await
            .unwrap();
        let editor = store
            .insert_role(
                NewRole {
                    name: "Editor".to_string(),
                    code: "editor".to_string(),
                    description: None,
                }
                .validate()
                .unwrap(),
            )
            .await
            .unwrap();

        let manager = AssociationManager::new(Arc::clone(&store));
        manager.attach::<RolePermissions>(editor.id, &[edit.id]).await.unwrap();
        manager.attach::<UserRoles>(ada.id, &[editor.id]).await.unwrap();

        let issuer = CredentialIssuer::new(
            Arc::clone(&store),
            hasher,
            Hs256Jwt::new(SECRET),
            Duration::hours(24),
        );
        (store, issuer, edit.id)
    }

    #[tokio::test]
    async fn login_embeds_resolved_permission_codes() {
        let (_, issuer, edit) = setup().await;
        let now = Utc::now();

        let credential = issuer
            .authenticate_at("ada@example.com", "hunter2", now)
            .await
            .unwrap();

        assert_eq!(credential.permissions.len(), 1);
        assert_eq!(credential.permissions[0].id, edit);
        assert_eq!(credential.claims.exp - credential.claims.iat, 24 * 3600);

        let claims = Hs256Jwt::new(SECRET)
            .validate(&credential.token, now)
            .unwrap();
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(claims.name, "Ada");
        let codes: Vec<&str> = claims.permissions.iter().map(|c| c.as_str()).collect();
        assert_eq!(codes, vec!["edit_doc"]);
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        let (_, issuer, _) = setup().await;

        let unknown = issuer.authenticate("nobody@example.com", "hunter2").await.unwrap_err();
        let wrong = issuer.authenticate("ada@example.com", "hunter3").await.unwrap_err();

        assert!(matches!(unknown, IssueError::AuthenticationFailed));
        assert!(matches!(wrong, IssueError::AuthenticationFailed));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn empty_inputs_are_invalid_arguments() {
        let (_, issuer, _) = setup().await;

        assert!(matches!(
            issuer.authenticate("", "hunter2").await,
            Err(IssueError::InvalidArgument(_))
        ));
        assert!(matches!(
            issuer.authenticate("ada@example.com", "").await,
            Err(IssueError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn credentials_are_snapshots() {
        let (store, issuer, edit) = setup().await;
        let now = Utc::now();
        let credential = issuer
            .authenticate_at("ada@example.com", "hunter2", now)
            .await
            .unwrap();

        store.delete_permission(edit).await.unwrap();

        let claims = Hs256Jwt::new(SECRET)
            .validate(&credential.token, now)
            .unwrap();
        assert_eq!(claims.permissions.len(), 1);

        let fresh = issuer
            .authenticate_at("ada@example.com", "hunter2", now)
            .await
            .unwrap();
        assert!(fresh.claims.permissions.is_empty());
    }
}
