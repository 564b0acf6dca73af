//! Caller input and its validated forms.
//!
//! `New*` / `*Patch` types are what callers send. Validation turns them into
//! `*Draft` / `*Changes`, which are the only shapes the stores accept.

use serde::Deserialize;

use gatekeep_auth::{PasswordPolicy, PermissionCode, RoleCode};
use gatekeep_core::{DomainError, DomainResult, OrganizationId};

use crate::Email;

fn required_text(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

fn optional_text(field: &str, value: Option<String>) -> DomainResult<Option<String>> {
    value.map(|v| required_text(field, &v)).transpose()
}

fn optional_organization(id: Option<OrganizationId>) -> DomainResult<Option<OrganizationId>> {
    id.map(|id| OrganizationId::checked(id.get())).transpose()
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub organization_id: Option<OrganizationId>,
}

impl core::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NewUser")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("organization_id", &self.organization_id)
            .finish()
    }
}

impl NewUser {
    /// Validate every field, then hash the password.
    ///
    /// `hash` is only called once all checks have passed.
    pub fn into_draft<E, F>(self, policy: &PasswordPolicy, hash: F) -> Result<UserDraft, E>
    where
        E: From<DomainError>,
        F: FnOnce(&str) -> Result<String, E>,
    {
        let name = required_text("name", &self.name)?;
        let email = Email::parse(&self.email)?;
        let organization_id = optional_organization(self.organization_id)?;
        policy.check(&self.password)?;
        let password_hash = hash(&self.password)?;

        Ok(UserDraft {
            name,
            email,
            password_hash,
            organization_id,
        })
    }
}

/// Validated user ready for insertion.
#[derive(Clone, PartialEq, Eq)]
pub struct UserDraft {
    pub name: String,
    pub email: Email,
    pub password_hash: String,
    pub organization_id: Option<OrganizationId>,
}

impl core::fmt::Debug for UserDraft {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserDraft")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("organization_id", &self.organization_id)
            .finish_non_exhaustive()
    }
}

/// Partial update of a user. Absent fields are left unchanged.
#[derive(Clone, Default, Deserialize)]
pub struct UserPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub organization_id: Option<OrganizationId>,
}

impl core::fmt::Debug for UserPatch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserPatch")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("organization_id", &self.organization_id)
            .finish()
    }
}

impl UserPatch {
    pub fn into_changes<E, F>(self, policy: &PasswordPolicy, hash: F) -> Result<UserChanges, E>
    where
        E: From<DomainError>,
        F: FnOnce(&str) -> Result<String, E>,
    {
        let name = optional_text("name", self.name)?;
        let email = self.email.as_deref().map(Email::parse).transpose()?;
        let organization_id = optional_organization(self.organization_id)?;
        if let Some(password) = &self.password {
            policy.check(password)?;
        }
        let password_hash = self.password.as_deref().map(hash).transpose()?;

        Ok(UserChanges {
            name,
            email,
            password_hash,
            organization_id,
        })
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<Email>,
    pub password_hash: Option<String>,
    pub organization_id: Option<OrganizationId>,
}

impl core::fmt::Debug for UserChanges {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserChanges")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password_changed", &self.password_hash.is_some())
            .field("organization_id", &self.organization_id)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Organizations
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrganization {
    pub name: String,
}

impl NewOrganization {
    pub fn validate(self) -> DomainResult<OrganizationDraft> {
        Ok(OrganizationDraft {
            name: required_text("name", &self.name)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationDraft {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganizationPatch {
    #[serde(default)]
    pub name: Option<String>,
}

impl OrganizationPatch {
    pub fn validate(self) -> DomainResult<OrganizationChanges> {
        Ok(OrganizationChanges {
            name: optional_text("name", self.name)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationChanges {
    pub name: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Permissions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NewPermission {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewPermission {
    pub fn validate(self) -> DomainResult<PermissionDraft> {
        Ok(PermissionDraft {
            name: required_text("name", &self.name)?,
            code: PermissionCode::parse(self.code)?,
            description: self.description.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDraft {
    pub name: String,
    pub code: PermissionCode,
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PermissionPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl PermissionPatch {
    pub fn validate(self) -> DomainResult<PermissionChanges> {
        Ok(PermissionChanges {
            name: optional_text("name", self.name)?,
            code: self.code.map(PermissionCode::parse).transpose()?,
            description: self.description,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionChanges {
    pub name: Option<String>,
    pub code: Option<PermissionCode>,
    pub description: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewRole {
    pub fn validate(self) -> DomainResult<RoleDraft> {
        Ok(RoleDraft {
            name: required_text("name", &self.name)?,
            code: RoleCode::parse(self.code)?,
            description: self.description.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDraft {
    pub name: String,
    pub code: RoleCode,
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RolePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl RolePatch {
    pub fn validate(self) -> DomainResult<RoleChanges> {
        Ok(RoleChanges {
            name: optional_text("name", self.name)?,
            code: self.code.map(RoleCode::parse).transpose()?,
            description: self.description,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleChanges {
    pub name: Option<String>,
    pub code: Option<RoleCode>,
    pub description: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tariffs
// ─────────────────────────────────────────────────────────────────────────────

fn checked_price(price: i64) -> DomainResult<i64> {
    if price < 0 {
        return Err(DomainError::validation("price cannot be negative"));
    }
    Ok(price)
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTariff {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: i64,
}

impl NewTariff {
    pub fn validate(self) -> DomainResult<TariffDraft> {
        Ok(TariffDraft {
            name: required_text("name", &self.name)?,
            description: self.description.unwrap_or_default(),
            price: checked_price(self.price)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TariffDraft {
    pub name: String,
    pub description: String,
    pub price: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TariffPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<i64>,
}

impl TariffPatch {
    pub fn validate(self) -> DomainResult<TariffChanges> {
        Ok(TariffChanges {
            name: optional_text("name", self.name)?,
            description: self.description,
            price: self.price.map(checked_price).transpose()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TariffChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_hash(password: &str) -> Result<String, DomainError> {
        Ok(format!("hashed:{password}"))
    }

    fn new_user(password: &str) -> NewUser {
        NewUser {
            name: "  Ada ".to_string(),
            email: "Ada@Example.com".to_string(),
            password: password.to_string(),
            organization_id: None,
        }
    }

    #[test]
    fn new_user_is_normalized_and_hashed() {
        let draft = new_user("abcde")
            .into_draft(&PasswordPolicy::default(), no_hash)
            .unwrap();

        assert_eq!(draft.name, "Ada");
        assert_eq!(draft.email.as_str(), "ada@example.com");
        assert_eq!(draft.password_hash, "hashed:abcde");
    }

    #[test]
    fn short_password_is_rejected_before_hashing() {
        let err = new_user("abcd")
            .into_draft(&PasswordPolicy::default(), |_: &str| -> Result<String, DomainError> {
                panic!("hash must not run for an invalid password")
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn non_positive_organization_id_is_rejected() {
        let mut input = new_user("abcde");
        input.organization_id = Some(OrganizationId::new(0));
        let err = input
            .into_draft(&PasswordPolicy::default(), no_hash)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(_)));

        let patch = UserPatch {
            organization_id: Some(OrganizationId::new(-3)),
            ..UserPatch::default()
        };
        assert!(matches!(
            patch.into_changes(&PasswordPolicy::default(), no_hash),
            Err(DomainError::InvalidId(_))
        ));
    }

    #[test]
    fn custom_policy_is_honoured() {
        let strict = PasswordPolicy::new(8);
        assert!(new_user("abcdefg").into_draft(&strict, no_hash).is_err());
        assert!(new_user("abcdefgh").into_draft(&strict, no_hash).is_ok());
    }

    #[test]
    fn debug_output_redacts_password() {
        let rendered = format!("{:?}", new_user("topsecret"));
        assert!(!rendered.contains("topsecret"));
    }

    #[test]
    fn user_patch_checks_only_present_fields() {
        let changes = UserPatch {
            name: Some("Ada L.".to_string()),
            ..UserPatch::default()
        }
        .into_changes(&PasswordPolicy::default(), no_hash)
        .unwrap();
        assert_eq!(changes.name.as_deref(), Some("Ada L."));
        assert!(changes.password_hash.is_none());

        let err = UserPatch {
            password: Some("abc".to_string()),
            ..UserPatch::default()
        }
        .into_changes(&PasswordPolicy::default(), no_hash)
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn permission_requires_name_and_code() {
        let missing_code = NewPermission {
            name: "Edit".to_string(),
            code: "".to_string(),
            description: None,
        };
        assert!(missing_code.validate().is_err());

        let missing_name = NewPermission {
            name: " ".to_string(),
            code: "edit_doc".to_string(),
            description: None,
        };
        assert!(missing_name.validate().is_err());
    }

    #[test]
    fn codes_are_kept_verbatim() {
        let draft = NewRole {
            name: "Editor".to_string(),
            code: "Editor".to_string(),
            description: Some("edits".to_string()),
        }
        .validate()
        .unwrap();
        assert_eq!(draft.code.as_str(), "Editor");
    }

    #[test]
    fn negative_tariff_price_is_rejected() {
        let tariff = NewTariff {
            name: "Pro".to_string(),
            description: None,
            price: -1,
        };
        assert!(tariff.validate().is_err());
        assert!(TariffPatch {
            price: Some(-5),
            ..TariffPatch::default()
        }
        .validate()
        .is_err());
    }
}
