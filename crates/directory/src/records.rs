//! Persisted directory records.

use serde::{Deserialize, Serialize};

use gatekeep_auth::{PermissionCode, RoleCode};
use gatekeep_core::{Entity, OrganizationId, PermissionId, RoleId, TariffId, UserId};

/// A person that can log in.
///
/// The password hash never leaves the process: it is skipped on
/// serialization.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub organization_id: Option<OrganizationId>,
    pub tariff_id: Option<TariffId>,
}

impl core::fmt::Debug for User {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("organization_id", &self.organization_id)
            .field("tariff_id", &self.tariff_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub tariff_id: Option<TariffId>,
}

/// Atomic, non-hierarchical capability identified by its code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub code: PermissionCode,
    pub description: String,
}

/// Named bundle of permissions. Its permission set lives in association rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub code: RoleCode,
    pub description: String,
}

/// Subscription plan bundling roles. `price` is in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tariff {
    pub id: TariffId,
    pub name: String,
    pub description: String,
    pub price: i64,
}

macro_rules! impl_entity {
    ($t:ty, $id:ty) => {
        impl Entity for $t {
            type Id = $id;

            fn id(&self) -> &Self::Id {
                &self.id
            }
        }
    };
}

impl_entity!(User, UserId);
impl_entity!(Organization, OrganizationId);
impl_entity!(Permission, PermissionId);
impl_entity!(Role, RoleId);
impl_entity!(Tariff, TariffId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_is_never_serialized() {
        let user = User {
            id: UserId::new(1),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            organization_id: None,
            tariff_id: None,
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
        assert!(!format!("{user:?}").contains("argon2"));
    }
}
