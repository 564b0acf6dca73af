//! Strongly-typed identifiers used across the domain.
//!
//! Records are keyed by store-assigned 64-bit integers. A valid identifier is
//! always positive; identifiers are never reused once assigned.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;
use crate::error::DomainError;

/// Common contract of every record identifier.
///
/// Lets generic code (stores, association plumbing) move between the typed id
/// and the raw column value without knowing the concrete newtype.
pub trait RecordId:
    Copy + Eq + Ord + core::hash::Hash + core::fmt::Debug + core::fmt::Display + Send + Sync + 'static
{
    /// Kind of record this identifier points at.
    const KIND: EntityKind;

    /// Wrap a raw value read back from storage.
    fn from_raw(raw: i64) -> Self;

    /// Raw column value.
    fn raw(self) -> i64;
}

/// Identifier of a user (actor identity).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

/// Identifier of an organization.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(i64);

/// Identifier of an atomic permission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionId(i64);

/// Identifier of a role (named permission bundle).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(i64);

/// Identifier of a subscription tariff.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TariffId(i64);

macro_rules! impl_record_id {
    ($t:ty, $kind:expr, $name:literal) => {
        impl $t {
            /// Wrap a raw identifier without validation.
            ///
            /// Prefer [`Self::checked`] for values that come from callers.
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Wrap a raw identifier, rejecting zero and negative values.
            pub fn checked(raw: i64) -> Result<Self, DomainError> {
                if raw <= 0 {
                    return Err(DomainError::invalid_id(format!(
                        "{}: must be positive, got {}",
                        $name, raw
                    )));
                }
                Ok(Self(raw))
            }

            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl RecordId for $t {
            const KIND: EntityKind = $kind;

            fn from_raw(raw: i64) -> Self {
                Self(raw)
            }

            fn raw(self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Self::checked(raw)
            }
        }
    };
}

impl_record_id!(UserId, EntityKind::User, "UserId");
impl_record_id!(OrganizationId, EntityKind::Organization, "OrganizationId");
impl_record_id!(PermissionId, EntityKind::Permission, "PermissionId");
impl_record_id!(RoleId, EntityKind::Role, "RoleId");
impl_record_id!(TariffId, EntityKind::Tariff, "TariffId");
