//! Entity trait: identity + continuity across state changes.

use serde::{Deserialize, Serialize};

use crate::id::RecordId;

/// The kinds of records kept by the directory.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Organization,
    Permission,
    Role,
    Tariff,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Organization => "organization",
            EntityKind::Permission => "permission",
            EntityKind::Role => "role",
            EntityKind::Tariff => "tariff",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: RecordId;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Kind of record this entity is stored as.
    fn kind() -> EntityKind {
        <Self::Id as RecordId>::KIND
    }
}
