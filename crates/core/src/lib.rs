//! `gatekeep-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! record identifiers, the entity contract and the domain error model.

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::{Entity, EntityKind};
pub use error::{DomainError, DomainResult};
pub use id::{OrganizationId, PermissionId, RecordId, RoleId, TariffId, UserId};
pub use value_object::ValueObject;
