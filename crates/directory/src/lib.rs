//! `gatekeep-directory`: records kept by the identity directory and the
//! validated inputs that create or change them.
//!
//! Everything here is storage-agnostic: stores consume drafts and change sets
//! that have already passed validation, so they never see raw caller input.

pub mod email;
pub mod input;
pub mod page;
pub mod records;

pub use email::Email;
pub use input::{
    NewOrganization, NewPermission, NewRole, NewTariff, NewUser, OrganizationChanges,
    OrganizationDraft, OrganizationPatch, PermissionChanges, PermissionDraft, PermissionPatch,
    RoleChanges, RoleDraft, RolePatch, TariffChanges, TariffDraft, TariffPatch, UserChanges,
    UserDraft, UserPatch,
};
pub use page::Page;
pub use records::{Organization, Permission, Role, Tariff, User};
