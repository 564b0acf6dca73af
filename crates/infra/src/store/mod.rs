//! Directory storage boundary.
//!
//! One capability trait per record type plus the association and grant
//! traits, bundled by [`Directory`]. Callers hold an `Arc<dyn Directory>` and
//! never learn which backend they talk to.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryDirectory;
pub use postgres::PostgresDirectory;
pub use r#trait::{
    AssociationStore, Directory, GrantSnapshot, GrantStore, OrganizationStore, PermissionStore,
    RoleGrants, RoleStore, StoreError, TariffStore, UserStore,
};
