//! Infrastructure layer: stores, configuration and the services that sit
//! directly on top of them (resolution, associations, credential issuance).

pub mod associations;
pub mod config;
pub mod issuer;
pub mod resolver;
pub mod store;

pub use associations::{Association, AssociationError, AssociationKind, AssociationManager};
pub use config::{AppConfig, ConfigError};
pub use issuer::{Credential, CredentialIssuer, IssueError};
pub use resolver::PermissionResolver;
pub use store::{Directory, GrantSnapshot, InMemoryDirectory, PostgresDirectory, RoleGrants, StoreError};
