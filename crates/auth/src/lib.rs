//! `gatekeep-auth`: pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it knows how
//! to mint and verify credentials, how to decide the self-or-elevated gate and
//! how to fold grants into a resolved permission set, but never where any of
//! the inputs come from.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod resolve;
pub mod roles;

pub use authorize::{authorize, authorize_elevated, decide, AuthzError, Decision};
pub use claims::{CredentialClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256Jwt, JwtValidator, TokenError};
pub use password::{
    Argon2PasswordHasher, DEFAULT_MIN_PASSWORD_LEN, PasswordHashError, PasswordHasher, PasswordPolicy,
};
pub use permissions::PermissionCode;
pub use principal::{ActingPrincipal, PrincipalRef};
pub use resolve::resolve_permissions;
pub use roles::RoleCode;
