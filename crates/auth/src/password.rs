//! Password policy and one-way hashing.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHasher as _, PasswordVerifier, Version};
use thiserror::Error;

use gatekeep_core::{DomainError, DomainResult};

/// Default minimum password length, in characters.
pub const DEFAULT_MIN_PASSWORD_LEN: usize = 5;

/// Password acceptance rule applied on create and on password change.
///
/// Length is counted in characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_len: usize,
}

impl PasswordPolicy {
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }

    pub fn check(&self, password: &str) -> DomainResult<()> {
        if password.chars().count() < self.min_len {
            return Err(DomainError::validation(format!(
                "password must be at least {} characters",
                self.min_len
            )));
        }
        Ok(())
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PASSWORD_LEN)
    }
}

#[derive(Debug, Error)]
pub enum PasswordHashError {
    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),
}

/// Opaque one-way password function.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, PasswordHashError>;

    /// `Ok(false)` means "does not match"; errors are reserved for unusable
    /// stored hashes.
    fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordHashError>;
}

/// Argon2id hasher producing PHC strings.
#[derive(Debug, Clone)]
pub struct Argon2PasswordHasher {
    params: Params,
}

impl Argon2PasswordHasher {
    pub fn new() -> Self {
        Self {
            params: Params::default(),
        }
    }

    /// Custom cost parameters (memory in KiB, iterations, lanes).
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self, PasswordHashError> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| PasswordHashError::Hash(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for Argon2PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, password: &str) -> Result<String, PasswordHashError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PasswordHashError::Hash(e.to_string()))?;
        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordHashError> {
        let parsed =
            PasswordHash::new(hash).map_err(|e| PasswordHashError::MalformedHash(e.to_string()))?;
        match self.argon2().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordHashError::MalformedHash(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_hasher() -> Argon2PasswordHasher {
        Argon2PasswordHasher::with_params(8, 1, 1).unwrap()
    }

    #[test]
    fn four_characters_are_rejected_five_accepted() {
        let policy = PasswordPolicy::default();
        assert!(matches!(policy.check("abcd"), Err(DomainError::Validation(_))));
        assert_eq!(policy.check("abcde"), Ok(()));
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let policy = PasswordPolicy::default();
        // five characters, ten bytes
        assert_eq!(policy.check("ééééé"), Ok(()));
        assert!(policy.check("éééé").is_err());
    }

    #[test]
    fn hash_then_verify() {
        let hasher = cheap_hasher();
        let hash = hasher.hash("hunter22").unwrap();

        assert_ne!(hash, "hunter22");
        assert!(hasher.verify("hunter22", &hash).unwrap());
        assert!(!hasher.verify("hunter23", &hash).unwrap());
    }

    #[test]
    fn salts_differ_between_hashes() {
        let hasher = cheap_hasher();
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn malformed_stored_hash_is_an_error() {
        let hasher = cheap_hasher();
        assert!(matches!(
            hasher.verify("x", "not-a-phc-string"),
            Err(PasswordHashError::MalformedHash(_))
        ));
    }
}
