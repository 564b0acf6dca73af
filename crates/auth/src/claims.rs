use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatekeep_core::UserId;

use crate::PermissionCode;

/// Credential claims model (transport-agnostic).
///
/// A credential is a snapshot: the permission codes are the ones resolved at
/// issuance and do not follow later grant or revoke operations until the
/// credential expires. Timestamps are seconds since the Unix epoch, which is
/// the form standard JWT tooling expects for `iat` and `exp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaims {
    /// Subject user identifier.
    pub user_id: UserId,

    pub email: String,

    /// Display name.
    pub name: String,

    /// Resolved permission codes at issuance, in permission id order.
    pub permissions: Vec<PermissionCode>,

    /// Issued-at timestamp.
    pub iat: i64,

    /// Expiration timestamp.
    pub exp: i64,
}

impl CredentialClaims {
    pub fn new(
        user_id: UserId,
        email: impl Into<String>,
        name: impl Into<String>,
        permissions: Vec<PermissionCode>,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            user_id,
            email: email.into(),
            name: name.into(),
            permissions,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        }
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    pub fn has_permission(&self, code: &PermissionCode) -> bool {
        self.permissions.iter().any(|p| p == code)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Deterministically validate credential claims.
///
/// Note: this validates the *claims* only. Signature verification lives in
/// [`crate::jwt`].
pub fn validate_claims(
    claims: &CredentialClaims,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
