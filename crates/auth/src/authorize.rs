//! Access-control gate for mutations.
//!
//! A principal may mutate itself; an elevated principal may mutate anyone.
//! Nothing else about the principal or the target is consulted.

use serde::Serialize;
use thiserror::Error;

use gatekeep_core::UserId;

use crate::ActingPrincipal;

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// No verified principal accompanies the request.
    #[error("missing acting principal")]
    MissingPrincipal,

    #[error("forbidden: principal {acting} may not act on user {target}")]
    Forbidden { acting: UserId, target: UserId },

    #[error("forbidden: elevated principal required")]
    ElevationRequired,
}

/// Pure gate decision.
///
/// - No IO
/// - No panics
pub fn decide(acting: UserId, is_elevated: bool, target: UserId) -> Decision {
    if acting == target || is_elevated {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

/// Gate a mutation on `target`.
///
/// A missing principal is treated as a denial, never as an anonymous allow.
pub fn authorize(principal: Option<&ActingPrincipal>, target: UserId) -> Result<(), AuthzError> {
    let principal = principal.ok_or(AuthzError::MissingPrincipal)?;
    match decide(principal.user_id, principal.elevated, target) {
        Decision::Allow => Ok(()),
        Decision::Deny => Err(AuthzError::Forbidden {
            acting: principal.user_id,
            target,
        }),
    }
}

/// Gate a mutation that has no self-service form (catalog changes, grants).
pub fn authorize_elevated(principal: Option<&ActingPrincipal>) -> Result<(), AuthzError> {
    let principal = principal.ok_or(AuthzError::MissingPrincipal)?;
    if principal.elevated {
        Ok(())
    } else {
        Err(AuthzError::ElevationRequired)
    }
}
