//! HS256 credential signing and verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::claims::{validate_claims, CredentialClaims, TokenValidationError};

#[derive(Debug, Error)]
pub enum TokenError {
    /// Signature, encoding or structural failure reported by the JWT library.
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// The token verified but its time window does not cover `now`.
    #[error("invalid claims: {0}")]
    Claims(#[from] TokenValidationError),
}

/// Verifies bearer tokens and yields their claims.
///
/// The HTTP layer depends on this seam rather than on a concrete signer so
/// tests can swap in a fixed clock or a different key.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<CredentialClaims, TokenError>;
}

/// Symmetric HS256 signer/validator.
#[derive(Clone)]
pub struct Hs256Jwt {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Hs256Jwt {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Sign claims into a compact JWT.
    pub fn mint(&self, claims: &CredentialClaims) -> Result<String, TokenError> {
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.encoding,
        )?)
    }
}

impl core::fmt::Debug for Hs256Jwt {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256Jwt").finish_non_exhaustive()
    }
}

impl JwtValidator for Hs256Jwt {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<CredentialClaims, TokenError> {
        // Only the signature and algorithm are checked by the library; the time
        // window is checked against the caller's clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;

        let data = jsonwebtoken::decode::<CredentialClaims>(token, &self.decoding, &validation)?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}
