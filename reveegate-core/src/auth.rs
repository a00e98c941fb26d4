//! Credential validation for feed connections.
//!
//! Overlay widgets present an opaque stream token; admin dashboards present
//! an HS256 JWT issued by the auth service. Either way the result is the
//! hub channel the connection joins.

use jsonwebtoken::{DecodingKey, Validation, decode};
use reveegate_sdk::signature::mask_secret;
use serde::Deserialize;
use thiserror::Error;

use crate::events::{admin_channel, overlay_channel};

/// Default minimum length of an overlay token.
pub const DEFAULT_MIN_OVERLAY_TOKEN_LEN: usize = 32;

/// Validated identity of a feed connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub channel: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credential")]
    Missing,
    #[error("invalid credential")]
    Invalid,
    #[error("credential expired")]
    Expired,
}

pub trait TokenValidator: Send + Sync {
    fn validate(&self, credential: &str) -> Result<Identity, AuthError>;
}

/// Accepts any token of at least `min_len` characters.
#[derive(Debug, Clone)]
pub struct OverlayTokenValidator {
    min_len: usize,
}

impl OverlayTokenValidator {
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }
}

impl Default for OverlayTokenValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_OVERLAY_TOKEN_LEN)
    }
}

impl TokenValidator for OverlayTokenValidator {
    fn validate(&self, credential: &str) -> Result<Identity, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::Missing);
        }
        if credential.len() < self.min_len {
            tracing::warn!(token = %mask_secret(credential), "overlay token too short");
            return Err(AuthError::Invalid);
        }
        Ok(Identity {
            subject: mask_secret(credential),
            channel: overlay_channel(credential),
        })
    }
}

#[derive(Debug, Deserialize)]
struct AdminClaims {
    sub: String,
}

/// HS256 admin JWT validation; the channel is keyed by the `sub` claim.
#[derive(Clone)]
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl TokenValidator for JwtValidator {
    fn validate(&self, credential: &str) -> Result<Identity, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::Missing);
        }
        let data = decode::<AdminClaims>(credential, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid,
            }
        })?;
        let subject = data.claims.sub;
        if subject.is_empty() {
            return Err(AuthError::Invalid);
        }
        Ok(Identity {
            channel: admin_channel(&subject),
            subject,
        })
    }
}
