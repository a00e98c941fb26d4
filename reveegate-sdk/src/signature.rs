//! Callback authentication for the supported payment providers.
//!
//! Two schemes exist:
//!
//! * **Midtrans**: the notification body carries `signature_key`, computed as
//!   `hex(SHA-512(order_id + status_code + gross_amount + server_key))`.
//!
//! * **Xendit**: every callback carries the account's verification token in
//!   the `x-callback-token` header.
//!
//! All comparisons run in constant time.

use ring::constant_time::verify_slices_are_equal;
use ring::digest::{SHA512, digest};

/// Header name carrying the Xendit callback verification token.
pub const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

/// Errors produced by callback authentication.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing credential")]
    Missing,
    #[error("credential mismatch")]
    Mismatch,
    #[error("no secret configured")]
    NotConfigured,
}

/// Compute the Midtrans notification signature.
pub fn midtrans_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let data = format!("{order_id}{status_code}{gross_amount}{server_key}");
    hex::encode(digest(&SHA512, data.as_bytes()))
}

/// Verify a Midtrans notification signature against the configured server key.
pub fn verify_midtrans_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
    signature_key: &str,
) -> Result<(), SignatureError> {
    if server_key.is_empty() {
        return Err(SignatureError::NotConfigured);
    }
    if signature_key.is_empty() {
        return Err(SignatureError::Missing);
    }
    let expected = midtrans_signature(order_id, status_code, gross_amount, server_key);
    if verify_slices_are_equal(expected.as_bytes(), signature_key.as_bytes()).is_ok() {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Verify a Xendit `x-callback-token` header value byte-for-byte.
pub fn verify_callback_token(provided: Option<&str>, expected: &str) -> Result<(), SignatureError> {
    if expected.is_empty() {
        return Err(SignatureError::NotConfigured);
    }
    let provided = provided.ok_or(SignatureError::Missing)?;
    if verify_slices_are_equal(provided.as_bytes(), expected.as_bytes()).is_ok() {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Mask a credential for logging, keeping only its first four characters.
pub fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}****")
}
