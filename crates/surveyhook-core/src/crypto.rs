//! Signature computation and verification for Survey Monkey webhooks.
//!
//! Survey Monkey signs the raw request body with HMAC-SHA1, keyed by the
//! account's api key and api secret joined with `&`, and sends the digest
//! base64-encoded in the `sm-signature` header.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

type HmacSha1 = Hmac<Sha1>;

/// Result of signature validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether the signature is valid.
    pub is_valid: bool,
    /// Why validation failed, for logs.
    pub error_message: Option<String>,
}

impl ValidationResult {
    /// Creates a successful validation result.
    pub fn valid() -> Self {
        Self { is_valid: true, error_message: None }
    }

    /// Creates a failed validation result with error message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self { is_valid: false, error_message: Some(message.into()) }
    }
}

/// Signature computation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The HMAC implementation rejected the key.
    InvalidKey,
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey => write!(f, "invalid signing key"),
        }
    }
}

impl std::error::Error for SignatureError {}

/// Computes the signature Survey Monkey would send for a payload.
///
/// # Errors
///
/// Returns `SignatureError::InvalidKey` if the HMAC key is rejected.
///
/// # Example
///
/// ```
/// use surveyhook_core::crypto::compute_signature;
///
/// let signature = compute_signature(b"{}", "api-key", "api-secret").unwrap();
/// assert_eq!(signature.len(), 28);
/// ```
pub fn compute_signature(
    payload: &[u8],
    api_key: &str,
    secret: &str,
) -> Result<String, SignatureError> {
    let key = format!("{api_key}&{secret}");
    let mut mac =
        HmacSha1::new_from_slice(key.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(payload);

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Returns true if `claimed` is the signature of `payload`.
///
/// Comparison runs in constant time over the encoded signatures.
pub fn verify_signature(payload: &[u8], api_key: &str, secret: &str, claimed: &str) -> bool {
    match compute_signature(payload, api_key, secret) {
        Ok(expected) => expected.as_bytes().ct_eq(claimed.as_bytes()).into(),
        Err(_) => false,
    }
}

/// Verifies a signature and explains a failure.
pub fn validate_signature(
    payload: &[u8],
    api_key: &str,
    secret: &str,
    claimed: &str,
) -> ValidationResult {
    if claimed.is_empty() {
        return ValidationResult::invalid("signature header is empty");
    }

    if api_key.is_empty() {
        return ValidationResult::invalid("api key header is empty");
    }

    if secret.is_empty() {
        return ValidationResult::invalid("signing secret is not configured");
    }

    if verify_signature(payload, api_key, secret, claimed) {
        ValidationResult::valid()
    } else {
        ValidationResult::invalid("signature mismatch")
    }
}
