//! Signing material extraction and secret selection.
//!
//! Verification itself lives in `surveyhook_core::webhook`; this module
//! reads what it needs from the HTTP request and the configuration.

use axum::http::HeaderMap;
use bytes::Bytes;
use surveyhook_core::{SigningMaterial, WebhookError};

use crate::config::Config;

/// Collects signing material from a request.
///
/// # Errors
///
/// Returns `SignatureVerification` if either header is missing or not
/// valid UTF-8.
pub fn signing_material(
    headers: &HeaderMap,
    body: Bytes,
    api_key_header: &str,
    signature_header: &str,
) -> Result<SigningMaterial, WebhookError> {
    Ok(SigningMaterial::new(
        body,
        header_value(headers, api_key_header)?,
        header_value(headers, signature_header)?,
    ))
}

fn header_value(headers: &HeaderMap, name: &str) -> Result<String, WebhookError> {
    let value = headers
        .get(name)
        .ok_or_else(|| WebhookError::signature(format!("missing {name} header")))?;

    value
        .to_str()
        .map(str::to_string)
        .map_err(|_| WebhookError::signature(format!("{name} header is not valid UTF-8")))
}

/// Selects the signing secret for a request.
///
/// With a discriminator only `signing_secrets[discriminator]` is eligible;
/// there is no fallback to the default secret. Empty secrets count as
/// absent.
pub fn resolve_secret<'a>(config: &'a Config, discriminator: Option<&str>) -> Option<&'a str> {
    let secret = match discriminator {
        Some(key) => config.signing_secrets.get(key).map(String::as_str),
        None => Some(config.signing_secret.as_str()),
    };

    secret.filter(|secret| !secret.is_empty())
}
