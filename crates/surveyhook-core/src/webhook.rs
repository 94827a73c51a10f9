//! Authenticated construction of webhook events.
//!
//! An `EventEnvelope` can only be obtained through `construct_event`, so any
//! code holding one knows the delivery's signature was checked. Dispatch
//! accepts envelopes, never bare records.
//!
//! ```compile_fail
//! use serde_json::json;
//! use surveyhook_core::{DeliveryId, DeliveryRecord, EventEnvelope};
//!
//! let record = DeliveryRecord::new(DeliveryId(1), "survey-monkey", json!({}));
//! let envelope = EventEnvelope { record };
//! ```

use bytes::Bytes;
use serde_json::Value;
use tracing::warn;

use crate::{crypto::validate_signature, error::WebhookError, models::DeliveryRecord};

/// Inputs needed to verify one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningMaterial {
    /// Raw request body exactly as received.
    pub payload: Bytes,
    /// Value of the api key header.
    pub api_key: String,
    /// Value of the signature header.
    pub signature: String,
}

impl SigningMaterial {
    /// Creates signing material from a body and header values.
    pub fn new(
        payload: impl Into<Bytes>,
        api_key: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self { payload: payload.into(), api_key: api_key.into(), signature: signature.into() }
    }
}

/// A stored delivery whose signature has been verified.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    record: DeliveryRecord,
}

impl EventEnvelope {
    /// Returns the verified delivery.
    pub fn record(&self) -> &DeliveryRecord {
        &self.record
    }

    /// Returns the verified payload.
    pub fn payload(&self) -> &Value {
        &self.record.payload
    }

    /// Consumes the envelope, returning the delivery.
    pub fn into_record(self) -> DeliveryRecord {
        self.record
    }

    /// Reads the event type at a dot-separated payload path.
    pub fn event_type(&self, key: &str) -> Option<String> {
        self.record.event_type(key)
    }
}

/// Verifies signing material and wraps the stored delivery.
///
/// The signature is computed over `material.payload`, the raw body, never
/// over a re-serialisation of the record's payload.
///
/// # Errors
///
/// Returns `SignatureVerification` if the signature does not match or any
/// input (secret, api key, signature) is empty.
pub fn construct_event(
    record: DeliveryRecord,
    material: &SigningMaterial,
    secret: &str,
) -> Result<EventEnvelope, WebhookError> {
    let result =
        validate_signature(&material.payload, &material.api_key, secret, &material.signature);

    if result.is_valid {
        return Ok(EventEnvelope { record });
    }

    let reason = result.error_message.unwrap_or_else(|| "signature mismatch".to_string());
    warn!(delivery_id = %record.id, reason = %reason, "webhook signature verification failed");
    Err(WebhookError::signature(reason))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{crypto::compute_signature, models::DeliveryId};

    const BODY: &str = r#"{"event_type":"response.completed","object_id":"42"}"#;

    fn material(api_key: &str, secret: &str) -> SigningMaterial {
        let signature = compute_signature(BODY.as_bytes(), api_key, secret).unwrap();
        SigningMaterial::new(BODY.as_bytes().to_vec(), api_key, signature)
    }

    fn record() -> DeliveryRecord {
        DeliveryRecord::new(DeliveryId(7), "survey-monkey", serde_json::from_str(BODY).unwrap())
            .with_body(BODY)
    }

    #[test]
    fn valid_signature_yields_envelope() {
        let envelope = construct_event(record(), &material("key", "secret"), "secret").unwrap();

        assert_eq!(envelope.record().id, DeliveryId(7));
        assert_eq!(envelope.payload()["object_id"], json!("42"));
        assert_eq!(envelope.event_type("event_type"), Some("response.completed".to_string()));
        assert_eq!(envelope.event_type("missing"), None);
        assert_eq!(envelope.into_record(), record());
    }

    #[test]
    fn wrong_secret_is_rejected_as_server_error() {
        let error = construct_event(record(), &material("key", "secret"), "other").unwrap_err();

        assert!(matches!(error, WebhookError::SignatureVerification { .. }));
        assert_eq!(error.status_code(), 500);
        assert_eq!(error.to_string(), "Signature Verification Failed");
    }

    #[test]
    fn forged_signature_is_rejected() {
        let forged = SigningMaterial::new(BODY.as_bytes().to_vec(), "key", "dummy");

        assert!(construct_event(record(), &forged, "secret").is_err());
    }

    #[test]
    fn empty_secret_fails_closed() {
        let error = construct_event(record(), &material("key", ""), "").unwrap_err();

        assert!(matches!(error, WebhookError::SignatureVerification { .. }));
    }

    #[test]
    fn signature_covers_raw_bytes_not_reserialised_json() {
        let mut material = material("key", "secret");
        material.payload =
            Bytes::from_static(br#"{ "event_type": "response.completed", "object_id": "42" }"#);

        assert!(construct_event(record(), &material, "secret").is_err());
    }
}
