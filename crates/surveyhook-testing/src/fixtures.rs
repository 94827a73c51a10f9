//! Signed request builders and verified deliveries for webhook tests.

use axum::{body::Body, http::Request};
use bytes::Bytes;
use serde_json::Value;
use surveyhook_api::server::WEBHOOK_PATH;
use surveyhook_core::{
    construct_event, crypto::compute_signature, DeliveryRecord, EventEnvelope, SigningMaterial,
    WebhookError,
};
use surveyhook_dispatch::ProcessingPipeline;

/// Api key used by default in test requests.
pub const TEST_API_KEY: &str = "test-api-key";

/// Default signing secret used by test environments.
pub const TEST_SECRET: &str = "test-secret";

/// Signs a body the way Survey Monkey does.
pub fn sign(body: &[u8], api_key: &str, secret: &str) -> String {
    compute_signature(body, api_key, secret).unwrap_or_default()
}

/// Persists `payload` through a pipeline with its compact JSON as body.
///
/// # Errors
///
/// Returns `WebhookError::Storage` if the store rejects the write.
pub async fn ingest_json(
    pipeline: &ProcessingPipeline,
    payload: Value,
) -> Result<DeliveryRecord, WebhookError> {
    let body = payload.to_string().into_bytes();
    pipeline.ingest(payload, body).await
}

/// Verifies a stored delivery signed with the test api key and secret.
///
/// # Errors
///
/// Returns `SignatureVerification` if the record cannot be verified.
pub fn verified(record: DeliveryRecord) -> Result<EventEnvelope, WebhookError> {
    let signature = sign(&record.body, TEST_API_KEY, TEST_SECRET);
    let material = SigningMaterial::new(record.body.clone(), TEST_API_KEY, signature);
    construct_event(record, &material, TEST_SECRET)
}

/// Builder for webhook HTTP requests.
#[derive(Debug, Clone)]
pub struct WebhookRequestBuilder {
    config_key: Option<String>,
    body: Bytes,
    api_key: Option<String>,
    secret: String,
    signature: Option<String>,
    sign_request: bool,
    headers: Vec<(String, String)>,
}

impl WebhookRequestBuilder {
    /// Creates a builder signing with the test api key and secret.
    pub fn new() -> Self {
        Self {
            config_key: None,
            body: Bytes::from_static(br#"{"event_type":"test"}"#),
            api_key: Some(TEST_API_KEY.to_string()),
            secret: TEST_SECRET.to_string(),
            signature: None,
            sign_request: true,
            headers: Vec::new(),
        }
    }

    /// Posts to `/webhooks/survey-monkey/{key}` instead of the default route.
    #[must_use]
    pub fn config_key(mut self, key: impl Into<String>) -> Self {
        self.config_key = Some(key.into());
        self
    }

    /// Sets the body to the compact serialisation of `value`.
    #[must_use]
    pub fn json(mut self, value: &Value) -> Self {
        self.body = Bytes::from(value.to_string());
        self
    }

    /// Sets a raw body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Signs with a different secret.
    #[must_use]
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    /// Sends a different api key.
    #[must_use]
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Omits the api key header.
    #[must_use]
    pub fn without_api_key(mut self) -> Self {
        self.api_key = None;
        self
    }

    /// Sends a fixed signature instead of computing one.
    #[must_use]
    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Omits the signature header.
    #[must_use]
    pub fn unsigned(mut self) -> Self {
        self.sign_request = false;
        self
    }

    /// Adds an extra header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the signature the builder will send.
    pub fn computed_signature(&self) -> String {
        self.signature.clone().unwrap_or_else(|| {
            sign(&self.body, self.api_key.as_deref().unwrap_or_default(), &self.secret)
        })
    }

    /// Builds the request.
    pub fn build(self) -> Request<Body> {
        let uri = match &self.config_key {
            Some(key) => format!("{WEBHOOK_PATH}/{key}"),
            None => WEBHOOK_PATH.to_string(),
        };
        let signature = self.computed_signature();

        let mut builder = Request::post(uri).header("content-type", "application/json");
        if let Some(api_key) = &self.api_key {
            builder = builder.header("sm-apikey", api_key);
        }
        if self.sign_request {
            builder = builder.header("sm-signature", signature);
        }
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }

        builder.body(Body::from(self.body)).unwrap_or_default()
    }
}

impl Default for WebhookRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_request_carries_both_headers() {
        let builder = WebhookRequestBuilder::new().json(&serde_json::json!({"event_type": "x"}));
        let expected = sign(br#"{"event_type":"x"}"#, TEST_API_KEY, TEST_SECRET);

        let request = builder.build();

        assert_eq!(request.uri(), WEBHOOK_PATH);
        assert_eq!(request.headers()["sm-apikey"], TEST_API_KEY);
        assert_eq!(request.headers()["sm-signature"], expected.as_str());
    }

    #[test]
    fn verified_accepts_records_signed_with_test_secret() {
        let record = DeliveryRecord::new(
            surveyhook_core::DeliveryId(1),
            "survey-monkey",
            serde_json::json!({"event_type": "x"}),
        )
        .with_body(br#"{"event_type":"x"}"#.to_vec());

        let envelope = verified(record).unwrap();

        assert_eq!(envelope.event_type("event_type"), Some("x".to_string()));
    }

    #[test]
    fn config_key_changes_path() {
        let request = WebhookRequestBuilder::new().config_key("eu").unsigned().build();

        assert_eq!(request.uri(), "/webhooks/survey-monkey/eu");
        assert!(request.headers().get("sm-signature").is_none());
    }
}
