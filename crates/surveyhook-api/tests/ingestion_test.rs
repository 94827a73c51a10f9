//! Integration tests for the Survey Monkey ingestion endpoint.
//!
//! Drives signed and unsigned requests through the full router against the
//! in-memory delivery store and checks both the HTTP answer and what was
//! persisted.

use anyhow::Result;
use axum::{body::Body, http::{Request, StatusCode}};
use serde_json::{json, Value};
use surveyhook_core::DeliveryStatus;
use surveyhook_testing::{TestEnv, DUMMY_HANDLER};

#[tokio::test]
async fn signed_call_is_accepted_and_processed() -> Result<()> {
    let env = TestEnv::new();
    let request = env.request().json(&json!({"event_type": "response_completed"})).build();

    let response = env.send(request).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({"message": "ok"}));
    assert!(response.headers.contains_key("x-request-id"));

    let record = env.last_record().await.expect("record should be stored");
    assert_eq!(record.name, "survey-monkey");
    assert_eq!(record.status, DeliveryStatus::Processed);
    assert!(record.exception.is_none());
    assert!(record.processed_at.is_some());
    Ok(())
}

#[tokio::test]
async fn accepted_call_publishes_namespaced_notification() -> Result<()> {
    let env = TestEnv::new();
    let request = env.request().json(&json!({"event_type": "response.completed"})).build();

    env.send(request).await?;

    assert_eq!(env.notifier.names(), vec!["surveymonkey-webhooks::response.completed"]);
    Ok(())
}

#[tokio::test]
async fn wrong_secret_is_server_error_and_record_fails() -> Result<()> {
    let env = TestEnv::builder().job("response_completed", DUMMY_HANDLER).build();
    let request = env
        .request()
        .json(&json!({"event_type": "response_completed"}))
        .secret("not-the-secret")
        .build();

    let response = env.send(request).await?;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.error_code(), Some("E1001"));
    assert_eq!(response.error_message(), Some("Signature Verification Failed"));

    let record = env.last_record().await.expect("rejected call should still be stored");
    assert_eq!(record.status, DeliveryStatus::Failed);
    assert_eq!(record.exception.map(|e| e.kind), Some("signature_verification".to_string()));
    assert!(env.notifier.names().is_empty());
    assert!(env.scheduler.scheduled().is_empty());
    Ok(())
}

#[tokio::test]
async fn tampered_body_fails_verification() -> Result<()> {
    let env = TestEnv::new();
    let signature = env.request().json(&json!({"event_type": "a"})).computed_signature();
    let request = env.request().json(&json!({"event_type": "b"})).signature(signature).build();

    let response = env.send(request).await?;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.error_code(), Some("E1001"));
    Ok(())
}

#[tokio::test]
async fn missing_signature_header_is_server_error() -> Result<()> {
    let env = TestEnv::new();

    let response = env.send(env.request().unsigned().build()).await?;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.error_code(), Some("E1001"));
    assert_eq!(env.records().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn missing_api_key_header_is_server_error() -> Result<()> {
    let env = TestEnv::new();

    let response = env.send(env.request().without_api_key().build()).await?;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let record = env.last_record().await.expect("record should be stored");
    assert_eq!(record.status, DeliveryStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn unconfigured_secret_rejects_every_call() -> Result<()> {
    let env = TestEnv::builder().secret("").build();

    let response = env.send(env.request().secret("").build()).await?;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    Ok(())
}

#[tokio::test]
async fn payload_without_type_is_bad_request() -> Result<()> {
    let env = TestEnv::new();
    let request = env.request().json(&json!({"object_id": "123"})).build();

    let response = env.send(request).await?;

    let record = env.last_record().await.expect("record should be stored");
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), Some("E1002"));
    assert_eq!(
        response.error_message(),
        Some(
            format!(
                "Webhook call id `{}` did not contain a type. Valid webhook calls should always \
                 contain a type.",
                record.id
            )
            .as_str()
        )
    );
    assert_eq!(record.status, DeliveryStatus::Failed);
    assert!(env.notifier.names().is_empty());
    Ok(())
}

#[tokio::test]
async fn numeric_type_is_published_as_text() -> Result<()> {
    let env = TestEnv::new();
    let request = env.request().json(&json!({"event_type": 42})).build();

    let response = env.send(request).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(env.notifier.names(), vec!["surveymonkey-webhooks::42"]);
    Ok(())
}

#[tokio::test]
async fn falsy_types_count_as_missing() -> Result<()> {
    let env = TestEnv::new();

    for event_type in [json!("0"), json!(0), json!(false), json!(null), json!("")] {
        let request = env.request().json(&json!({"event_type": event_type})).build();

        let response = env.send(request).await?;

        assert_eq!(response.status, StatusCode::BAD_REQUEST, "type {event_type}");
        assert_eq!(response.error_code(), Some("E1002"));
    }
    assert!(env.notifier.names().is_empty());
    Ok(())
}

#[tokio::test]
async fn keyed_route_uses_keyed_secret() -> Result<()> {
    let env = TestEnv::builder().keyed_secret("eu", "eu-secret").build();
    let request = env.request().config_key("eu").secret("eu-secret").build();

    let response = env.send(request).await?;

    assert_eq!(response.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn keyed_route_does_not_fall_back_to_default_secret() -> Result<()> {
    let env = TestEnv::builder().keyed_secret("eu", "eu-secret").build();

    let default_signed = env.send(env.request().config_key("eu").build()).await?;
    let unknown_key = env.send(env.request().config_key("us").build()).await?;

    assert_eq!(default_signed.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(unknown_key.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(env.records().await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn unmapped_type_is_accepted_without_scheduling() -> Result<()> {
    let env = TestEnv::builder().job("response_completed", DUMMY_HANDLER).build();
    let request = env.request().json(&json!({"event_type": "survey_created"})).build();

    let response = env.send(request).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert!(env.scheduler.scheduled().is_empty());
    assert_eq!(env.notifier.names().len(), 1);
    Ok(())
}

#[tokio::test]
async fn dotted_type_schedules_mapped_handler() -> Result<()> {
    let env = TestEnv::builder().job("response_completed", DUMMY_HANDLER).build();
    let request = env.request().json(&json!({"event_type": "response.completed"})).build();

    let response = env.send(request).await?;

    let record = env.last_record().await.expect("record should be stored");
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(env.scheduler.scheduled(), vec![(DUMMY_HANDLER.to_string(), record.id)]);
    Ok(())
}

#[tokio::test]
async fn unknown_handler_is_server_error_after_notifying() -> Result<()> {
    let env = TestEnv::builder().job("test", "does_not_exist").build();

    let response = env.send(env.request().build()).await?;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.error_code(), Some("E1003"));
    assert_eq!(env.notifier.names(), vec!["surveymonkey-webhooks::test"]);
    assert!(env.scheduler.scheduled().is_empty());

    let record = env.last_record().await.expect("record should be stored");
    assert_eq!(record.exception.map(|e| e.kind), Some("unknown_handler".to_string()));
    Ok(())
}

#[tokio::test]
async fn refused_job_is_server_error() -> Result<()> {
    let env = TestEnv::builder().job("test", DUMMY_HANDLER).rejecting_scheduler().build();

    let response = env.send(env.request().build()).await?;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.error_code(), Some("E3001"));
    Ok(())
}

#[tokio::test]
async fn nested_type_key_is_followed() -> Result<()> {
    let env = TestEnv::builder().event_type_key("meta.event").build();
    let request =
        env.request().json(&json!({"meta": {"event": "collector_updated"}})).build();

    let response = env.send(request).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(env.notifier.names(), vec!["surveymonkey-webhooks::collector_updated"]);
    Ok(())
}

#[tokio::test]
async fn invalid_json_is_stored_and_rejected() -> Result<()> {
    let env = TestEnv::new();
    let request = env.request().body("not json").build();

    let response = env.send(request).await?;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), Some("E1004"));

    let record = env.last_record().await.expect("record should be stored");
    assert_eq!(record.body, b"not json".to_vec());
    assert_eq!(record.payload, Value::Null);
    assert_eq!(record.status, DeliveryStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn non_utf8_body_is_stored_byte_for_byte() -> Result<()> {
    let env = TestEnv::new();
    let body: &[u8] = &[0xff, 0xfe, b'{', 0x00, 0x80];
    let request = env.request().body(body.to_vec()).build();

    let response = env.send(request).await?;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), Some("E1004"));

    let record = env.last_record().await.expect("record should be stored");
    assert_eq!(record.body, body.to_vec());
    assert_eq!(record.status, DeliveryStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn escaped_nul_in_payload_is_stored_and_accepted() -> Result<()> {
    let env = TestEnv::new();
    let body = r#"{"event_type":"response_completed","note":"a\u0000b"}"#;
    let request = env.request().body(body).build();

    let response = env.send(request).await?;

    assert_eq!(response.status, StatusCode::OK);

    let record = env.last_record().await.expect("record should be stored");
    assert_eq!(record.body, body.as_bytes().to_vec());
    assert_eq!(record.payload["note"], json!("a\0b"));
    assert_eq!(record.status, DeliveryStatus::Processed);
    Ok(())
}

#[tokio::test]
async fn oversized_body_is_rejected_without_storing() -> Result<()> {
    let env = TestEnv::builder().max_body_bytes(64).build();
    let request = env.request().json(&json!({"event_type": "x".repeat(128)})).build();

    let response = env.send(request).await?;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.error_code(), Some("E1005"));
    assert!(env.records().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn storage_failure_is_server_error() -> Result<()> {
    let env = TestEnv::new();
    env.store.inject_write_error("connection reset").await;

    let response = env.send(env.request().build()).await?;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.error_code(), Some("E3002"));
    assert!(env.records().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn get_on_webhook_path_is_not_allowed() -> Result<()> {
    let env = TestEnv::new();
    let request = Request::get("/webhooks/survey-monkey").body(Body::empty())?;

    let response = env.send(request).await?;

    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    Ok(())
}
