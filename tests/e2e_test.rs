//! End-to-end tests for the webhook service.
//!
//! Wires the HTTP router to a running worker pool, the same way the binary
//! does, with the in-memory delivery store standing in for PostgreSQL.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use axum::http::StatusCode;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use surveyhook_api::{create_router, AppState, Config};
use surveyhook_core::{DeliveryId, DeliveryStatus, MulticastNotifier};
use surveyhook_dispatch::{
    retry::RetryPolicy, storage::mock::MockDeliveryStore, DispatchRouter, HandlerRegistry,
    ProcessingPipeline, WorkerConfig, WorkerPool,
};
use surveyhook_testing::{
    DummyJob, RecordingNotifier, WebhookRequestBuilder, DUMMY_HANDLER, TEST_SECRET,
};
use tower::ServiceExt;

struct Service {
    app: axum::Router,
    store: Arc<MockDeliveryStore>,
    observer: Arc<RecordingNotifier>,
    runs: Arc<Mutex<Vec<DeliveryId>>>,
    workers: WorkerPool,
}

fn service() -> Service {
    let mut config = Config { signing_secret: TEST_SECRET.to_string(), ..Config::default() };
    config.jobs.insert("response_completed", DUMMY_HANDLER);
    config.jobs.insert("survey_created", "handle_response_completed");

    let store = Arc::new(MockDeliveryStore::new());
    let observer = Arc::new(RecordingNotifier::new());
    let runs = Arc::new(Mutex::new(Vec::new()));

    let mut workers = WorkerPool::new(WorkerConfig {
        worker_count: 2,
        queue_capacity: 16,
        retry_policy: RetryPolicy::no_retry(),
        shutdown_timeout: Duration::from_secs(5),
    });
    workers.spawn_workers();

    let mut notifier = MulticastNotifier::new();
    notifier.subscribe(observer.clone());

    let mut registry = HandlerRegistry::with_builtin_jobs();
    DummyJob::register(&mut registry, runs.clone());

    let router =
        DispatchRouter::new(Arc::new(registry), Arc::new(notifier), Arc::new(workers.queue()));
    let pipeline = ProcessingPipeline::new(store.clone(), router, Arc::new(config.jobs.clone()));
    let app = create_router(AppState::new(pipeline, Arc::new(config)));

    Service { app, store, observer, runs, workers }
}

async fn post(app: &axum::Router, body: &Value) -> Result<(StatusCode, Value)> {
    let request = WebhookRequestBuilder::new().json(body).build();
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();

    Ok((status, serde_json::from_slice(&bytes)?))
}

#[tokio::test]
async fn mapped_event_runs_handler_on_worker_pool() -> Result<()> {
    let service = service();

    let (status, body) = post(&service.app, &json!({"event_type": "response.completed"})).await?;
    service.workers.shutdown_graceful().await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "ok"}));

    let record = service.store.last().await.expect("record should be stored");
    assert_eq!(record.status, DeliveryStatus::Processed);
    assert_eq!(*service.runs.lock().expect("run log"), vec![record.id]);
    assert_eq!(
        service.observer.names(),
        vec!["surveymonkey-webhooks::response.completed".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn builtin_handler_completes() -> Result<()> {
    let service = service();

    let (status, _) =
        post(&service.app, &json!({"event_type": "survey_created", "object_id": "77"})).await?;
    let stats = service.workers.stats();
    service.workers.shutdown_graceful().await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats.scheduled, 1);
    assert!(service.runs.lock().expect("run log").is_empty());
    Ok(())
}

#[tokio::test]
async fn mixed_traffic_leaves_one_record_per_call() -> Result<()> {
    let service = service();

    let calls = [
        (json!({"event_type": "response_completed"}), StatusCode::OK),
        (json!({"event_type": "collector_updated"}), StatusCode::OK),
        (json!({"object_id": "1"}), StatusCode::BAD_REQUEST),
    ];
    for (body, expected) in &calls {
        let (status, _) = post(&service.app, body).await?;
        assert_eq!(status, *expected);
    }
    service.workers.shutdown_graceful().await?;

    let statuses: Vec<_> =
        service.store.records().await.into_iter().map(|record| record.status).collect();
    assert_eq!(
        statuses,
        vec![DeliveryStatus::Processed, DeliveryStatus::Processed, DeliveryStatus::Failed]
    );
    assert_eq!(service.runs.lock().expect("run log").len(), 1);
    assert_eq!(service.observer.names().len(), 2);
    Ok(())
}
