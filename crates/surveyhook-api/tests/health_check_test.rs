//! Health check endpoint tests.

use anyhow::Result;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use surveyhook_testing::TestEnv;

#[tokio::test]
async fn health_check_reports_healthy_store() -> Result<()> {
    let env = TestEnv::new();
    let request = Request::get("/health").body(Body::empty())?;

    let response = env.send(request).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert!(response.body["database"]["response_time_ms"].is_u64());
    assert!(response.body["database"].get("message").is_none());
    assert_eq!(response.body["version"], env!("CARGO_PKG_VERSION"));
    Ok(())
}

#[tokio::test]
async fn health_check_does_not_touch_deliveries() -> Result<()> {
    let env = TestEnv::new();

    env.send(Request::get("/health").body(Body::empty())?).await?;

    assert!(env.records().await.is_empty());
    Ok(())
}
