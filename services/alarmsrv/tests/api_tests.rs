//! Admin API integration tests
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::util::ServiceExt;

mod common;
use alarmsrv::api::create_router;
use alarmsrv::domain::SensorInfo;
use common::{alarm, start_service};

/// Send a bodiless request and decode the JSON reply
async fn request(app: &axum::Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health_check() {
    let svc = start_service(1, 60_000).await;
    let app = create_router(svc.handle.clone());

    let (status, body) = request(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "alarmsrv");

    svc.handle.shutdown().await;
    let (_, body) = request(&app, "GET", "/health").await;
    assert_eq!(body["status"], "stopping");
}

#[tokio::test]
async fn test_active_alarms_listing() {
    let svc = start_service(2, 60_000).await;
    let app = create_router(svc.handle.clone());

    let (status, body) = request(&app, "GET", "/api/v1/alarms/active").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sensor_count"], 0);
    assert_eq!(body["alarm_count"], 0);

    svc.handle
        .submit(vec![
            alarm("s2", "LED", "RED", 5000),
            alarm("s2", "BUZZER", "ON", 5000),
            alarm("s1", "LED", "GREEN", 5000),
        ])
        .await
        .unwrap();

    let (status, body) = request(&app, "GET", "/api/v1/alarms/active").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sensor_count"], 2);
    assert_eq!(body["alarm_count"], 3);
    assert_eq!(body["sensors"][0]["sensor_id"], "s1");
    assert_eq!(body["sensors"][1]["alarms"][1]["alarm_value"], "ON");

    svc.handle.shutdown().await;
}

#[tokio::test]
async fn test_active_alarms_after_shutdown_is_unavailable() {
    let svc = start_service(1, 60_000).await;
    let app = create_router(svc.handle.clone());
    svc.handle.shutdown().await;

    let (status, body) = request(&app, "GET", "/api/v1/alarms/active").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_reload_endpoint_refreshes_cache() {
    let svc = start_service(1, 60_000).await;
    let app = create_router(svc.handle.clone());
    svc.store
        .upsert_sensor(SensorInfo::new("s9", "yard tower", "t-la6", "127.0.0.1", 10000));

    assert!(svc.handle.cache().lookup("s9").is_none());
    let (status, body) = request(&app, "POST", "/api/v1/sensors/reload").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "reloaded");
    assert_eq!(body["sensors"], 2);
    assert_eq!(body["sensor_types"], 1);
    assert!(svc.handle.cache().lookup("s9").is_some());

    svc.handle.shutdown().await;
}

#[tokio::test]
async fn test_unknown_route() {
    let svc = start_service(1, 60_000).await;
    let app = create_router(svc.handle.clone());

    let (status, _) = request(&app, "GET", "/api/v1/nothing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    svc.handle.shutdown().await;
}
