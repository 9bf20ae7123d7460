//! Admin HTTP API
//!
//! - `GET  /health`
//! - `GET  /api/v1/alarms/active` active alarms per sensor with remaining duration
//! - `POST /api/v1/sensors/reload` cache reload signal for the configuration layer

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::Result;
use crate::service::{ActiveSensor, AlarmServiceHandle};

#[derive(Clone)]
pub struct ApiState {
    pub service: AlarmServiceHandle,
}

#[derive(Debug, Serialize)]
pub struct ActiveAlarmsResponse {
    pub sensor_count: usize,
    pub alarm_count: usize,
    pub sensors: Vec<ActiveSensor>,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub status: &'static str,
    pub sensors: usize,
    pub sensor_types: usize,
}

pub fn create_router(service: AlarmServiceHandle) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/alarms/active", get(active_alarms))
        .route("/api/v1/sensors/reload", post(reload_sensors))
        .layer(TraceLayer::new_for_http())
        .with_state(ApiState { service })
}

async fn health_check(State(state): State<ApiState>) -> Json<Value> {
    let running = state.service.is_running();
    Json(json!({
        "status": if running { "healthy" } else { "stopping" },
        "service": "alarmsrv",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn active_alarms(State(state): State<ApiState>) -> Result<Json<ActiveAlarmsResponse>> {
    let sensors = state.service.active_alarms().await?;
    Ok(Json(ActiveAlarmsResponse {
        sensor_count: sensors.len(),
        alarm_count: sensors.iter().map(|s| s.alarms.len()).sum(),
        sensors,
    }))
}

async fn reload_sensors(State(state): State<ApiState>) -> Result<Json<ReloadResponse>> {
    state.service.reload_cache().await?;
    let snapshot = state.service.cache().snapshot();
    info!("Sensor cache reloaded via API");
    Ok(Json(ReloadResponse {
        status: "reloaded",
        sensors: snapshot.sensor_count(),
        sensor_types: snapshot.type_count(),
    }))
}
