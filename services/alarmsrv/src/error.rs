//! Error handling for AlarmSrv
//!
//! Device failures never surface here: drivers turn them into
//! [`DeviceOutcome`](crate::drivers::DeviceOutcome) values that are only logged.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use errors::ServiceError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, AlarmSrvError>;

#[derive(Debug, Error)]
pub enum AlarmSrvError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bus payload that cannot be turned into alarm messages
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Sensor store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Message bus error: {0}")]
    Bus(#[from] redis::RedisError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The dispatch task has exited
    #[error("Alarm service is not running")]
    ServiceStopped,
}

impl From<figment::Error> for AlarmSrvError {
    fn from(err: figment::Error) -> Self {
        AlarmSrvError::Config(err.to_string())
    }
}

impl From<AlarmSrvError> for ServiceError {
    fn from(err: AlarmSrvError) -> Self {
        match err {
            AlarmSrvError::Config(msg) => ServiceError::Configuration(msg),
            AlarmSrvError::InvalidPayload(msg) => ServiceError::InvalidPayload(msg),
            AlarmSrvError::Store(e) => ServiceError::Sqlite(e),
            AlarmSrvError::Bus(e) => ServiceError::Redis(e),
            AlarmSrvError::Io(e) => ServiceError::Io(e),
            AlarmSrvError::ServiceStopped => {
                ServiceError::ServiceUnavailable("alarm dispatch stopped".to_string())
            },
        }
    }
}

// HTTP response conversion for Axum
impl IntoResponse for AlarmSrvError {
    fn into_response(self) -> Response {
        let info = ServiceError::from(self).to_error_info();
        let status =
            StatusCode::from_u16(info.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(info)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_service_error() {
        let err: ServiceError = AlarmSrvError::InvalidPayload("x".into()).into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), "INVALID_PAYLOAD");

        let err: ServiceError = AlarmSrvError::ServiceStopped.into();
        assert_eq!(err.status_code(), 503);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_response_status() {
        let resp = AlarmSrvError::ServiceStopped.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
