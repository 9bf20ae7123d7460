//! Unified error handling for the alarm orchestration services
//!
//! Every service converts its local error type into [`ServiceError`] at the
//! process boundary so bootstrap code and the admin API report failures the
//! same way.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ErrorInfo - API error response type
// ============================================================================

/// Standard error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// HTTP status code
    pub code: u16,
    /// Stable machine-readable code (see [`ServiceError::error_code`])
    pub kind: String,
    /// Error message
    pub message: String,
}

// ============================================================================
// ServiceError - Main error type
// ============================================================================

/// Main error type shared by the alarm services
#[derive(Debug, Error)]
pub enum ServiceError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ======================================
    // Storage Errors
    // ======================================
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    // ======================================
    // Input Errors
    // ======================================
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    // ======================================
    // File & I/O Errors
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ======================================
    // Service & Runtime Errors
    // ======================================
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ServiceError
pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidPayload(_) => 400,
            Self::ServiceUnavailable(_) => 503,
            _ => 500,
        }
    }

    /// Whether a later attempt could succeed without any configuration change
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable(_) | Self::Redis(_))
    }

    /// Stable error code for logs and API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIG_ERROR",
            Self::Sqlite(_) => "SQLITE_ERROR",
            Self::Redis(_) => "REDIS_ERROR",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::Io(_) => "IO_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to API ErrorInfo for HTTP responses
    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.status_code(),
            kind: self.error_code().to_string(),
            message: self.to_string(),
        }
    }
}
