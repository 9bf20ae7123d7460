//! Shared service library
//!
//! Provides basic functions shared by the alarm services, including:
//! - logging initialisation
//! - startup banner and service metadata
//! - common command-line arguments
//! - graceful shutdown signal handling
//! - SQLite pool setup

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "cli")]
pub mod bootstrap_args;

pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;

pub use service_bootstrap::ServiceInfo;

/// Default bind host for admin APIs
pub const DEFAULT_API_HOST: &str = "0.0.0.0";

/// Default Redis URL used when neither config nor CLI provide one
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

// Re-export common dependencies
pub use anyhow;
pub use tokio;

#[cfg(feature = "cli")]
pub use clap;
