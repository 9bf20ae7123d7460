//! Common command-line arguments
//!
//! Services flatten [`ServiceArgs`] into their own `clap` parser.

use clap::Args;

/// Common service startup arguments
#[derive(Debug, Clone, Args)]
pub struct ServiceArgs {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,

    /// Optional bind address override for the admin API (e.g., 127.0.0.1:6010)
    #[arg(short = 'b', long, env = "BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Configuration file (YAML)
    #[arg(short = 'c', long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Custom database path override
    #[arg(long, env = "DB_PATH")]
    pub db_path: Option<String>,

    /// Redis URL override
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Disable colored output (useful for log files)
    #[arg(long)]
    pub no_color: bool,

    /// Disable file logging, console only
    #[arg(long)]
    pub console_only: bool,

    /// Only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,
}

impl Default for ServiceArgs {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            bind_address: None,
            config: None,
            db_path: None,
            redis_url: None,
            no_color: false,
            console_only: false,
            validate: false,
        }
    }
}

impl ServiceArgs {
    /// Parse log level string to tracing::Level
    pub fn parse_log_level(&self) -> tracing::Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" | "warning" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = ServiceArgs::default();
        assert_eq!(args.log_level, "info");
        assert!(!args.validate);
        assert!(args.db_path.is_none());
    }

    #[test]
    fn test_parse_log_level() {
        let args = ServiceArgs {
            log_level: "WARN".to_string(),
            ..Default::default()
        };
        assert_eq!(args.parse_log_level(), tracing::Level::WARN);

        let args = ServiceArgs {
            log_level: "bogus".to_string(),
            ..Default::default()
        };
        assert_eq!(args.parse_log_level(), tracing::Level::INFO);
    }
}
