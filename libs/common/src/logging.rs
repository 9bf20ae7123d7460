//! Unified logging module
//!
//! Console output plus a daily rolling file per service, both using the same
//! bracketed-level line format.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{
        self,
        format::Writer,
        FmtContext, FormatEvent, FormatFields,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Environment variable overriding the log root directory
pub const LOG_DIR_ENV: &str = "ALARMSRV_LOG_DIR";

fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter producing `timestamp [LEVEL] message key=value`
///
/// Example output: `2025-12-02T00:50:44.809123Z [INFO] Alarm expired sensor_id="s1"`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

// Keeps the non-blocking file writer flushing until process exit
static GUARD: OnceLock<Mutex<Option<WorkerGuard>>> = OnceLock::new();

static LOG_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Initialize log root directory
///
/// Priority:
/// 1. `ALARMSRV_LOG_DIR` environment variable
/// 2. `config_dir` parameter
/// 3. Default "logs"
pub fn init_log_root(config_dir: Option<&str>) {
    LOG_ROOT.get_or_init(|| {
        std::env::var(LOG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                config_dir
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("logs"))
            })
    });
}

/// Get log root directory, falling back to env or "logs" when not initialised
pub fn get_log_root() -> PathBuf {
    LOG_ROOT.get().cloned().unwrap_or_else(|| {
        std::env::var(LOG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"))
    })
}

/// Logging configuration for one service process
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub service_name: String,
    /// Directory receiving `<service>.log.<date>` files
    pub log_dir: PathBuf,
    /// Console level; `RUST_LOG` takes precedence when set
    pub console_level: Level,
    pub file_level: Level,
    /// Colored console output
    pub ansi: bool,
    /// Disable the file layer entirely (tests, containers logging to stdout)
    pub console_only: bool,
}

impl LogConfig {
    /// Standard config: console at `console_level`, DEBUG file log under the log root
    pub fn for_service(service_name: &str, console_level: Level) -> Self {
        Self {
            service_name: service_name.to_string(),
            log_dir: get_log_root().join(service_name),
            console_level,
            file_level: Level::DEBUG,
            ansi: true,
            console_only: false,
        }
    }
}

/// Install the global subscriber
///
/// Fails if a global subscriber is already installed or the log directory
/// cannot be created.
pub fn init_logging(config: LogConfig) -> anyhow::Result<()> {
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.console_level.to_string().to_lowercase())
    });

    let console_layer = fmt::layer()
        .event_format(BracketedLevelFormat)
        .with_ansi(config.ansi)
        .with_filter(console_filter);

    if config.console_only {
        tracing_subscriber::registry()
            .with(console_layer)
            .try_init()?;
        return Ok(());
    }

    std::fs::create_dir_all(&config.log_dir)?;
    let appender = tracing_appender::rolling::daily(
        &config.log_dir,
        format!("{}.log", config.service_name),
    );
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .event_format(BracketedLevelFormat)
        .with_ansi(false)
        .with_writer(file_writer)
        .with_filter(LevelFilter::from_level(config.file_level));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    if let Ok(mut slot) = GUARD.get_or_init(|| Mutex::new(None)).lock() {
        *slot = Some(guard);
    }

    Ok(())
}
