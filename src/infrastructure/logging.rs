//! Logging system configuration and initialization
//!
//! - Console output on stderr, so stdout stays free for harvested records
//! - Daily rolling log file, plain text or JSON
//! - Verbose dependency targets quieted unless the level is TRACE
//! - `RUST_LOG` overrides the configured filter entirely

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::Utc;
use lazy_static::lazy_static;
use tracing::{info, warn};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::ConfigManager;

lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<WorkerGuard>> = Mutex::new(Vec::new());
}

/// Dependency targets and the level they are held at below TRACE
const QUIET_TARGETS: [(&str, &str); 7] = [
    ("sqlx::query", "warn"),
    ("sqlx::migrate", "info"),
    ("sqlx::sqlite", "warn"),
    ("reqwest", "info"),
    ("hyper", "warn"),
    ("h2", "warn"),
    ("html5ever", "warn"),
];

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// UTC timestamps with millisecond precision
struct UtcTimeFormatter;

impl FormatTime for UtcTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

/// Log directory from the config, else `logs/` under the app data directory,
/// else next to the executable
pub fn get_log_directory(config: &LoggingConfig) -> PathBuf {
    if !config.directory.is_empty() {
        return PathBuf::from(&config.directory);
    }
    if let Ok(data_dir) = ConfigManager::get_app_data_dir() {
        return data_dir.join("logs");
    }
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_default()
        .join("logs")
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Build the filter for `config`, unless `RUST_LOG` is set
///
/// ```bash
/// # show every SQL statement
/// RUST_LOG="debug,sqlx::query=debug" channel-harvest crawl @somechannel
/// ```
pub fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| configured_filter(config))
}

fn configured_filter(config: &LoggingConfig) -> EnvFilter {
    let mut filter = EnvFilter::new(&config.level);

    let mut directives: Vec<String> = Vec::new();
    if !config.level.to_lowercase().contains("trace") {
        directives.extend(QUIET_TARGETS.iter().map(|(target, level)| format!("{target}={level}")));
    }
    directives.extend(
        config
            .module_filters
            .iter()
            .map(|(target, level)| format!("{target}={level}")),
    );

    for directive in directives {
        match directive.parse() {
            Ok(parsed) => filter = filter.add_directive(parsed),
            Err(e) => eprintln!("Ignoring invalid log directive '{directive}': {e}"),
        }
    }
    filter
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    if !config.file_output && !config.console_output {
        return Err(anyhow!("No logging output configured"));
    }

    let log_dir = get_log_directory(config);
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

        let file_appender = rolling::daily(&log_dir, &config.file_name);
        let (file_writer, file_guard) = non_blocking(file_appender);
        if let Ok(mut guards) = LOG_GUARDS.lock() {
            guards.push(file_guard);
        }

        let file_layer = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_timer(UtcTimeFormatter)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(file_writer)
                .with_timer(UtcTimeFormatter)
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(false)
                .boxed()
        };
        layers.push(file_layer);
    }

    if config.console_output {
        layers.push(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(UtcTimeFormatter)
                .with_target(false)
                .boxed(),
        );
    }

    Registry::default()
        .with(layers)
        .with(build_env_filter(config))
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))?;

    info!("Logging system initialized");
    info!("Log level: {}, JSON file format: {}", config.level, config.json_format);
    if config.file_output {
        info!("Log directory: {:?}", log_dir);
        cleanup_old_logs(&log_dir, config)?;
    }
    if config.level.to_lowercase().contains("trace") {
        info!("TRACE level active - dependency logs including SQL queries will be shown");
    }

    Ok(())
}

/// Keep the newest `max_files` log files written under `config.file_name`
fn cleanup_old_logs(log_dir: &Path, config: &LoggingConfig) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !path.is_file() || !filename.starts_with(&config.file_name) {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            log_files.push((path, modified));
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(config.max_files.max(1)) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove old log file {:?}: {}", path, e);
        } else {
            info!("Removed old log file: {:?}", path);
            removed += 1;
        }
    }
    Ok(removed)
}
