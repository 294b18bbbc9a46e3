use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable console logging
    pub console_enabled: bool,
    /// Enable file logging
    pub file_enabled: bool,
    /// Log file directory
    pub log_dir: PathBuf,
    /// Log file name prefix
    pub file_prefix: String,
    /// Log rotation (daily, hourly, never)
    pub rotation: String,
    /// Enable structured JSON logging for the file layer
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_enabled: true,
            file_enabled: false,
            log_dir: PathBuf::from("logs"),
            file_prefix: "ec2-chatops".to_string(),
            rotation: "daily".to_string(),
            json_format: false,
        }
    }
}

/// Initialize logging system.
///
/// Returns the worker guard for the non-blocking file writer; it must be
/// held for the lifetime of the process or buffered log lines are dropped.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))?;

    let mut layers = Vec::new();
    let mut guard = None;

    // Console layer
    if config.console_enabled {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::NONE)
            .with_filter(env_filter.clone());

        layers.push(console_layer.boxed());
    }

    // File layer
    if config.file_enabled {
        std::fs::create_dir_all(&config.log_dir)?;

        let file_appender = match config.rotation.as_str() {
            "daily" => rolling::daily(&config.log_dir, &config.file_prefix),
            "hourly" => rolling::hourly(&config.log_dir, &config.file_prefix),
            _ => rolling::never(&config.log_dir, format!("{}.log", config.file_prefix)),
        };

        let (writer, worker_guard) = non_blocking(file_appender);
        guard = Some(worker_guard);

        let file_layer = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(env_filter.clone())
                .boxed()
        } else {
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(env_filter.clone())
                .boxed()
        };

        layers.push(file_layer);
    }

    tracing_subscriber::registry().with(layers).init();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_logging_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console_enabled);
        assert!(!config.file_enabled);
        assert_eq!(config.rotation, "daily");
    }
}
