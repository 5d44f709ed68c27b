//! Logging infrastructure for the dual subtitle tools.
//!
//! Console output for the operator, plus a daily-rotated log file that can be
//! switched to JSON for machine consumption.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log directory path
    pub log_dir: String,
    /// Component name (used for log file naming)
    pub component: String,
    /// Default log level
    pub default_level: Level,
    /// Enable console output
    pub console: bool,
    /// Enable file output
    pub file: bool,
    /// Enable JSON formatting for file logs
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: "data/logs".to_string(),
            component: "dualsub".to_string(),
            default_level: Level::INFO,
            console: true,
            file: true,
            json_format: false,
        }
    }
}

impl LogConfig {
    /// Build a log configuration from the `[logging]` section of the config file
    pub fn from_config(config: &crate::Config, component: &str, verbose: bool) -> Self {
        let default_level = if verbose {
            Level::DEBUG
        } else {
            parse_level(&config.logging.default_level)
        };

        Self {
            log_dir: config.log_dir().to_string_lossy().to_string(),
            component: component.to_string(),
            default_level,
            console: config.logging.console,
            file: config.logging.file,
            json_format: config.logging.json_format,
        }
    }

    /// Filter directive used when `RUST_LOG` is not set
    fn default_directive(&self) -> String {
        let component = self.component.replace('-', "_");
        format!(
            "{}={level},shared={level},subtitles={level},dualsub={level}",
            component,
            level = self.default_level
        )
    }
}

/// Parse a configured level name, falling back to INFO
pub fn parse_level(name: &str) -> Level {
    name.trim().parse().unwrap_or(Level::INFO)
}

/// Initialize logging with the given configuration
///
/// Sets up tracing with:
/// - Daily file rotation
/// - Structured logging with contextual fields
/// - Crate-specific log levels, overridable via RUST_LOG
/// - Optional JSON formatting
pub fn init(config: LogConfig) -> Result<()> {
    let log_dir = Path::new(&config.log_dir);
    if config.file {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", config.log_dir))?;
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));

    let mut layers = Vec::new();

    if config.console {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_span_events(FmtSpan::NONE)
            .with_writer(std::io::stderr)
            .boxed();
        layers.push(console_layer);
    }

    if config.file {
        let file_appender = tracing_appender::rolling::daily(log_dir, &config.component);

        let file_layer = if config.json_format {
            fmt::layer()
                .json()
                .with_target(true)
                .with_level(true)
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(file_appender)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(file_appender)
                .boxed()
        };

        layers.push(file_layer);
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::info!(
        component = %config.component,
        log_dir = %config.log_dir,
        "Logging initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config() {
        let config = LogConfig::default();
        assert_eq!(config.component, "dualsub");
        assert_eq!(config.default_level, Level::INFO);
        assert!(config.console);
        assert!(config.file);
    }

    #[test]
    fn test_from_config_verbose_overrides_level() {
        let config = crate::Config::default();

        let quiet = LogConfig::from_config(&config, "dualsub", false);
        assert_eq!(quiet.default_level, Level::INFO);

        let verbose = LogConfig::from_config(&config, "dualsub", true);
        assert_eq!(verbose.default_level, Level::DEBUG);
        assert!(verbose.log_dir.ends_with("logs"));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level(" WARN "), Level::WARN);
        assert_eq!(parse_level("nonsense"), Level::INFO);
    }

    #[test]
    fn test_default_directive_covers_workspace_crates() {
        let config = LogConfig {
            component: "dual-sub".to_string(),
            default_level: Level::WARN,
            ..Default::default()
        };
        let directive = config.default_directive();
        assert!(directive.starts_with("dual_sub=WARN"));
        assert!(directive.contains("subtitles=WARN"));
    }
}
