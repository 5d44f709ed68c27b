//! Configuration management for the dual subtitle tools.
//!
//! This module handles loading and parsing configuration from TOML files,
//! with sensible defaults for all settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory settings
    pub data: DataConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Synchronization tool settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Job scheduling settings
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Dual subtitle defaults
    #[serde(default)]
    pub dual: DualDefaults,

    /// Language detection settings
    #[serde(default)]
    pub detection: DetectionConfig,

    /// External media tools
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Data directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root data directory path
    pub root_dir: String,

    /// Scratch directory for extracted and synced tracks (relative to data directory or absolute)
    pub temp_dir: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log directory path (relative to data directory or absolute)
    pub log_dir: String,

    /// Default log level (trace, debug, info, warn, error)
    pub default_level: String,

    /// Enable console output
    pub console: bool,

    /// Enable file output
    pub file: bool,

    /// Enable JSON formatting for file logs
    pub json_format: bool,
}

/// Synchronization tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Synchronize tracks unless a request says otherwise
    pub enabled_by_default: bool,

    /// ffsubsync-compatible binary name or path
    pub tool: String,

    /// Ceiling for a single tool invocation
    pub timeout_seconds: u64,

    /// Ceiling for a single invocation while running a bulk job
    pub bulk_timeout_seconds: u64,

    /// Largest offset the tool may search for
    pub max_offset_seconds: u64,

    /// Trade accuracy for speed during bulk jobs
    pub bulk_fast_mode: bool,
}

/// Job scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Maximum jobs executing at once
    pub max_concurrent_jobs: usize,

    /// Maximum episodes of one bulk job processed at once
    pub episode_concurrency: usize,

    /// Number of recent episode durations used for the time estimate
    pub eta_window: usize,
}

/// Dual subtitle defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualDefaults {
    pub primary_language: String,
    pub secondary_language: String,

    /// Prepend "[EN] " style prefixes to every cue
    pub enable_language_prefix: bool,

    /// "top" or "bottom"
    pub primary_position: String,
    pub primary_color: Option<String>,
    pub secondary_position: String,
    pub secondary_color: Option<String>,
}

/// Language detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Minimum number of text lines before Traditional/Simplified refinement is trusted
    pub min_refinement_lines: usize,

    /// Number of cue lines sampled for text detection
    pub sample_lines: usize,
}

/// External media tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub ffmpeg: String,
    pub ffprobe: String,

    /// Ceiling for a single extraction or probe
    pub timeout_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled_by_default: true,
            tool: "ffsubsync".to_string(),
            timeout_seconds: 120,
            bulk_timeout_seconds: 90,
            max_offset_seconds: 60,
            bulk_fast_mode: true,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            episode_concurrency: 1,
            eta_window: 10,
        }
    }
}

impl Default for DualDefaults {
    fn default() -> Self {
        Self {
            primary_language: "ja".to_string(),
            secondary_language: "en".to_string(),
            enable_language_prefix: true,
            primary_position: "bottom".to_string(),
            primary_color: Some("#FFFFFF".to_string()),
            secondary_position: "top".to_string(),
            secondary_color: Some("#FFFF00".to_string()),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_refinement_lines: 50,
            sample_lines: 200,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            timeout_seconds: 300,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig {
                root_dir: "data".to_string(),
                temp_dir: "tmp".to_string(),
            },
            logging: LoggingConfig {
                log_dir: "logs".to_string(),
                default_level: "info".to_string(),
                console: true,
                file: true,
                json_format: false,
            },
            sync: SyncConfig::default(),
            jobs: JobsConfig::default(),
            dual: DualDefaults::default(),
            detection: DetectionConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// If the file doesn't exist, returns the default configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load configuration from a TOML file or create default if not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::from_file(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
            Self::default()
        })
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration saved successfully"
        );

        Ok(())
    }

    /// Get the absolute path for the data directory
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.root_dir)
    }

    /// Get the absolute path for the log directory
    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.logging.log_dir)
    }

    /// Get the absolute path for the scratch directory
    pub fn temp_dir(&self) -> PathBuf {
        self.resolve(&self.data.temp_dir)
    }

    fn resolve(&self, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir().join(path)
        }
    }
}
