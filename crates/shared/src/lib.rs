//! Shared library for the dual subtitle tools.
//!
//! This crate provides common functionality used across the workspace:
//! - Configuration management
//! - Logging infrastructure
//! - Job models and the in-memory job store
//! - Output file naming conventions

pub mod config;
pub mod logging;
pub mod models;
pub mod paths;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use logging::LogConfig;
pub use models::*;
pub use paths::LanguagePair;
pub use store::{CancelToken, JobStore, StoreError};

/// Common result type using anyhow::Error
pub type Result<T> = anyhow::Result<T>;
