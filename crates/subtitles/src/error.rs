//! Error types for subtitle parsing and synchronization

use crate::codec::SubtitleFormat;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while decoding, parsing or serializing subtitles
#[derive(Error, Debug)]
pub enum CodecError {
    /// Malformed content at a given line (1-based)
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A cue whose end is not strictly after its start
    #[error("Invalid time range at line {line}: end {end_ms} ms is not after start {start_ms} ms")]
    InvalidRange {
        line: usize,
        start_ms: i64,
        end_ms: i64,
    },

    /// Bytes that no candidate encoding decodes cleanly
    #[error("Undecodable subtitle bytes at offset {offset} (best guess: {encoding})")]
    Encoding { offset: usize, encoding: String },

    /// Output was requested in a format that is read-only
    #[error("Unsupported output format: {0}")]
    UnsupportedOutput(SubtitleFormat),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        CodecError::Parse {
            line,
            message: message.into(),
        }
    }
}

/// Errors raised by the external synchronization tool.
///
/// None of these are fatal to a pipeline: callers fall back to the
/// unsynchronized track and record the error as a warning.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Synchronization tool not found: {tool}")]
    ToolMissing { tool: String },

    #[error("Synchronization timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Synchronization tool exited with code {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("Synchronization tool produced no output at {path}")]
    MissingOutput { path: PathBuf },

    #[error("Synchronized output could not be read: {0}")]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Result type alias for synchronization operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;
