//! Dual subtitle jobs.
//!
//! This crate drives the subtitle pipeline for single items and whole shows:
//! - Media library boundary and a filesystem implementation
//! - Single-item dual pipeline
//! - Bulk worklist planning and execution
//! - Background job scheduling with progress and cancellation

pub mod bulk;
pub mod fs_library;
pub mod library;
pub mod pipeline;
pub mod scheduler;
pub mod worklist;

// Re-export commonly used types
pub use bulk::{BulkOutcome, BulkRunner, EtaEstimator};
pub use fs_library::FsLibrary;
pub use library::{Episode, MediaLibrary, SubtitleExtractor, SubtitleSource};
pub use pipeline::{DualOptions, DualOutcome, DualPipeline, DualRequest, ErrorCategory, PipelineError};
pub use scheduler::{JobRequest, Scheduler};
pub use worklist::{BulkPlan, BulkRequest, EpisodeSettings};
