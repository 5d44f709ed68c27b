//! Subtitle processing for dual subtitle synthesis.
//!
//! This crate knows nothing about jobs or media libraries:
//! - Cue and track model
//! - Format codec (SubRip, WebVTT, SubStation Alpha in; SubRip out)
//! - Language identification
//! - Timing synchronization through an external tool
//! - Dual track merging

pub mod codec;
pub mod cue;
pub mod error;
pub mod language;
pub mod merge;
pub mod sync;

// Re-export commonly used types
pub use codec::SubtitleFormat;
pub use cue::{Cue, CueStyle, Position, Track, TrackSource};
pub use error::{CodecError, SyncError};
pub use language::{Confidence, Identification, LanguageIdentifier};
pub use merge::{merge, MergeConfig, Slot, SlotStyle};
pub use sync::{FfsubsyncTool, HybridOutcome, SyncOptions, SyncReference, SyncReport, SyncTool, Synchronizer};
