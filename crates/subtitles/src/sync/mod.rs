//! Timing synchronization through an external alignment tool.
//!
//! Synchronization is an optional quality step. Every failure mode (missing
//! tool, timeout, non-zero exit) degrades to the original track plus a
//! warning; nothing here fails a pipeline.

pub mod ffsubsync;

pub use ffsubsync::FfsubsyncTool;

use crate::codec::{self, SubtitleFormat};
use crate::cue::{Track, TrackSource};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Start offsets within this window are left alone by the fine-tune step
pub const FINE_TUNE_THRESHOLD_MS: i64 = 50;

/// Per-invocation settings
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Ceiling for one tool invocation
    pub timeout: Duration,
    pub max_offset_seconds: u64,
    /// Trade accuracy for speed, used for bulk runs
    pub fast_mode: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_offset_seconds: 60,
            fast_mode: false,
        }
    }
}

/// An external tool that rewrites `input` so its timing matches `reference`.
///
/// `reference` is either a media file or a subtitle file.
#[async_trait]
pub trait SyncTool: Send + Sync {
    fn name(&self) -> &str;

    async fn sync(&self, input: &Path, reference: &Path, output: &Path, options: &SyncOptions) -> SyncResult<()>;
}

/// Ground truth for one synchronization call
#[derive(Debug, Clone, Copy)]
pub enum SyncReference<'a> {
    /// Audio/video timing of a media file
    Media(&'a Path),
    /// A track that is already aligned
    Track(&'a Track),
}

/// How the secondary track ended up aligned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMethod {
    /// Synchronization was not requested
    Disabled,
    /// Secondary aligned to the synchronized primary
    Hybrid,
    /// Secondary aligned to the media after aligning to the primary failed
    MediaFallback,
    /// Attempted, but the secondary kept its original timing
    Unsynchronized,
}

/// What a synchronization pass did, attached to each item result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub attempted: bool,
    pub primary_synced: bool,
    pub secondary_synced: bool,
    pub method: SyncMethod,
    pub fine_tune_offset_ms: Option<i64>,
    pub warnings: Vec<String>,
}

impl SyncReport {
    pub fn disabled() -> Self {
        Self {
            attempted: false,
            primary_synced: false,
            secondary_synced: false,
            method: SyncMethod::Disabled,
            fine_tune_offset_ms: None,
            warnings: Vec::new(),
        }
    }
}

/// Primary and secondary tracks after a hybrid pass
#[derive(Debug, Clone)]
pub struct HybridOutcome {
    pub primary: Track,
    pub secondary: Track,
    pub report: SyncReport,
}

/// Adapter around a [`SyncTool`] that owns scratch files, timeouts and fallback
#[derive(Clone)]
pub struct Synchronizer {
    tool: Arc<dyn SyncTool>,
    work_dir: PathBuf,
    options: SyncOptions,
}

impl Synchronizer {
    pub fn new(tool: Arc<dyn SyncTool>, work_dir: impl Into<PathBuf>, options: SyncOptions) -> Self {
        Self {
            tool,
            work_dir: work_dir.into(),
            options,
        }
    }

    /// Same tool and scratch directory with different settings
    pub fn with_options(&self, options: SyncOptions) -> Self {
        Self {
            options,
            ..self.clone()
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Align `target` to `reference`, returning a new track.
    ///
    /// The invocation is bounded by the configured timeout; on expiry the tool
    /// future is dropped, which kills the child process.
    pub async fn synchronize(&self, target: &Track, reference: SyncReference<'_>) -> SyncResult<Track> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let work_dir = self.work_dir.clone();
        let scratch = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix("sync-").tempdir_in(work_dir)
        })
        .await
        .map_err(std::io::Error::other)??;

        let input = scratch.path().join("input.srt");
        let output = scratch.path().join("output.srt");
        tokio::fs::write(&input, codec::serialize(target, SubtitleFormat::Srt)?).await?;

        let reference_path = match reference {
            SyncReference::Media(path) => path.to_path_buf(),
            SyncReference::Track(track) => {
                let path = scratch.path().join("reference.srt");
                tokio::fs::write(&path, codec::serialize(track, SubtitleFormat::Srt)?).await?;
                path
            }
        };

        let call = self.tool.sync(&input, &reference_path, &output, &self.options);
        match tokio::time::timeout(self.options.timeout, call).await {
            Ok(result) => result?,
            Err(_) => return Err(SyncError::Timeout(self.options.timeout)),
        }

        let bytes = tokio::fs::read(&output).await?;
        let synced = codec::parse(&bytes, Some(SubtitleFormat::Srt), TrackSource::Generated)?;
        debug!(
            tool = self.tool.name(),
            cues = synced.len(),
            "Synchronized track"
        );
        Ok(target.with_cues(synced.into_cues()))
    }

    /// Like [`Synchronizer::synchronize`], falling back to the original track and a warning
    pub async fn synchronize_or_original(&self, target: &Track, reference: SyncReference<'_>) -> (Track, Option<String>) {
        match self.synchronize(target, reference).await {
            Ok(track) => (track, None),
            Err(e) => {
                warn!(error = %e, "Synchronization failed, keeping original timing");
                (target.clone(), Some(e.to_string()))
            }
        }
    }

    /// Hybrid synchronization of a primary/secondary pair.
    ///
    /// The primary is aligned to the media; the secondary is aligned to the
    /// aligned primary. Without media the primary keeps its timing.
    pub async fn hybrid(&self, primary: &Track, secondary: &Track, media: Option<&Path>) -> HybridOutcome {
        let mut report = SyncReport {
            attempted: true,
            method: SyncMethod::Unsynchronized,
            ..SyncReport::disabled()
        };

        let primary_synced = match media {
            Some(media) => match self.synchronize(primary, SyncReference::Media(media)).await {
                Ok(track) => {
                    report.primary_synced = true;
                    track
                }
                Err(e) => {
                    warn!(error = %e, "Primary synchronization failed, keeping original timing");
                    report.warnings.push(format!("primary sync failed: {e}"));
                    primary.clone()
                }
            },
            None => {
                report
                    .warnings
                    .push("no media reference, primary timing kept".to_string());
                primary.clone()
            }
        };

        let secondary_synced = match self
            .synchronize(secondary, SyncReference::Track(&primary_synced))
            .await
        {
            Ok(track) => {
                report.secondary_synced = true;
                report.method = SyncMethod::Hybrid;
                Some(track)
            }
            Err(e) => {
                warn!(error = %e, "Secondary synchronization against primary failed");
                report.warnings.push(format!("secondary sync to primary failed: {e}"));
                None
            }
        };

        let secondary_synced = match (secondary_synced, media) {
            (Some(track), _) => track,
            (None, Some(media)) if report.primary_synced => {
                match self.synchronize(secondary, SyncReference::Media(media)).await {
                    Ok(track) => {
                        report.secondary_synced = true;
                        report.method = SyncMethod::MediaFallback;
                        track
                    }
                    Err(e) => {
                        report.warnings.push(format!("secondary sync to media failed: {e}"));
                        secondary.clone()
                    }
                }
            }
            (None, _) => secondary.clone(),
        };

        let secondary_final = if report.secondary_synced {
            let (track, offset) = fine_tune(&primary_synced, &secondary_synced);
            report.fine_tune_offset_ms = offset;
            track
        } else {
            secondary_synced
        };

        info!(
            primary_synced = report.primary_synced,
            secondary_synced = report.secondary_synced,
            method = ?report.method,
            "Hybrid synchronization finished"
        );

        HybridOutcome {
            primary: primary_synced,
            secondary: secondary_final,
            report,
        }
    }
}

/// Shift `secondary` so its first cue starts with the primary's first cue.
///
/// Returns the applied offset, or `None` when the starts already agree within
/// [`FINE_TUNE_THRESHOLD_MS`].
pub fn fine_tune(primary: &Track, secondary: &Track) -> (Track, Option<i64>) {
    match (primary.first_start_ms(), secondary.first_start_ms()) {
        (Some(p), Some(s)) if (p - s).abs() > FINE_TUNE_THRESHOLD_MS => {
            let offset = p.saturating_sub(s);
            debug!(offset_ms = offset, "Fine-tuning secondary start");
            (secondary.shifted(offset), Some(offset))
        }
        _ => (secondary.clone(), None),
    }
}
