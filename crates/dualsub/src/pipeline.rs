//! Single-item dual subtitle pipeline.
//!
//! Load both sources, identify languages where the source does not declare
//! one, synchronize (optional), merge, write. Synchronization problems only
//! add warnings; everything else is returned as a [`PipelineError`] and the
//! caller decides whether it is fatal.

use crate::library::{SubtitleExtractor, SubtitleSource};
use serde::Serialize;
use shared::models::SucceededItem;
use shared::paths::{self, LanguagePair};
use std::path::PathBuf;
use std::sync::Arc;
use subtitles::language::same_language;
use subtitles::{codec, merge, CodecError, LanguageIdentifier, MergeConfig, Slot, SubtitleFormat, SyncReport, Synchronizer, Track, TrackSource};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Per-item switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DualOptions {
    pub sync: bool,
    pub language_prefix: bool,
    /// Replace an existing dual subtitle for the same pair
    pub overwrite: bool,
}

impl Default for DualOptions {
    fn default() -> Self {
        Self {
            sync: true,
            language_prefix: true,
            overwrite: false,
        }
    }
}

/// Everything needed to produce one dual subtitle
#[derive(Debug, Clone)]
pub struct DualRequest {
    pub item_id: String,
    pub label: String,
    pub primary: SubtitleSource,
    pub secondary: SubtitleSource,
    pub pair: LanguagePair,
    /// Timing reference for synchronization; required for embedded sources
    pub media_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub base_name: String,
    pub options: DualOptions,
}

impl DualRequest {
    pub fn output_path(&self) -> PathBuf {
        paths::dual_subtitle_path(&self.output_dir, &self.base_name, &self.pair)
    }

    fn source(&self, slot: Slot) -> &SubtitleSource {
        match slot {
            Slot::Primary => &self.primary,
            Slot::Secondary => &self.secondary,
        }
    }

    fn language(&self, slot: Slot) -> &str {
        match slot {
            Slot::Primary => &self.pair.primary,
            Slot::Secondary => &self.pair.secondary,
        }
    }
}

/// A dual subtitle that was written
#[derive(Debug, Clone, Serialize)]
pub struct DualOutcome {
    pub output_path: PathBuf,
    pub cue_count: usize,
    pub used_embedded: bool,
    pub sync_report: SyncReport,
    pub warnings: Vec<String>,
}

impl DualOutcome {
    pub fn into_item(self, item_id: impl Into<String>, label: impl Into<String>) -> SucceededItem {
        SucceededItem {
            item_id: item_id.into(),
            label: label.into(),
            output_path: self.output_path,
            cue_count: self.cue_count,
            used_embedded: self.used_embedded,
            warnings: self.warnings,
        }
    }
}

/// Where a failure belongs in the error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad request; fatal to the job
    Orchestration,
    /// Unusable input for this item only
    Input,
    /// Output for the pair is already present
    Conflict,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("cannot read {slot} subtitle ({source_desc}): {message}")]
    Source {
        slot: Slot,
        source_desc: String,
        message: String,
    },

    #[error("failed to parse {slot} subtitle: {source}")]
    Parse {
        slot: Slot,
        #[source]
        source: CodecError,
    },

    #[error("{slot} subtitle has no cues")]
    EmptyTrack { slot: Slot },

    #[error("dual subtitle already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("failed to serialize dual subtitle: {0}")]
    Output(#[source] CodecError),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::InvalidRequest(_) => ErrorCategory::Orchestration,
            PipelineError::AlreadyExists { .. } => ErrorCategory::Conflict,
            _ => ErrorCategory::Input,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Produces dual subtitles; cheap to clone
#[derive(Clone)]
pub struct DualPipeline {
    extractor: Arc<dyn SubtitleExtractor>,
    synchronizer: Synchronizer,
    identifier: LanguageIdentifier,
    merge: MergeConfig,
}

impl DualPipeline {
    pub fn new(
        extractor: Arc<dyn SubtitleExtractor>,
        synchronizer: Synchronizer,
        identifier: LanguageIdentifier,
        merge: MergeConfig,
    ) -> Self {
        Self {
            extractor,
            synchronizer,
            identifier,
            merge,
        }
    }

    /// Same pipeline with a differently configured synchronizer
    pub fn with_synchronizer(&self, synchronizer: Synchronizer) -> Self {
        Self {
            synchronizer,
            ..self.clone()
        }
    }

    pub async fn run(&self, request: &DualRequest) -> PipelineResult<DualOutcome> {
        validate(request)?;

        let output_path = request.output_path();
        if !request.options.overwrite {
            if let Some(path) = existing_output(request).await {
                return Err(PipelineError::AlreadyExists { path });
            }
        }

        info!(
            item = %request.label,
            pair = %request.pair,
            primary = %request.primary,
            secondary = %request.secondary,
            "Creating dual subtitle"
        );

        let mut warnings = Vec::new();
        let primary = self.load(request, Slot::Primary, &mut warnings).await?;
        let secondary = self.load(request, Slot::Secondary, &mut warnings).await?;

        let (primary, secondary, sync_report) = if request.options.sync {
            let outcome = self
                .synchronizer
                .hybrid(&primary, &secondary, request.media_path.as_deref())
                .await;
            warnings.extend(outcome.report.warnings.iter().cloned());
            (outcome.primary, outcome.secondary, outcome.report)
        } else {
            (primary, secondary, SyncReport::disabled())
        };

        let config = MergeConfig {
            language_prefix: request.options.language_prefix,
            ..self.merge.clone()
        };
        let dual = merge(&primary, &secondary, &config);
        let bytes = codec::serialize(&dual, SubtitleFormat::Srt).map_err(PipelineError::Output)?;

        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .map_err(|source| PipelineError::Write {
                path: request.output_dir.clone(),
                source,
            })?;
        tokio::fs::write(&output_path, bytes)
            .await
            .map_err(|source| PipelineError::Write {
                path: output_path.clone(),
                source,
            })?;

        info!(
            item = %request.label,
            output = %output_path.display(),
            cues = dual.len(),
            warnings = warnings.len(),
            "Dual subtitle written"
        );

        Ok(DualOutcome {
            output_path,
            cue_count: dual.len(),
            used_embedded: request.primary.is_embedded() || request.secondary.is_embedded(),
            sync_report,
            warnings,
        })
    }

    /// Read, parse and label one slot's track
    async fn load(&self, request: &DualRequest, slot: Slot, warnings: &mut Vec<String>) -> PipelineResult<Track> {
        let source = request.source(slot);
        let source_error = |message: String| PipelineError::Source {
            slot,
            source_desc: source.to_string(),
            message,
        };

        let (bytes, track_source) = match source {
            SubtitleSource::External { path, .. } => {
                let bytes = tokio::fs::read(path).await.map_err(|e| source_error(e.to_string()))?;
                (bytes, TrackSource::External { path: path.clone() })
            }
            SubtitleSource::Embedded {
                stream_index, codec, ..
            } => {
                let media = request
                    .media_path
                    .as_deref()
                    .ok_or_else(|| source_error("embedded stream without a media file".to_string()))?;
                let bytes = self
                    .extractor
                    .extract(media, *stream_index, codec)
                    .await
                    .map_err(|e| source_error(format!("{e:#}")))?;
                (
                    bytes,
                    TrackSource::Embedded {
                        stream_index: *stream_index,
                        codec: codec.clone(),
                    },
                )
            }
        };

        let track = codec::parse(&bytes, source.format_hint(), track_source)
            .map_err(|source| PipelineError::Parse { slot, source })?;
        if track.is_empty() {
            return Err(PipelineError::EmptyTrack { slot });
        }

        let requested = request.language(slot);
        if source.language().is_none() {
            let found = self.identifier.identify_track(&source.file_name(), &track);
            match found.language {
                Some(detected) if !same_language(&detected, requested) => {
                    warn!(
                        slot = %slot,
                        requested,
                        detected = %detected,
                        "Detected language differs from requested language"
                    );
                    warnings.push(format!(
                        "{slot} subtitle looks like '{detected}', not '{requested}'"
                    ));
                }
                detected => debug!(slot = %slot, detected = ?detected, "Language identified"),
            }
        }

        Ok(track.with_language(requested))
    }
}

fn validate(request: &DualRequest) -> PipelineResult<()> {
    if request.pair.is_degenerate() {
        return Err(PipelineError::InvalidRequest(format!(
            "primary and secondary language are both '{}'",
            request.pair.primary
        )));
    }
    if request.primary.same_source(&request.secondary) {
        return Err(PipelineError::InvalidRequest(format!(
            "primary and secondary use the same source: {}",
            request.primary
        )));
    }
    Ok(())
}

/// An existing dual subtitle for the pair in either order.
///
/// Matches the directory listing with the same rule the worklist uses, so
/// case differences and the dotted `dual.a.b` form count too.
async fn existing_output(request: &DualRequest) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(&request.output_dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if paths::is_dual_for_pair(&name, &request.base_name, &request.pair) {
            return Some(entry.path());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::path::Path;
    use subtitles::{SyncError, SyncOptions, SyncTool};
    use tempfile::TempDir;

    struct NoExtractor;

    #[async_trait]
    impl SubtitleExtractor for NoExtractor {
        async fn extract(&self, _media_path: &Path, _stream_index: u32, _codec: &str) -> Result<Vec<u8>> {
            anyhow::bail!("no extractor in tests")
        }
    }

    struct StaticExtractor(&'static str);

    #[async_trait]
    impl SubtitleExtractor for StaticExtractor {
        async fn extract(&self, _media_path: &Path, _stream_index: u32, _codec: &str) -> Result<Vec<u8>> {
            Ok(self.0.as_bytes().to_vec())
        }
    }

    struct MissingTool;

    #[async_trait]
    impl SyncTool for MissingTool {
        fn name(&self) -> &str {
            "missing"
        }

        async fn sync(
            &self,
            _input: &Path,
            _reference: &Path,
            _output: &Path,
            _options: &SyncOptions,
        ) -> subtitles::error::SyncResult<()> {
            Err(SyncError::ToolMissing {
                tool: "missing".to_string(),
            })
        }
    }

    fn pipeline(dir: &TempDir, extractor: Arc<dyn SubtitleExtractor>) -> DualPipeline {
        let synchronizer = Synchronizer::new(Arc::new(MissingTool), dir.path().join("scratch"), SyncOptions::default());
        DualPipeline::new(extractor, synchronizer, LanguageIdentifier::default(), MergeConfig::default())
    }

    fn srt(lines: &[(&str, &str, &str)]) -> String {
        lines
            .iter()
            .enumerate()
            .map(|(i, (start, end, text))| format!("{}\n{start} --> {end}\n{text}\n\n", i + 1))
            .collect()
    }

    fn request(dir: &TempDir, primary: SubtitleSource, secondary: SubtitleSource) -> DualRequest {
        DualRequest {
            item_id: "ep1".to_string(),
            label: "S01E01".to_string(),
            primary,
            secondary,
            pair: LanguagePair::new("en", "ja"),
            media_path: None,
            output_dir: dir.path().to_path_buf(),
            base_name: "Show.S01E01".to_string(),
            options: DualOptions {
                sync: false,
                ..DualOptions::default()
            },
        }
    }

    fn external(dir: &TempDir, name: &str, contents: &str, language: Option<&str>) -> Result<SubtitleSource> {
        let path = dir.path().join(name);
        std::fs::write(&path, contents)?;
        Ok(SubtitleSource::External {
            path,
            language: language.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn test_creates_dual_subtitle() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let primary = external(
            &temp_dir,
            "Show.S01E01.en.srt",
            &srt(&[("00:00:01,000", "00:00:02,000", "Hello"), ("00:00:03,000", "00:00:04,000", "Bye")]),
            Some("en"),
        )?;
        let secondary = external(
            &temp_dir,
            "Show.S01E01.ja.srt",
            &srt(&[("00:00:01,100", "00:00:02,000", "こんにちは")]),
            Some("ja"),
        )?;

        let outcome = pipeline(&temp_dir, Arc::new(NoExtractor))
            .run(&request(&temp_dir, primary, secondary))
            .await?;

        assert_eq!(outcome.cue_count, 3);
        assert!(!outcome.used_embedded);
        assert_eq!(outcome.output_path, temp_dir.path().join("Show.S01E01.dual.en-ja.srt"));

        let written = std::fs::read_to_string(&outcome.output_path)?;
        assert!(written.contains("[EN] Hello"));
        assert!(written.contains("[JA] こんにちは"));
        Ok(())
    }

    #[tokio::test]
    async fn test_existing_output_is_a_conflict() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let body = srt(&[("00:00:01,000", "00:00:02,000", "Hello")]);
        let primary = external(&temp_dir, "a.en.srt", &body, Some("en"))?;
        let secondary = external(&temp_dir, "a.ja.srt", &body, Some("ja"))?;
        std::fs::write(temp_dir.path().join("Show.S01E01.dual.ja-en.srt"), &body)?;

        let pipeline = pipeline(&temp_dir, Arc::new(NoExtractor));
        let mut req = request(&temp_dir, primary, secondary);
        let err = pipeline.run(&req).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Conflict);

        req.options.overwrite = true;
        assert!(pipeline.run(&req).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_conflict_check_agrees_with_worklist_naming() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let body = srt(&[("00:00:01,000", "00:00:02,000", "Hello")]);
        let primary = external(&temp_dir, "a.en.srt", &body, Some("en"))?;
        let secondary = external(&temp_dir, "a.ja.srt", &body, Some("ja"))?;
        let pipeline = pipeline(&temp_dir, Arc::new(NoExtractor));
        let req = request(&temp_dir, primary, secondary);

        for existing in ["show.s01e01.DUAL.JA-EN.srt", "Show.S01E01.dual.en.ja.ass"] {
            let path = temp_dir.path().join(existing);
            std::fs::write(&path, &body)?;
            assert!(paths::has_existing_dual([existing], &req.base_name, &req.pair));

            match pipeline.run(&req).await {
                Err(PipelineError::AlreadyExists { path: found }) => assert_eq!(found, path),
                other => panic!("expected a conflict for {existing}, got {other:?}"),
            }
            std::fs::remove_file(&path)?;
        }

        assert!(pipeline.run(&req).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_requests() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let body = srt(&[("00:00:01,000", "00:00:02,000", "Hello")]);
        let source = external(&temp_dir, "a.en.srt", &body, Some("en"))?;
        let pipeline = pipeline(&temp_dir, Arc::new(NoExtractor));

        let same = request(&temp_dir, source.clone(), source.clone());
        let err = pipeline.run(&same).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Orchestration);

        let other = external(&temp_dir, "a.ja.srt", &body, Some("ja"))?;
        let mut degenerate = request(&temp_dir, source, other);
        degenerate.pair = LanguagePair::new("en", "EN");
        assert!(matches!(
            pipeline.run(&degenerate).await,
            Err(PipelineError::InvalidRequest(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_input_errors() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let good = external(
            &temp_dir,
            "a.en.srt",
            &srt(&[("00:00:01,000", "00:00:02,000", "Hello")]),
            Some("en"),
        )?;
        let broken = external(
            &temp_dir,
            "a.ja.srt",
            &srt(&[("00:00:05,000", "00:00:04,000", "backwards")]),
            Some("ja"),
        )?;
        let empty = external(&temp_dir, "b.ja.srt", "", Some("ja"))?;
        let pipeline = pipeline(&temp_dir, Arc::new(NoExtractor));

        let err = pipeline
            .run(&request(&temp_dir, good.clone(), broken))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Parse { slot: Slot::Secondary, .. }));
        assert_eq!(err.category(), ErrorCategory::Input);

        let err = pipeline.run(&request(&temp_dir, good.clone(), empty)).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyTrack { slot: Slot::Secondary }));

        let missing = SubtitleSource::External {
            path: temp_dir.path().join("nope.srt"),
            language: None,
        };
        let err = pipeline.run(&request(&temp_dir, missing, good)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Source { slot: Slot::Primary, .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_embedded_source_and_sync_warnings() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let extractor = Arc::new(StaticExtractor(
            "[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n\
             Dialogue: 0,0:00:01.00,0:00:02.00,Default,,0,0,0,,こんにちは\n",
        ));
        let primary = external(
            &temp_dir,
            "Show.S01E01.en.srt",
            &srt(&[("00:00:01,000", "00:00:02,000", "Hello")]),
            Some("en"),
        )?;
        let secondary = SubtitleSource::Embedded {
            stream_index: 3,
            codec: "ass".to_string(),
            language: Some("ja".to_string()),
        };

        let mut req = request(&temp_dir, primary, secondary);
        req.media_path = Some(temp_dir.path().join("Show.S01E01.mkv"));
        req.options.sync = true;

        let outcome = pipeline(&temp_dir, extractor).run(&req).await?;
        assert!(outcome.used_embedded);
        assert_eq!(outcome.cue_count, 2);
        assert!(outcome.sync_report.attempted);
        assert!(!outcome.sync_report.primary_synced);
        assert!(!outcome.warnings.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_embedded_without_media_is_input_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let primary = external(
            &temp_dir,
            "a.en.srt",
            &srt(&[("00:00:01,000", "00:00:02,000", "Hello")]),
            Some("en"),
        )?;
        let secondary = SubtitleSource::Embedded {
            stream_index: 3,
            codec: "subrip".to_string(),
            language: Some("ja".to_string()),
        };

        let err = pipeline(&temp_dir, Arc::new(StaticExtractor("")))
            .run(&request(&temp_dir, primary, secondary))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Source { slot: Slot::Secondary, .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_language_mismatch_warns() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let primary = external(
            &temp_dir,
            "a.srt",
            &srt(&[("00:00:01,000", "00:00:02,000", "これは日本語のテキストです")]),
            None,
        )?;
        let secondary = external(
            &temp_dir,
            "b.ja.srt",
            &srt(&[("00:00:01,000", "00:00:02,000", "こんにちは")]),
            Some("ja"),
        )?;

        let mut req = request(&temp_dir, primary, secondary);
        req.pair = LanguagePair::new("en", "ja");
        let outcome = pipeline(&temp_dir, Arc::new(NoExtractor)).run(&req).await?;
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("'ja'"));
        Ok(())
    }
}
