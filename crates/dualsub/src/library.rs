//! Media library boundary.
//!
//! The library is a read-only catalog: it lists the episodes of a show with
//! the subtitle sources each one offers, and extracts embedded streams on
//! request. Browsing and metadata live elsewhere.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::paths::{self, LanguagePair};
use std::path::{Path, PathBuf};
use subtitles::language::same_language;
use subtitles::SubtitleFormat;

/// A subtitle source before it is parsed into a track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubtitleSource {
    /// Stream inside the media container; needs extraction
    Embedded {
        stream_index: u32,
        codec: String,
        language: Option<String>,
    },
    /// Standalone subtitle file
    External {
        path: PathBuf,
        language: Option<String>,
    },
}

impl SubtitleSource {
    pub fn language(&self) -> Option<&str> {
        match self {
            SubtitleSource::Embedded { language, .. } | SubtitleSource::External { language, .. } => {
                language.as_deref()
            }
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self, SubtitleSource::Embedded { .. })
    }

    pub fn format_hint(&self) -> Option<SubtitleFormat> {
        match self {
            SubtitleSource::Embedded { codec, .. } => SubtitleFormat::from_codec(codec),
            SubtitleSource::External { path, .. } => SubtitleFormat::from_path(path),
        }
    }

    /// Filename used for language hints; embedded streams have none
    pub fn file_name(&self) -> String {
        match self {
            SubtitleSource::Embedded { stream_index, codec, .. } => format!("stream{stream_index}.{codec}"),
            SubtitleSource::External { path, .. } => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        }
    }

    /// Both refer to the same underlying subtitle
    pub fn same_source(&self, other: &SubtitleSource) -> bool {
        match (self, other) {
            (
                SubtitleSource::Embedded { stream_index: a, .. },
                SubtitleSource::Embedded { stream_index: b, .. },
            ) => a == b,
            (SubtitleSource::External { path: a, .. }, SubtitleSource::External { path: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Display for SubtitleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubtitleSource::Embedded { stream_index, codec, .. } => {
                write!(f, "embedded stream {stream_index} ({codec})")
            }
            SubtitleSource::External { path, .. } => write!(f, "{}", path.display()),
        }
    }
}

/// One episode (or movie) with everything needed to plan dual subtitle work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    /// Display label, `S01E02: Title` style when known
    pub label: String,
    pub media_path: Option<PathBuf>,
    /// Directory the dual subtitle is written to
    pub output_dir: PathBuf,
    /// Stem shared by the media file and its subtitles
    pub base_name: String,
    pub subtitles: Vec<SubtitleSource>,
    /// File names present in `output_dir`
    pub sibling_files: Vec<String>,
}

impl Episode {
    /// Best source for `language`; external files win over embedded streams
    pub fn source_for(&self, language: &str) -> Option<&SubtitleSource> {
        let matching = |s: &&SubtitleSource| s.language().is_some_and(|l| same_language(l, language));
        self.subtitles
            .iter()
            .filter(matching)
            .find(|s| !s.is_embedded())
            .or_else(|| self.subtitles.iter().find(matching))
    }

    pub fn has_language(&self, language: &str) -> bool {
        self.source_for(language).is_some()
    }

    /// Path of an existing dual subtitle for `pair`, in either order
    pub fn existing_dual(&self, pair: &LanguagePair) -> Option<PathBuf> {
        self.sibling_files
            .iter()
            .find(|name| paths::is_dual_for_pair(name, &self.base_name, pair))
            .map(|name| self.output_dir.join(name))
    }

    pub fn output_path(&self, pair: &LanguagePair) -> PathBuf {
        paths::dual_subtitle_path(&self.output_dir, &self.base_name, pair)
    }
}

/// Catalog of shows and their episodes
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// All episodes of a show, in playback order
    async fn show_episodes(&self, show_id: &str) -> Result<Vec<Episode>>;
}

/// Pulls an embedded subtitle stream out of a media file
#[async_trait]
pub trait SubtitleExtractor: Send + Sync {
    async fn extract(&self, media_path: &Path, stream_index: u32, codec: &str) -> Result<Vec<u8>>;
}
