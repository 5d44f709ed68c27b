//! File naming conventions for dual subtitle output.
//!
//! Output files sit next to the video they belong to and encode both languages
//! in primary-secondary order, e.g. `Show.S01E02.dual.ja-en.srt`. Whether a pair
//! already exists is decided from a directory listing alone.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Subtitle file extensions recognized as sidecar tracks
pub const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "vtt"];

/// Video file extensions recognized as episodes
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "m4v", "mov", "webm"];

/// Marker segment identifying a dual subtitle file
pub const DUAL_MARKER: &str = "dual";

/// Extension of every file the tools write
pub const OUTPUT_EXTENSION: &str = "srt";

/// An ordered (primary, secondary) language pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguagePair {
    pub primary: String,
    pub secondary: String,
}

impl LanguagePair {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    /// Same two languages, in either order
    pub fn matches_unordered(&self, other: &LanguagePair) -> bool {
        let same = self.primary.eq_ignore_ascii_case(&other.primary)
            && self.secondary.eq_ignore_ascii_case(&other.secondary);
        let swapped = self.primary.eq_ignore_ascii_case(&other.secondary)
            && self.secondary.eq_ignore_ascii_case(&other.primary);
        same || swapped
    }

    /// Both slots name the same language
    pub fn is_degenerate(&self) -> bool {
        self.primary.eq_ignore_ascii_case(&self.secondary)
    }

    pub fn swapped(&self) -> Self {
        Self::new(self.secondary.clone(), self.primary.clone())
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.primary, self.secondary)
    }
}

/// File name of the dual subtitle for `base_name` (a video file stem)
pub fn dual_subtitle_filename(base_name: &str, pair: &LanguagePair) -> String {
    format!(
        "{}.{}.{}-{}.{}",
        base_name, DUAL_MARKER, pair.primary, pair.secondary, OUTPUT_EXTENSION
    )
}

/// Full output path of the dual subtitle for `base_name` inside `dir`
pub fn dual_subtitle_path(dir: impl AsRef<Path>, base_name: &str, pair: &LanguagePair) -> PathBuf {
    dir.as_ref().join(dual_subtitle_filename(base_name, pair))
}

/// Check whether `filename` is a dual subtitle of `base_name` for `pair`, in either order.
///
/// Both the `dual.a-b.ext` form written by these tools and the older
/// `dual.a.b.ext` form are recognized.
pub fn is_dual_for_pair(filename: &str, base_name: &str, pair: &LanguagePair) -> bool {
    let Some(rest) = strip_prefix_ignore_case(filename, base_name) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix('.') else {
        return false;
    };
    let Some((middle, extension)) = rest.rsplit_once('.') else {
        return false;
    };
    if !has_subtitle_extension(extension) {
        return false;
    }

    [pair.clone(), pair.swapped()].iter().any(|candidate| {
        let dashed = format!("{}.{}-{}", DUAL_MARKER, candidate.primary, candidate.secondary);
        let dotted = format!("{}.{}.{}", DUAL_MARKER, candidate.primary, candidate.secondary);
        middle.eq_ignore_ascii_case(&dashed) || middle.eq_ignore_ascii_case(&dotted)
    })
}

/// Check a directory listing for an existing dual subtitle covering `pair`
pub fn has_existing_dual<'a, I>(filenames: I, base_name: &str, pair: &LanguagePair) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    filenames
        .into_iter()
        .any(|name| is_dual_for_pair(name, base_name, pair))
}

/// Check whether a file stem carries the dual marker as one of its dot segments
pub fn is_dual_stem(stem: &str) -> bool {
    stem.split('.')
        .any(|part| part.eq_ignore_ascii_case(DUAL_MARKER))
}

pub fn has_subtitle_extension(extension: &str) -> bool {
    SUBTITLE_EXTENSIONS
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(extension))
}

pub fn has_video_extension(extension: &str) -> bool {
    VIDEO_EXTENSIONS
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(extension))
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if value.len() < prefix.len() || !value.is_char_boundary(prefix.len()) {
        return None;
    }
    let (head, tail) = value.split_at(prefix.len());
    head.eq_ignore_ascii_case(prefix).then_some(tail)
}
