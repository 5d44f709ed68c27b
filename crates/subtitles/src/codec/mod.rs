//! Subtitle format codec.
//!
//! Parses SubRip, WebVTT and (Advanced) SubStation Alpha into [`Track`]s and
//! writes SubRip. Output is deliberately limited to SubRip, which every player
//! understands.

pub mod ass;
pub mod encoding;
pub mod srt;
pub mod time;
pub mod vtt;

use crate::cue::{Track, TrackSource};
use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Timed-text formats understood by the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    Srt,
    Vtt,
    Ass,
    Ssa,
}

impl SubtitleFormat {
    /// Map a file extension (without the dot)
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "srt" => Some(SubtitleFormat::Srt),
            "vtt" => Some(SubtitleFormat::Vtt),
            "ass" => Some(SubtitleFormat::Ass),
            "ssa" => Some(SubtitleFormat::Ssa),
            _ => None,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Map an embedded stream codec name as reported by ffprobe
    pub fn from_codec(codec: &str) -> Option<Self> {
        match codec.to_ascii_lowercase().as_str() {
            "subrip" | "srt" | "mov_text" | "text" => Some(SubtitleFormat::Srt),
            "webvtt" | "vtt" => Some(SubtitleFormat::Vtt),
            "ass" => Some(SubtitleFormat::Ass),
            "ssa" => Some(SubtitleFormat::Ssa),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SubtitleFormat::Srt => "srt",
            SubtitleFormat::Vtt => "vtt",
            SubtitleFormat::Ass => "ass",
            SubtitleFormat::Ssa => "ssa",
        }
    }

    /// Guess the format from decoded content
    pub fn sniff(text: &str) -> Self {
        let head = text.trim_start_matches('\u{feff}').trim_start();
        if head.starts_with("WEBVTT") {
            return SubtitleFormat::Vtt;
        }
        let lower = head
            .lines()
            .take(50)
            .map(|line| line.trim().to_ascii_lowercase())
            .collect::<Vec<_>>();
        if lower.iter().any(|line| line == "[script info]" || line == "[events]") {
            if lower.iter().any(|line| line == "[v4 styles]") {
                return SubtitleFormat::Ssa;
            }
            return SubtitleFormat::Ass;
        }
        SubtitleFormat::Srt
    }
}

impl std::fmt::Display for SubtitleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Parse raw subtitle bytes into a track.
///
/// Without a hint the format is sniffed from the decoded text.
pub fn parse(bytes: &[u8], hint: Option<SubtitleFormat>, source: TrackSource) -> CodecResult<Track> {
    let decoded = encoding::decode(bytes)?;
    let format = hint.unwrap_or_else(|| SubtitleFormat::sniff(&decoded.text));

    let cues = match format {
        SubtitleFormat::Srt => srt::parse(&decoded.text)?,
        SubtitleFormat::Vtt => vtt::parse(&decoded.text)?,
        SubtitleFormat::Ass | SubtitleFormat::Ssa => ass::parse(&decoded.text)?,
    };

    debug!(
        format = %format,
        encoding = decoded.encoding,
        cues = cues.len(),
        "Parsed subtitle track"
    );

    Ok(Track::new(cues, format, source))
}

/// Serialize a track; only SubRip output is supported
pub fn serialize(track: &Track, format: SubtitleFormat) -> CodecResult<Vec<u8>> {
    match format {
        SubtitleFormat::Srt => Ok(srt::write(track.cues()).into_bytes()),
        other => Err(CodecError::UnsupportedOutput(other)),
    }
}

/// Read and parse a subtitle file, using its extension as the format hint
pub fn read_file(path: impl AsRef<Path>) -> CodecResult<Track> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    parse(
        &bytes,
        SubtitleFormat::from_path(path),
        TrackSource::External {
            path: path.to_path_buf(),
        },
    )
}

/// Serialize a track as SubRip and write it to `path`
pub fn write_file(track: &Track, path: impl AsRef<Path>) -> CodecResult<()> {
    let bytes = serialize(track, SubtitleFormat::Srt)?;
    std::fs::write(path, bytes)?;
    Ok(())
}
