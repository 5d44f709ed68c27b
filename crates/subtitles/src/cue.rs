//! Normalized cue and track model shared by every format.

use crate::codec::SubtitleFormat;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

static MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>|\{[^}]*\}").unwrap());

/// Vertical placement of a cue on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Top,
    Bottom,
}

impl std::str::FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(Position::Top),
            "bottom" => Ok(Position::Bottom),
            other => Err(format!("unknown position: {other}")),
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Position::Top => write!(f, "top"),
            Position::Bottom => write!(f, "bottom"),
        }
    }
}

/// Style hints carried by a cue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueStyle {
    pub position: Option<Position>,
    /// `#RRGGBB`
    pub color: Option<String>,
}

/// One timed subtitle entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    pub start_ms: i64,
    pub end_ms: i64,
    /// Plain text, `\n` between lines
    pub text: String,
    #[serde(default)]
    pub style: CueStyle,
}

impl Cue {
    pub fn new(start_ms: i64, end_ms: i64, text: impl Into<String>) -> Self {
        Self {
            start_ms,
            end_ms,
            text: text.into(),
            style: CueStyle::default(),
        }
    }

    pub fn with_style(mut self, style: CueStyle) -> Self {
        self.style = style;
        self
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_ms.saturating_sub(self.start_ms).max(0)
    }

    /// Same cue moved by `offset_ms`, clamped so it never starts before zero
    pub fn shifted(&self, offset_ms: i64) -> Self {
        let start_ms = self.start_ms.saturating_add(offset_ms).max(0);
        let end_ms = self.end_ms.saturating_add(offset_ms).max(start_ms.saturating_add(1));
        Self {
            start_ms,
            end_ms,
            ..self.clone()
        }
    }
}

/// Where a track came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackSource {
    /// A subtitle stream inside the media container
    Embedded { stream_index: u32, codec: String },
    /// A standalone subtitle file
    External { path: PathBuf },
    /// Produced by these tools, e.g. a merged dual track
    Generated,
}

/// An ordered, immutable sequence of cues plus metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    cues: Vec<Cue>,
    language: Option<String>,
    format: SubtitleFormat,
    source: TrackSource,
}

impl Track {
    /// Build a track; cues are stable-sorted by start time
    pub fn new(mut cues: Vec<Cue>, format: SubtitleFormat, source: TrackSource) -> Self {
        cues.sort_by_key(|cue| cue.start_ms);
        Self {
            cues,
            language: None,
            format,
            source,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// New track with the same metadata and different cues
    pub fn with_cues(&self, cues: Vec<Cue>) -> Self {
        Self {
            language: self.language.clone(),
            ..Self::new(cues, self.format, self.source.clone())
        }
    }

    /// New track with every cue moved by `offset_ms`
    pub fn shifted(&self, offset_ms: i64) -> Self {
        self.with_cues(self.cues.iter().map(|cue| cue.shifted(offset_ms)).collect())
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn into_cues(self) -> Vec<Cue> {
        self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn format(&self) -> SubtitleFormat {
        self.format
    }

    pub fn source(&self) -> &TrackSource {
        &self.source
    }

    pub fn first_start_ms(&self) -> Option<i64> {
        self.cues.first().map(|cue| cue.start_ms)
    }

    /// End of the last-ending cue
    pub fn duration_ms(&self) -> i64 {
        self.cues.iter().map(|cue| cue.end_ms).max().unwrap_or(0)
    }

    /// Up to `max_lines` non-empty lines of markup-free text, for language detection
    pub fn sample_text(&self, max_lines: usize) -> String {
        self.cues
            .iter()
            .flat_map(|cue| cue.text.lines())
            .map(|line| MARKUP.replace_all(line, "").trim().to_string())
            .filter(|line| !line.is_empty())
            .take(max_lines)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_sorts_stably_by_start() {
        let track = Track::new(
            vec![
                Cue::new(2000, 3000, "b"),
                Cue::new(1000, 1500, "a1"),
                Cue::new(1000, 1800, "a2"),
            ],
            SubtitleFormat::Srt,
            TrackSource::Generated,
        );
        let texts: Vec<_> = track.cues().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a1", "a2", "b"]);
        assert_eq!(track.first_start_ms(), Some(1000));
        assert_eq!(track.duration_ms(), 3000);
    }

    #[test]
    fn test_shift_clamps_at_zero() {
        let cue = Cue::new(100, 900, "x").shifted(-500);
        assert_eq!((cue.start_ms, cue.end_ms), (0, 400));

        let cue = Cue::new(100, 200, "x").shifted(-1000);
        assert!(cue.end_ms > cue.start_ms);
    }

    #[test]
    fn test_shift_saturates_near_the_limit() {
        let cue = Cue::new(i64::MAX - 10, i64::MAX - 1, "x").shifted(500);
        assert_eq!((cue.start_ms, cue.end_ms), (i64::MAX, i64::MAX));
    }

    #[test]
    fn test_with_cues_keeps_metadata() {
        let track = Track::new(vec![], SubtitleFormat::Ass, TrackSource::Generated).with_language("ja");
        let next = track.with_cues(vec![Cue::new(0, 10, "x")]);
        assert_eq!(next.language(), Some("ja"));
        assert_eq!(next.format(), SubtitleFormat::Ass);
        assert_eq!(next.len(), 1);
    }

    #[test]
    fn test_sample_text_strips_markup() {
        let track = Track::new(
            vec![
                Cue::new(0, 10, "{\\i1}Hello{\\i0} world"),
                Cue::new(10, 20, "<i>Second</i>\n\nthird"),
            ],
            SubtitleFormat::Srt,
            TrackSource::Generated,
        );
        assert_eq!(track.sample_text(10), "Hello world\nSecond\nthird");
        assert_eq!(track.sample_text(1), "Hello world");
    }

    #[test]
    fn test_position_parse() {
        assert_eq!("Top".parse::<Position>().unwrap(), Position::Top);
        assert!("middle".parse::<Position>().is_err());
    }
}
