//! Dual subtitle merge.
//!
//! Both tracks keep every cue with its own timing. The two cue streams are
//! concatenated, styled per slot, optionally prefixed with the language code,
//! and stable-sorted by start time so primary cues precede secondary cues that
//! start at the same moment.

use crate::codec::SubtitleFormat;
use crate::cue::{Cue, CueStyle, Position, Track, TrackSource};
use serde::{Deserialize, Serialize};

/// Which input a merged cue came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Primary,
    Secondary,
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Primary => f.write_str("primary"),
            Slot::Secondary => f.write_str("secondary"),
        }
    }
}

/// Placement and color applied to every cue of one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStyle {
    pub position: Position,
    pub color: Option<String>,
}

impl SlotStyle {
    fn cue_style(&self) -> CueStyle {
        CueStyle {
            position: Some(self.position),
            color: self.color.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    pub primary: SlotStyle,
    pub secondary: SlotStyle,
    /// Prepend `[XX] ` to each cue using its track's language
    pub language_prefix: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            primary: SlotStyle {
                position: Position::Bottom,
                color: Some("#FFFFFF".to_string()),
            },
            secondary: SlotStyle {
                position: Position::Top,
                color: Some("#FFFF00".to_string()),
            },
            language_prefix: true,
        }
    }
}

impl MergeConfig {
    pub fn style(&self, slot: Slot) -> &SlotStyle {
        match slot {
            Slot::Primary => &self.primary,
            Slot::Secondary => &self.secondary,
        }
    }
}

/// Bracketed display prefix for a language code, e.g. `[EN] `
pub fn language_prefix(code: &str) -> String {
    format!("[{}] ", code.to_ascii_uppercase())
}

/// Merge two tracks into one dual track.
///
/// The output holds exactly `primary.len() + secondary.len()` cues.
pub fn merge(primary: &Track, secondary: &Track, config: &MergeConfig) -> Track {
    let mut cues = Vec::with_capacity(primary.len() + secondary.len());
    cues.extend(slot_cues(primary, Slot::Primary, config));
    cues.extend(slot_cues(secondary, Slot::Secondary, config));

    let merged = Track::new(cues, SubtitleFormat::Srt, TrackSource::Generated);
    match (primary.language(), secondary.language()) {
        (Some(p), Some(s)) => merged.with_language(format!("{p}-{s}")),
        _ => merged,
    }
}

fn slot_cues<'a>(track: &'a Track, slot: Slot, config: &'a MergeConfig) -> impl Iterator<Item = Cue> + 'a {
    let style = config.style(slot).cue_style();
    let prefix = match track.language() {
        Some(code) if config.language_prefix => language_prefix(code),
        _ => String::new(),
    };

    track.cues().iter().map(move |cue| Cue {
        start_ms: cue.start_ms,
        end_ms: cue.end_ms,
        text: format!("{prefix}{}", cue.text),
        style: style.clone(),
    })
}
