//! Bulk request planning.
//!
//! Turns a show's episodes into the list of items that actually need work.
//! Every episode ends up either on the worklist or in the skipped list.

use crate::library::{Episode, SubtitleSource};
use crate::pipeline::{DualOptions, DualRequest};
use serde::{Deserialize, Serialize};
use shared::models::{SkipReason, SkippedItem};
use shared::paths::LanguagePair;
use std::collections::HashMap;
use tracing::debug;

/// Per-episode overrides of a bulk request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeSettings {
    #[serde(default = "default_include")]
    pub include: bool,
    #[serde(default)]
    pub sync: Option<bool>,
    #[serde(default)]
    pub language_prefix: Option<bool>,
    /// Explicit source for the primary slot instead of the best match
    #[serde(default)]
    pub primary_source: Option<SubtitleSource>,
    #[serde(default)]
    pub secondary_source: Option<SubtitleSource>,
}

fn default_include() -> bool {
    true
}

impl Default for EpisodeSettings {
    fn default() -> Self {
        Self {
            include: true,
            sync: None,
            language_prefix: None,
            primary_source: None,
            secondary_source: None,
        }
    }
}

impl EpisodeSettings {
    pub fn excluded() -> Self {
        Self {
            include: false,
            ..Self::default()
        }
    }
}

/// Dual subtitles for every eligible episode of a show
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRequest {
    pub show_id: String,
    pub pair: LanguagePair,
    pub sync: bool,
    pub language_prefix: bool,
    /// Keyed by episode id; episodes without an entry use the request defaults
    #[serde(default)]
    pub episodes: HashMap<String, EpisodeSettings>,
}

/// Result of planning a bulk request
#[derive(Debug, Clone)]
pub struct BulkPlan {
    pub show_id: String,
    pub pair: LanguagePair,
    /// Items to process, in episode order
    pub worklist: Vec<DualRequest>,
    pub skipped: Vec<SkippedItem>,
    pub total_episodes: usize,
}

/// Split `episodes` into work and skips.
///
/// Checks run in order: excluded, missing language, already exists (for the
/// pair in either order).
pub fn plan(request: &BulkRequest, episodes: &[Episode]) -> BulkPlan {
    let defaults = EpisodeSettings::default();
    let mut worklist = Vec::new();
    let mut skipped = Vec::new();

    for episode in episodes {
        let settings = request.episodes.get(&episode.id).unwrap_or(&defaults);
        let skip = |reason: SkipReason| {
            debug!(episode = %episode.label, reason = %reason, "Skipping episode");
            SkippedItem {
                item_id: episode.id.clone(),
                label: episode.label.clone(),
                reason,
            }
        };

        if !settings.include {
            skipped.push(skip(SkipReason::Excluded));
            continue;
        }

        let primary = settings
            .primary_source
            .clone()
            .or_else(|| episode.source_for(&request.pair.primary).cloned());
        let secondary = settings
            .secondary_source
            .clone()
            .or_else(|| episode.source_for(&request.pair.secondary).cloned());

        let (primary, secondary) = match (primary, secondary) {
            (Some(p), Some(s)) => (p, s),
            (p, s) => {
                let mut languages = Vec::new();
                if p.is_none() {
                    languages.push(request.pair.primary.clone());
                }
                if s.is_none() {
                    languages.push(request.pair.secondary.clone());
                }
                skipped.push(skip(SkipReason::MissingLanguage { languages }));
                continue;
            }
        };

        if let Some(path) = episode.existing_dual(&request.pair) {
            skipped.push(skip(SkipReason::AlreadyExists { path: Some(path) }));
            continue;
        }

        worklist.push(DualRequest {
            item_id: episode.id.clone(),
            label: episode.label.clone(),
            primary,
            secondary,
            pair: request.pair.clone(),
            media_path: episode.media_path.clone(),
            output_dir: episode.output_dir.clone(),
            base_name: episode.base_name.clone(),
            options: DualOptions {
                sync: settings.sync.unwrap_or(request.sync),
                language_prefix: settings.language_prefix.unwrap_or(request.language_prefix),
                overwrite: false,
            },
        });
    }

    BulkPlan {
        show_id: request.show_id.clone(),
        pair: request.pair.clone(),
        worklist,
        skipped,
        total_episodes: episodes.len(),
    }
}
