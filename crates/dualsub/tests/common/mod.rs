//! Fakes shared by the integration tests.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use dualsub::{DualPipeline, Episode, MediaLibrary, Scheduler, SubtitleExtractor, SubtitleSource};
use shared::config::JobsConfig;
use shared::models::{Job, JobId};
use shared::store::JobStore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subtitles::codec;
use subtitles::error::{SyncError, SyncResult};
use subtitles::{LanguageIdentifier, MergeConfig, SyncOptions, SyncTool, Synchronizer};

/// Library serving fixed episode lists
#[derive(Default)]
pub struct FakeLibrary {
    pub shows: HashMap<String, Vec<Episode>>,
    /// Show ids whose listing panics
    pub broken: Vec<String>,
}

#[async_trait]
impl MediaLibrary for FakeLibrary {
    async fn show_episodes(&self, show_id: &str) -> Result<Vec<Episode>> {
        if self.broken.iter().any(|id| id == show_id) {
            panic!("library index corrupted for {show_id}");
        }
        match self.shows.get(show_id) {
            Some(episodes) => Ok(episodes.clone()),
            None => bail!("unknown show: {show_id}"),
        }
    }
}

pub struct NoExtractor;

#[async_trait]
impl SubtitleExtractor for NoExtractor {
    async fn extract(&self, _media_path: &Path, _stream_index: u32, _codec: &str) -> Result<Vec<u8>> {
        bail!("embedded streams are not used in these tests")
    }
}

/// Sync tool that shifts every cue, optionally after a delay.
///
/// Calls whose reference path contains `hang_on` never finish; calls whose
/// reference path contains `panic_on` panic.
pub struct FakeSyncTool {
    pub offset_ms: i64,
    pub delay: Duration,
    pub hang_on: Option<String>,
    pub panic_on: Option<String>,
    pub calls: Mutex<Vec<(PathBuf, String)>>,
}

impl FakeSyncTool {
    pub fn new(offset_ms: i64) -> Self {
        Self {
            offset_ms,
            delay: Duration::ZERO,
            hang_on: None,
            panic_on: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn hanging_on(mut self, marker: &str) -> Self {
        self.hang_on = Some(marker.to_string());
        self
    }

    pub fn panicking_on(mut self, marker: &str) -> Self {
        self.panic_on = Some(marker.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(PathBuf, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncTool for FakeSyncTool {
    fn name(&self) -> &str {
        "fake-sync"
    }

    async fn sync(&self, input: &Path, reference: &Path, output: &Path, _options: &SyncOptions) -> SyncResult<()> {
        let contents = if reference.extension().is_some_and(|e| e == "srt") {
            std::fs::read_to_string(reference)?
        } else {
            String::new()
        };
        self.calls
            .lock()
            .unwrap()
            .push((reference.to_path_buf(), contents));

        if let Some(marker) = &self.hang_on {
            if reference.to_string_lossy().contains(marker.as_str()) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
        if let Some(marker) = &self.panic_on {
            if reference.to_string_lossy().contains(marker.as_str()) {
                panic!("sync tool crashed on {}", reference.display());
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let track = codec::read_file(input).map_err(SyncError::from)?;
        codec::write_file(&track.shifted(self.offset_ms), output)?;
        Ok(())
    }
}

/// SubRip text with `count` cues spaced `step_ms` apart
pub fn srt_text(count: usize, step_ms: i64, text: &str) -> String {
    let mut out = String::new();
    for i in 0..count {
        let start = 1_000 + i as i64 * step_ms;
        out.push_str(&format!(
            "{}\n{} --> {}\n{} {}\n\n",
            i + 1,
            timestamp(start),
            timestamp(start + step_ms / 2),
            text,
            i
        ));
    }
    out
}

fn timestamp(ms: i64) -> String {
    format!(
        "{:02}:{:02}:{:02},{:03}",
        ms / 3_600_000,
        ms / 60_000 % 60,
        ms / 1_000 % 60,
        ms % 1_000
    )
}

/// Episode `n` of a show in `dir` with sidecar files for `languages`.
///
/// `existing` lists dual files already next to the video, e.g. `dual.en-ja.srt`.
pub fn episode(dir: &Path, n: usize, languages: &[&str], existing: &[&str]) -> Result<Episode> {
    let base_name = format!("Show.S01E{n:02}");
    let mut subtitles = Vec::new();
    let mut sibling_files = vec![format!("{base_name}.mkv")];

    for lang in languages {
        let name = format!("{base_name}.{lang}.srt");
        std::fs::write(dir.join(&name), srt_text(5, 2_000, &format!("{lang} line")))?;
        subtitles.push(SubtitleSource::External {
            path: dir.join(&name),
            language: Some(lang.to_string()),
        });
        sibling_files.push(name);
    }
    for suffix in existing {
        let name = format!("{base_name}.{suffix}");
        std::fs::write(dir.join(&name), srt_text(1, 2_000, "old"))?;
        sibling_files.push(name);
    }

    Ok(Episode {
        id: base_name.clone(),
        label: format!("S01E{n:02}: Episode {n}"),
        media_path: Some(dir.join(format!("{base_name}.mkv"))),
        output_dir: dir.to_path_buf(),
        base_name,
        subtitles,
        sibling_files,
    })
}

pub fn pipeline(tool: Arc<dyn SyncTool>, scratch: &Path, timeout: Duration) -> DualPipeline {
    let synchronizer = Synchronizer::new(
        tool,
        scratch,
        SyncOptions {
            timeout,
            ..SyncOptions::default()
        },
    );
    DualPipeline::new(
        Arc::new(NoExtractor),
        synchronizer,
        LanguageIdentifier::default(),
        MergeConfig::default(),
    )
}

pub fn scheduler(
    store: Arc<JobStore>,
    library: FakeLibrary,
    pipeline: DualPipeline,
    max_concurrent_jobs: usize,
) -> Scheduler {
    let jobs = JobsConfig {
        max_concurrent_jobs,
        ..JobsConfig::default()
    };
    Scheduler::new(store, Arc::new(library), pipeline.clone(), pipeline, &jobs)
}

pub async fn wait(scheduler: &Scheduler, id: &JobId) -> Job {
    tokio::time::timeout(Duration::from_secs(30), scheduler.wait(id, Duration::from_millis(5)))
        .await
        .expect("job did not finish in time")
        .expect("job disappeared from the store")
}
