//! Single dual subtitle jobs end to end through the scheduler.

mod common;

use anyhow::Result;
use common::{pipeline, scheduler, srt_text, wait, FakeLibrary, FakeSyncTool};
use dualsub::{DualOptions, DualRequest, JobRequest, SubtitleSource};
use shared::models::{JobKind, JobStatus};
use shared::paths::LanguagePair;
use shared::store::JobStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use subtitles::{codec, SubtitleFormat};
use tempfile::TempDir;

fn request(dir: &Path, primary: &str, secondary: &str, sync: bool) -> DualRequest {
    DualRequest {
        item_id: "movie".to_string(),
        label: "Movie".to_string(),
        primary: SubtitleSource::External {
            path: dir.join(primary),
            language: Some("en".to_string()),
        },
        secondary: SubtitleSource::External {
            path: dir.join(secondary),
            language: Some("ja".to_string()),
        },
        pair: LanguagePair::new("en", "ja"),
        media_path: Some(dir.join("Movie.mkv")),
        output_dir: dir.to_path_buf(),
        base_name: "Movie".to_string(),
        options: DualOptions {
            sync,
            language_prefix: true,
            overwrite: false,
        },
    }
}

#[tokio::test]
async fn test_merge_keeps_every_cue_with_prefixes() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let dir = temp_dir.path();
    std::fs::write(dir.join("Movie.en.srt"), srt_text(120, 2_000, "Hello"))?;
    std::fs::write(dir.join("Movie.ja.srt"), srt_text(118, 2_050, "こんにちは"))?;

    let tool = Arc::new(FakeSyncTool::new(0));
    let scheduler = scheduler(
        Arc::new(JobStore::new()),
        FakeLibrary::default(),
        pipeline(tool.clone(), &dir.join("scratch"), Duration::from_secs(5)),
        1,
    );

    let id = scheduler.submit(JobRequest::Single(request(dir, "Movie.en.srt", "Movie.ja.srt", false)))?;
    let job = wait(&scheduler, &id).await;

    assert_eq!(job.kind, JobKind::SingleDual);
    assert_eq!(job.status, JobStatus::Completed);
    assert!(tool.calls().is_empty());

    let result = job.result.expect("completed job has a result");
    let item = &result.successful[0];
    assert_eq!(item.cue_count, 238);
    assert_eq!(item.output_path, dir.join("Movie.dual.en-ja.srt"));

    let track = codec::read_file(&item.output_path)?;
    assert_eq!(track.len(), 238);
    let en = track.cues().iter().filter(|c| c.text.starts_with("[EN] ")).count();
    let ja = track.cues().iter().filter(|c| c.text.starts_with("[JA] ")).count();
    assert_eq!((en, ja), (120, 118));
    assert!(track.cues().windows(2).all(|w| w[0].start_ms <= w[1].start_ms));
    Ok(())
}

#[tokio::test]
async fn test_secondary_syncs_against_synced_primary() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let dir = temp_dir.path();
    std::fs::write(dir.join("Movie.en.srt"), srt_text(4, 2_000, "Hello"))?;
    std::fs::write(dir.join("Movie.ja.srt"), srt_text(4, 2_000, "こんにちは"))?;

    let tool = Arc::new(FakeSyncTool::new(500));
    let scheduler = scheduler(
        Arc::new(JobStore::new()),
        FakeLibrary::default(),
        pipeline(tool.clone(), &dir.join("scratch"), Duration::from_secs(5)),
        1,
    );

    let id = scheduler.submit(JobRequest::Single(request(dir, "Movie.en.srt", "Movie.ja.srt", true)))?;
    let job = wait(&scheduler, &id).await;
    assert_eq!(job.status, JobStatus::Completed);

    let calls = tool.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, dir.join("Movie.mkv"));

    let synced_primary = codec::read_file(dir.join("Movie.en.srt"))?.shifted(500);
    let expected = String::from_utf8(codec::serialize(&synced_primary, SubtitleFormat::Srt)?)?;
    assert_eq!(calls[1].1, expected);

    // Both tracks moved together, so every cue starts at least 1.5s in
    let output = codec::read_file(dir.join("Movie.dual.en-ja.srt"))?;
    assert!(output.cues().iter().all(|c| c.start_ms >= 1_500));
    Ok(())
}

#[tokio::test]
async fn test_input_error_fails_single_job() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let dir = temp_dir.path();
    std::fs::write(dir.join("Movie.en.srt"), srt_text(4, 2_000, "Hello"))?;
    std::fs::write(
        dir.join("Movie.ja.srt"),
        "1\n00:00:05,000 --> 00:00:05,000\nzero length\n\n",
    )?;

    let scheduler = scheduler(
        Arc::new(JobStore::new()),
        FakeLibrary::default(),
        pipeline(Arc::new(FakeSyncTool::new(0)), &dir.join("scratch"), Duration::from_secs(5)),
        1,
    );

    let id = scheduler.submit(JobRequest::Single(request(dir, "Movie.en.srt", "Movie.ja.srt", false)))?;
    let job = wait(&scheduler, &id).await;

    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.expect("failed job has an error");
    assert!(error.contains("secondary"));
    assert!(error.contains("line 2"), "error without line number: {error}");
    assert!(!dir.join("Movie.dual.en-ja.srt").exists());
    Ok(())
}

#[tokio::test]
async fn test_out_of_range_timestamp_fails_single_job() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let dir = temp_dir.path();
    std::fs::write(dir.join("Movie.en.srt"), srt_text(2, 2_000, "Hello"))?;
    std::fs::write(
        dir.join("Movie.ja.srt"),
        "1\n9223372036854775807:00:00,000 --> 9223372036854775807:00:01,000\nforever\n\n",
    )?;

    let scheduler = scheduler(
        Arc::new(JobStore::new()),
        FakeLibrary::default(),
        pipeline(Arc::new(FakeSyncTool::new(0)), &dir.join("scratch"), Duration::from_secs(5)),
        1,
    );

    let id = scheduler.submit(JobRequest::Single(request(dir, "Movie.en.srt", "Movie.ja.srt", false)))?;
    let job = wait(&scheduler, &id).await;

    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.expect("failed job has an error");
    assert!(error.contains("out of range"), "unexpected error: {error}");
    Ok(())
}

#[tokio::test]
async fn test_existing_output_fails_without_overwrite() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let dir = temp_dir.path();
    std::fs::write(dir.join("Movie.en.srt"), srt_text(2, 2_000, "Hello"))?;
    std::fs::write(dir.join("Movie.ja.srt"), srt_text(2, 2_000, "こんにちは"))?;
    std::fs::write(dir.join("Movie.dual.ja-en.srt"), srt_text(1, 2_000, "old"))?;

    let scheduler = scheduler(
        Arc::new(JobStore::new()),
        FakeLibrary::default(),
        pipeline(Arc::new(FakeSyncTool::new(0)), &dir.join("scratch"), Duration::from_secs(5)),
        1,
    );

    let id = scheduler.submit(JobRequest::Single(request(dir, "Movie.en.srt", "Movie.ja.srt", false)))?;
    let job = wait(&scheduler, &id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap_or_default().contains("already exists"));

    let mut overwrite = request(dir, "Movie.en.srt", "Movie.ja.srt", false);
    overwrite.options.overwrite = true;
    let id = scheduler.submit(JobRequest::Single(overwrite))?;
    assert_eq!(wait(&scheduler, &id).await.status, JobStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn test_sync_tool_missing_is_a_warning() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let dir = temp_dir.path();
    std::fs::write(dir.join("Movie.en.srt"), srt_text(3, 2_000, "Hello"))?;
    std::fs::write(dir.join("Movie.ja.srt"), srt_text(3, 2_000, "こんにちは"))?;

    let tool = Arc::new(subtitles::FfsubsyncTool::new("definitely-not-ffsubsync-9d1e"));
    let scheduler = scheduler(
        Arc::new(JobStore::new()),
        FakeLibrary::default(),
        pipeline(tool, &dir.join("scratch"), Duration::from_secs(5)),
        1,
    );

    let id = scheduler.submit(JobRequest::Single(request(dir, "Movie.en.srt", "Movie.ja.srt", true)))?;
    let job = wait(&scheduler, &id).await;

    assert_eq!(job.status, JobStatus::Completed);
    let result = job.result.expect("completed job has a result");
    assert_eq!(result.successful[0].cue_count, 6);
    assert!(!result.successful[0].warnings.is_empty());
    Ok(())
}
