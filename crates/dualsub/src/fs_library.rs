//! Filesystem-backed media library.
//!
//! A show is a directory tree; every video file in it is an episode. Sidecar
//! subtitles are files named after the video stem, embedded text streams are
//! listed with `ffprobe`, and extraction pipes a stream through `ffmpeg`.

use crate::library::{Episode, MediaLibrary, SubtitleExtractor, SubtitleSource};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use shared::config::ToolsConfig;
use shared::paths;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use subtitles::language::{language_from_filename, normalize_language_code};
use subtitles::{codec, LanguageIdentifier, SubtitleFormat, TrackSource};
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

static EPISODE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)S(\d{1,2})E(\d{1,3})").unwrap());

/// Library over a directory of video files
#[derive(Debug, Clone)]
pub struct FsLibrary {
    tools: ToolsConfig,
    identifier: LanguageIdentifier,
    probe_embedded: bool,
}

impl FsLibrary {
    pub fn new(tools: ToolsConfig, identifier: LanguageIdentifier) -> Self {
        Self {
            tools,
            identifier,
            probe_embedded: true,
        }
    }

    /// Only list sidecar files; `ffprobe` is never run
    pub fn without_probe(mut self) -> Self {
        self.probe_embedded = false;
        self
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.tools.timeout_seconds)
    }

    /// Scan one video file and the directory entries next to it
    async fn scan_episode(&self, video: &Path, siblings: &[String]) -> Result<Episode> {
        let output_dir = video
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let base_name = video
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .with_context(|| format!("Video file has no name: {}", video.display()))?;

        let mut subtitles = Vec::new();
        for name in siblings {
            if !is_sidecar_of(name, &base_name) {
                continue;
            }
            let path = output_dir.join(name);
            let language = self.sidecar_language(&path).await;
            debug!(path = %path.display(), language = ?language, "Found sidecar subtitle");
            subtitles.push(SubtitleSource::External { path, language });
        }

        if self.probe_embedded {
            match self.probe_streams(video).await {
                Ok(streams) => subtitles.extend(streams),
                Err(e) => warn!(
                    video = %video.display(),
                    error = %e,
                    "Could not list embedded subtitle streams"
                ),
            }
        }

        Ok(Episode {
            id: base_name.clone(),
            label: episode_label(&base_name),
            media_path: Some(video.to_path_buf()),
            output_dir,
            base_name,
            subtitles,
            sibling_files: siblings.to_vec(),
        })
    }

    /// Language of a sidecar from its name, falling back to its contents
    async fn sidecar_language(&self, path: &Path) -> Option<String> {
        let name = path.file_name()?.to_string_lossy().to_string();
        if let Some(code) = language_from_filename(&name) {
            return Some(code);
        }

        let bytes = tokio::fs::read(path).await.ok()?;
        let track = codec::parse(&bytes, SubtitleFormat::from_path(path), TrackSource::External {
            path: path.to_path_buf(),
        })
        .ok()?;
        self.identifier.identify_track(&name, &track).language
    }

    /// List embedded text subtitle streams with `ffprobe`
    async fn probe_streams(&self, video: &Path) -> Result<Vec<SubtitleSource>> {
        let mut cmd = Command::new(&self.tools.ffprobe);
        cmd.arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("s")
            .arg("-show_entries")
            .arg("stream=index,codec_name:stream_tags=language,title")
            .arg("-of")
            .arg("json")
            .arg(video)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout(), cmd.output())
            .await
            .with_context(|| format!("ffprobe timed out after {}s", self.tools.timeout_seconds))?
            .with_context(|| format!("Failed to execute {}", self.tools.ffprobe))?;

        if !output.status.success() {
            bail!(
                "ffprobe failed with exit code {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        parse_probe_output(&output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: u32,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Text streams from `ffprobe -of json`; image codecs are left out
fn parse_probe_output(json: &[u8]) -> Result<Vec<SubtitleSource>> {
    let probe: ProbeOutput = serde_json::from_slice(json).context("Failed to parse ffprobe output")?;

    let sources = probe
        .streams
        .into_iter()
        .filter_map(|stream| {
            let codec = stream.codec_name?;
            SubtitleFormat::from_codec(&codec)?;
            let language = stream
                .tags
                .get("language")
                .filter(|code| !code.eq_ignore_ascii_case("und"))
                .map(|code| normalize_language_code(code).unwrap_or_else(|| code.to_ascii_lowercase()));
            Some(SubtitleSource::Embedded {
                stream_index: stream.index,
                codec,
                language,
            })
        })
        .collect();

    Ok(sources)
}

/// `name` is a subtitle for the video `base_name` and not a dual output
fn is_sidecar_of(name: &str, base_name: &str) -> bool {
    let path = Path::new(name);
    let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    if !paths::has_subtitle_extension(extension) || paths::is_dual_stem(stem) {
        return false;
    }
    stem == base_name || stem.starts_with(&format!("{base_name}."))
}

/// Display label such as `S01E02: The Title`
pub fn episode_label(stem: &str) -> String {
    let Some(caps) = EPISODE_TOKEN.captures(stem) else {
        return tidy(stem);
    };
    let (Some(token), Some(season), Some(episode)) = (caps.get(0), caps.get(1), caps.get(2)) else {
        return tidy(stem);
    };

    let code = format!(
        "S{:02}E{:02}",
        season.as_str().parse::<u32>().unwrap_or(0),
        episode.as_str().parse::<u32>().unwrap_or(0)
    );

    let after = tidy(&stem[token.end()..]);
    let before = tidy(&stem[..token.start()]);
    let title = if after.is_empty() { before } else { after };

    if title.is_empty() {
        code
    } else {
        format!("{code}: {title}")
    }
}

fn tidy(text: &str) -> String {
    text.split(|c: char| c == '.' || c == '_' || c == ' ')
        .filter(|part| !part.is_empty() && *part != "-")
        .collect::<Vec<_>>()
        .join(" ")
}

/// Video files under a show directory with the file names next to each
struct ShowTree {
    videos: Vec<PathBuf>,
    listings: HashMap<PathBuf, Vec<String>>,
}

/// Walk `root` without following directory symlinks.
///
/// Symlinked files still count when they point at a regular file.
fn walk_show(root: &Path) -> Result<ShowTree> {
    let mut tree = ShowTree {
        videos: Vec::new(),
        listings: HashMap::new(),
    };

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk show directory: {}", root.display()))?;
        let file_type = entry.file_type();
        let is_file = file_type.is_file() || (file_type.is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }

        let path = entry.path();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        tree.listings
            .entry(dir)
            .or_default()
            .push(entry.file_name().to_string_lossy().to_string());

        if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(paths::has_video_extension)
        {
            tree.videos.push(path.to_path_buf());
        }
    }

    tree.videos.sort();
    for names in tree.listings.values_mut() {
        names.sort();
    }
    Ok(tree)
}

#[async_trait]
impl MediaLibrary for FsLibrary {
    async fn show_episodes(&self, show_id: &str) -> Result<Vec<Episode>> {
        let root = PathBuf::from(show_id);
        let is_dir = tokio::fs::metadata(&root).await.map(|m| m.is_dir()).unwrap_or(false);
        if !is_dir {
            bail!("Show directory not found: {}", root.display());
        }

        let walk_root = root.clone();
        let tree = tokio::task::spawn_blocking(move || walk_show(&walk_root))
            .await
            .context("Show directory scan aborted")??;

        let mut episodes = Vec::with_capacity(tree.videos.len());
        for video in &tree.videos {
            let dir = video.parent().map(Path::to_path_buf).unwrap_or_default();
            let siblings = tree.listings.get(&dir).map(Vec::as_slice).unwrap_or_default();
            episodes.push(self.scan_episode(video, siblings).await?);
        }

        info!(
            show = %root.display(),
            episodes = episodes.len(),
            "Scanned show directory"
        );

        Ok(episodes)
    }
}

#[async_trait]
impl SubtitleExtractor for FsLibrary {
    async fn extract(&self, media_path: &Path, stream_index: u32, codec: &str) -> Result<Vec<u8>> {
        let muxer = match SubtitleFormat::from_codec(codec) {
            Some(SubtitleFormat::Ass) | Some(SubtitleFormat::Ssa) => "ass",
            Some(SubtitleFormat::Vtt) => "webvtt",
            Some(SubtitleFormat::Srt) => "srt",
            None => bail!("Unsupported subtitle codec for extraction: {codec}"),
        };

        info!(
            media = %media_path.display(),
            stream = stream_index,
            codec,
            "Extracting embedded subtitle with FFmpeg"
        );

        // ffmpeg -v error -i input.mkv -map 0:N -f srt -
        let mut cmd = Command::new(&self.tools.ffmpeg);
        cmd.arg("-v")
            .arg("error")
            .arg("-i")
            .arg(media_path)
            .arg("-map")
            .arg(format!("0:{stream_index}"))
            .arg("-f")
            .arg(muxer)
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout(), cmd.output())
            .await
            .with_context(|| format!("ffmpeg timed out after {}s", self.tools.timeout_seconds))?
            .with_context(|| format!("Failed to execute {}", self.tools.ffmpeg))?;

        if !output.status.success() {
            bail!(
                "ffmpeg failed with exit code {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        if output.stdout.is_empty() {
            bail!("ffmpeg produced no subtitle data for stream {stream_index}");
        }

        Ok(output.stdout)
    }
}
