//! dualsub - Create dual-language subtitles
//!
//! Merges two subtitle tracks (sidecar files or embedded streams) into one
//! SubRip file that shows both languages, for a single video or a whole show.
//! Work runs as background jobs; this binary submits one, follows its
//! progress and prints the final job record as JSON.

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use dualsub::{BulkRequest, DualOptions, DualRequest, EpisodeSettings, JobRequest, Scheduler, SubtitleSource};
use shared::config::Config;
use shared::models::{Job, JobId, JobStatus};
use shared::paths::LanguagePair;
use shared::store::JobStore;
use shared::LogConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use subtitles::language::{language_from_filename, normalize_language_code};
use subtitles::{codec, LanguageIdentifier};
use tracing::{info, warn};

/// dualsub CLI arguments
#[derive(Parser, Debug)]
#[command(name = "dualsub")]
#[command(about = "Create dual-language subtitle files")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create one dual subtitle
    Create(CreateArgs),

    /// Create dual subtitles for every episode of a show directory
    Bulk(BulkArgs),

    /// Print the detected language of subtitle files
    Identify {
        files: Vec<PathBuf>,
    },

    /// Write the default configuration file
    Config {
        /// Output path (defaults to --config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ClapArgs, Debug)]
struct CreateArgs {
    /// Primary source: a subtitle file, or `stream:<index>[:<codec>]` inside --media
    #[arg(long)]
    primary: String,

    /// Secondary source, same forms as --primary
    #[arg(long)]
    secondary: String,

    /// Primary language code (defaults to [dual] primary_language)
    #[arg(long)]
    primary_lang: Option<String>,

    /// Secondary language code (defaults to [dual] secondary_language)
    #[arg(long)]
    secondary_lang: Option<String>,

    /// Video file used as timing reference and for embedded streams
    #[arg(long)]
    media: Option<PathBuf>,

    /// Output directory (defaults to the media or primary file directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Skip synchronization
    #[arg(long)]
    no_sync: bool,

    /// Do not prefix cues with their language code
    #[arg(long)]
    no_prefix: bool,

    /// Replace an existing dual subtitle for the same pair
    #[arg(long)]
    overwrite: bool,
}

#[derive(ClapArgs, Debug)]
struct BulkArgs {
    /// Show directory
    show: PathBuf,

    #[arg(long)]
    primary_lang: Option<String>,

    #[arg(long)]
    secondary_lang: Option<String>,

    /// Skip synchronization
    #[arg(long)]
    no_sync: bool,

    /// Do not prefix cues with their language code
    #[arg(long)]
    no_prefix: bool,

    /// Episode ids (video file stems) to leave out
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Initialize logging
    shared::logging::init(LogConfig::from_config(&config, "dualsub", args.verbose))?;

    info!(config_file = %args.config.display(), "dualsub starting");

    match args.command {
        Command::Config { output } => {
            let path = output.unwrap_or(args.config);
            Config::default().save(&path)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
        Command::Identify { files } => identify(&config, &files),
        Command::Create(create) => {
            let request = single_request(&config, create)?;
            run_job(&config, JobRequest::Single(request)).await
        }
        Command::Bulk(bulk) => {
            let request = bulk_request(&config, bulk);
            run_job(&config, JobRequest::Bulk(request)).await
        }
    }
}

fn identify(config: &Config, files: &[PathBuf]) -> Result<()> {
    let identifier = LanguageIdentifier::new(config.detection.min_refinement_lines, config.detection.sample_lines);

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let track = codec::read_file(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let found = identifier.identify_track(&name, &track);

        println!(
            "{}: {} ({:?}, {:?} confidence, {} cues)",
            path.display(),
            found.language.as_deref().unwrap_or("unknown"),
            found.method,
            found.confidence,
            track.len()
        );
    }
    Ok(())
}

fn single_request(config: &Config, args: CreateArgs) -> Result<DualRequest> {
    let pair = LanguagePair::new(
        args.primary_lang.unwrap_or_else(|| config.dual.primary_language.clone()),
        args.secondary_lang.unwrap_or_else(|| config.dual.secondary_language.clone()),
    );
    let primary = parse_source(&args.primary, &pair.primary)?;
    let secondary = parse_source(&args.secondary, &pair.secondary)?;

    if (primary.is_embedded() || secondary.is_embedded()) && args.media.is_none() {
        bail!("Embedded streams need --media");
    }

    let anchor = args.media.clone().or_else(|| match &primary {
        SubtitleSource::External { path, .. } => Some(path.clone()),
        SubtitleSource::Embedded { .. } => None,
    });
    let Some(anchor) = anchor else {
        bail!("Cannot derive an output name without --media or a primary file");
    };

    let base_name = if args.media.is_some() {
        file_stem(&anchor)
    } else {
        strip_language_segment(&file_stem(&anchor))
    };
    let output_dir = args
        .output_dir
        .or_else(|| anchor.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    Ok(DualRequest {
        item_id: base_name.clone(),
        label: base_name.clone(),
        primary,
        secondary,
        pair,
        media_path: args.media,
        output_dir,
        base_name,
        options: DualOptions {
            sync: config.sync.enabled_by_default && !args.no_sync,
            language_prefix: config.dual.enable_language_prefix && !args.no_prefix,
            overwrite: args.overwrite,
        },
    })
}

fn bulk_request(config: &Config, args: BulkArgs) -> BulkRequest {
    let episodes: HashMap<String, EpisodeSettings> = args
        .exclude
        .into_iter()
        .map(|id| (id, EpisodeSettings::excluded()))
        .collect();

    BulkRequest {
        show_id: args.show.to_string_lossy().to_string(),
        pair: LanguagePair::new(
            args.primary_lang.unwrap_or_else(|| config.dual.primary_language.clone()),
            args.secondary_lang.unwrap_or_else(|| config.dual.secondary_language.clone()),
        ),
        sync: config.sync.enabled_by_default && !args.no_sync,
        language_prefix: config.dual.enable_language_prefix && !args.no_prefix,
        episodes,
    }
}

/// `stream:<index>[:<codec>]` or a file path
fn parse_source(value: &str, language: &str) -> Result<SubtitleSource> {
    if let Some(rest) = value.strip_prefix("stream:") {
        let (index, codec) = rest.split_once(':').unwrap_or((rest, "subrip"));
        let stream_index = index
            .parse()
            .with_context(|| format!("Invalid stream index: {index}"))?;
        return Ok(SubtitleSource::Embedded {
            stream_index,
            codec: codec.to_string(),
            language: Some(language.to_string()),
        });
    }

    let path = PathBuf::from(value);
    if !path.is_file() {
        bail!("Subtitle file not found: {}", path.display());
    }
    // Leave detection to the pipeline when the name says nothing
    let language = language_from_filename(value).map(|_| language.to_string());
    Ok(SubtitleSource::External { path, language })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// `Show.S01E01.en` -> `Show.S01E01`
fn strip_language_segment(stem: &str) -> String {
    match stem.rsplit_once('.') {
        Some((head, tail)) if normalize_language_code(tail).is_some() => head.to_string(),
        _ => stem.to_string(),
    }
}

/// Submit a job, follow it until it finishes and print it
async fn run_job(config: &Config, request: JobRequest) -> Result<()> {
    let store = Arc::new(JobStore::new());
    let scheduler = Scheduler::from_config(config, store)?;

    let id = scheduler.submit(request)?;
    let job = follow(&scheduler, &id).await?;

    println!("{}", serde_json::to_string_pretty(&job)?);

    info!("=== Job Summary ===");
    info!("Job: {} ({})", job.id, job.status);
    if let Some(result) = &job.result {
        info!("Successful: {}", result.successful.len());
        info!("Failed: {}", result.failed.len());
        info!("Skipped: {}", result.skipped.len());
    }

    if job.status == JobStatus::Failed {
        bail!("Job failed: {}", job.error.as_deref().unwrap_or("unknown error"));
    }
    Ok(())
}

/// Poll job status like an API client, turning Ctrl-C into a cancel request
async fn follow(scheduler: &Scheduler, id: &JobId) -> Result<Job> {
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let mut last_reported = None;
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                signal.context("Failed to listen for Ctrl-C")?;
                interrupted = true;
                warn!(job_id = %id, "Interrupted, cancelling job");
                scheduler.cancel(id)?;
            }
        }

        let job = scheduler.status(id)?;
        let snapshot = (job.progress.current_step.clone(), job.progress.processed, job.progress.current_item.clone());
        if last_reported.as_ref() != Some(&snapshot) {
            info!(
                step = %job.progress.current_step,
                item = %job.progress.current_item,
                processed = job.progress.processed,
                total = job.progress.total,
                percentage = job.progress.percentage,
                eta = job.progress.estimated_time_remaining.as_deref().unwrap_or("-"),
                "Progress"
            );
            last_reported = Some(snapshot);
        }

        if job.is_done() {
            return Ok(job);
        }
    }
}
