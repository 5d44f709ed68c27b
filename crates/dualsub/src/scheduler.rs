//! Job scheduler.
//!
//! Each submitted job runs on its own task but only after taking a permit from
//! a shared semaphore, so at most `max_concurrent_jobs` execute at once. The
//! scheduler is the single place deciding whether a failure is item-local or
//! fatal to the job; all state changes go through the [`JobStore`].

use crate::bulk::BulkRunner;
use crate::fs_library::FsLibrary;
use crate::library::MediaLibrary;
use crate::pipeline::{DualPipeline, DualRequest};
use crate::worklist::{self, BulkRequest};
use anyhow::{Context, Result};
use shared::config::{Config, DualDefaults, JobsConfig};
use shared::models::{Job, JobId, JobKind, JobProgress, JobResult, JobStatus};
use shared::store::{CancelToken, JobStore, StoreResult};
use std::sync::Arc;
use std::time::Duration;
use subtitles::{FfsubsyncTool, LanguageIdentifier, MergeConfig, Position, SlotStyle, SyncOptions, Synchronizer};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Work a job is created for
#[derive(Debug, Clone)]
pub enum JobRequest {
    Single(DualRequest),
    Bulk(BulkRequest),
}

impl JobRequest {
    fn kind(&self) -> JobKind {
        match self {
            JobRequest::Single(_) => JobKind::SingleDual,
            JobRequest::Bulk(_) => JobKind::BulkDual,
        }
    }

    fn title(&self) -> String {
        match self {
            JobRequest::Single(request) => format!("Dual subtitle {} for {}", request.pair, request.label),
            JobRequest::Bulk(request) => format!("Bulk dual subtitles {} for {}", request.pair, request.show_id),
        }
    }
}

struct Inner {
    store: Arc<JobStore>,
    library: Arc<dyn MediaLibrary>,
    pipeline: DualPipeline,
    bulk_pipeline: DualPipeline,
    permits: Arc<Semaphore>,
    episode_concurrency: usize,
    eta_window: usize,
}

/// Runs jobs in the background; cheap to clone
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// `bulk_pipeline` is used for bulk jobs, usually with faster sync settings
    pub fn new(
        store: Arc<JobStore>,
        library: Arc<dyn MediaLibrary>,
        pipeline: DualPipeline,
        bulk_pipeline: DualPipeline,
        jobs: &JobsConfig,
    ) -> Self {
        info!(
            max_concurrent_jobs = jobs.max_concurrent_jobs,
            episode_concurrency = jobs.episode_concurrency,
            "Scheduler ready"
        );

        Self {
            inner: Arc::new(Inner {
                store,
                library,
                pipeline,
                bulk_pipeline,
                permits: Arc::new(Semaphore::new(jobs.max_concurrent_jobs.max(1))),
                episode_concurrency: jobs.episode_concurrency.max(1),
                eta_window: jobs.eta_window,
            }),
        }
    }

    /// Wire the filesystem library and the configured sync tool
    pub fn from_config(config: &Config, store: Arc<JobStore>) -> Result<Self> {
        let identifier = LanguageIdentifier::new(config.detection.min_refinement_lines, config.detection.sample_lines);
        let library = Arc::new(FsLibrary::new(config.tools.clone(), identifier.clone()));

        let options = SyncOptions {
            timeout: Duration::from_secs(config.sync.timeout_seconds),
            max_offset_seconds: config.sync.max_offset_seconds,
            fast_mode: false,
        };
        let bulk_options = SyncOptions {
            timeout: Duration::from_secs(config.sync.bulk_timeout_seconds.min(config.sync.timeout_seconds)),
            fast_mode: config.sync.bulk_fast_mode,
            ..options.clone()
        };
        let tool = Arc::new(FfsubsyncTool::new(&config.sync.tool));
        let synchronizer = Synchronizer::new(tool, config.temp_dir().join("sync"), options);

        let merge = merge_config(&config.dual).context("Invalid [dual] configuration")?;
        let pipeline = DualPipeline::new(library.clone(), synchronizer.clone(), identifier, merge);
        let bulk_pipeline = pipeline.with_synchronizer(synchronizer.with_options(bulk_options));

        Ok(Self::new(store, library, pipeline, bulk_pipeline, &config.jobs))
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.inner.store
    }

    /// Create a pending job and start it in the background
    pub fn submit(&self, request: JobRequest) -> StoreResult<JobId> {
        let inner = Arc::clone(&self.inner);
        let id = inner.store.create(request.kind(), request.title())?;
        let cancel = inner.store.cancel_token(&id)?;

        info!(job_id = %id, kind = %request.kind(), "Job submitted");

        let job_id = id.clone();
        tokio::spawn(async move {
            let permit = match Arc::clone(&inner.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Scheduler closed before job could run");
                    return;
                }
            };

            // Run on an inner task so a panic is observed here instead of lost
            let worker = Arc::clone(&inner);
            let worker_id = job_id.clone();
            let failure = match tokio::spawn(async move { worker.execute(&worker_id, request, cancel).await }).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{e:#}")),
                Err(e) => Some(format!("job task aborted: {e}")),
            };

            if let Some(message) = failure {
                error!(job_id = %job_id, error = %message, "Job aborted");
                if let Err(store_err) = inner.store.fail(&job_id, message) {
                    warn!(job_id = %job_id, error = %store_err, "Could not record job failure");
                }
            }

            drop(permit);
        });

        Ok(id)
    }

    pub fn cancel(&self, id: &JobId) -> StoreResult<bool> {
        self.inner.store.cancel(id)
    }

    pub fn status(&self, id: &JobId) -> StoreResult<Job> {
        self.inner.store.get(id)
    }

    pub fn list(&self, status: Option<JobStatus>) -> StoreResult<Vec<Job>> {
        self.inner.store.list(status)
    }

    /// Poll until the job reaches a terminal state
    pub async fn wait(&self, id: &JobId, poll: Duration) -> StoreResult<Job> {
        loop {
            let job = self.status(id)?;
            if job.is_done() {
                return Ok(job);
            }
            tokio::time::sleep(poll).await;
        }
    }
}

impl Inner {
    async fn execute(&self, id: &JobId, request: JobRequest, cancel: CancelToken) -> Result<()> {
        if !self.store.start(id)? {
            info!(job_id = %id, "Job was cancelled before it started");
            return Ok(());
        }

        match request {
            JobRequest::Single(request) => self.run_single(id, request, cancel).await,
            JobRequest::Bulk(request) => self.run_bulk(id, request, cancel).await,
        }
    }

    async fn run_single(&self, id: &JobId, request: DualRequest, cancel: CancelToken) -> Result<()> {
        self.store
            .update_progress(id, JobProgress::new("Creating dual subtitle", &request.label, 0, 1))?;

        match self.pipeline.run(&request).await {
            Ok(outcome) => {
                let result = JobResult {
                    successful: vec![outcome.into_item(&request.item_id, &request.label)],
                    ..JobResult::default()
                };
                // The item is not interruptible; a request that arrived meanwhile
                // still ends the job as cancelled, with the item kept.
                if cancel.is_cancelled() {
                    self.store.mark_cancelled(id, result)?;
                } else {
                    self.store.complete(id, result)?;
                }
            }
            Err(e) => {
                warn!(job_id = %id, category = ?e.category(), error = %e, "Dual subtitle creation failed");
                self.store.fail(id, e.to_string())?;
            }
        }
        Ok(())
    }

    async fn run_bulk(&self, id: &JobId, request: BulkRequest, cancel: CancelToken) -> Result<()> {
        self.store
            .update_progress(id, JobProgress::new("Analyzing episodes", &request.show_id, 0, 0))?;

        if request.pair.is_degenerate() {
            self.store.fail(
                id,
                format!("primary and secondary language are both '{}'", request.pair.primary),
            )?;
            return Ok(());
        }

        let episodes = match self.library.show_episodes(&request.show_id).await {
            Ok(episodes) => episodes,
            Err(e) => {
                self.store.fail(id, format!("failed to list episodes: {e:#}"))?;
                return Ok(());
            }
        };

        let plan = worklist::plan(&request, &episodes);
        info!(
            job_id = %id,
            show = %plan.show_id,
            pair = %plan.pair,
            episodes = plan.total_episodes,
            worklist = plan.worklist.len(),
            skipped = plan.skipped.len(),
            "Bulk worklist ready"
        );

        let runner = BulkRunner::new(
            self.bulk_pipeline.clone(),
            Arc::clone(&self.store),
            self.episode_concurrency,
            self.eta_window,
        );
        let outcome = runner.run(id, plan, cancel).await?;
        let result = outcome.result;

        info!("=== Bulk Job Summary ===");
        info!("Job: {}", id);
        info!("Successful: {}", result.successful.len());
        info!("Failed: {}", result.failed.len());
        info!("Skipped: {}", result.skipped.len());
        info!("Cancelled: {}", outcome.cancelled);

        if outcome.cancelled {
            self.store.mark_cancelled(id, result)?;
        } else {
            self.store.complete(id, result)?;
        }
        Ok(())
    }
}

/// Slot styles from the `[dual]` section
pub fn merge_config(dual: &DualDefaults) -> Result<MergeConfig> {
    let position = |value: &str| value.parse::<Position>().map_err(anyhow::Error::msg);

    Ok(MergeConfig {
        primary: SlotStyle {
            position: position(&dual.primary_position).context("primary_position")?,
            color: dual.primary_color.clone(),
        },
        secondary: SlotStyle {
            position: position(&dual.secondary_position).context("secondary_position")?,
            color: dual.secondary_color.clone(),
        },
        language_prefix: dual.enable_language_prefix,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_config_from_defaults() -> Result<()> {
        let merge = merge_config(&DualDefaults::default())?;
        assert_eq!(merge, MergeConfig::default());
        Ok(())
    }

    #[test]
    fn test_merge_config_rejects_unknown_position() {
        let dual = DualDefaults {
            secondary_position: "middle".to_string(),
            ..DualDefaults::default()
        };
        assert!(merge_config(&dual).is_err());
    }

    #[tokio::test]
    async fn test_from_config_builds_scheduler() -> Result<()> {
        let temp_dir = tempfile::TempDir::new()?;
        let mut config = Config::default();
        config.data.root_dir = temp_dir.path().to_string_lossy().to_string();

        let scheduler = Scheduler::from_config(&config, Arc::new(JobStore::new()))?;
        assert!(scheduler.list(None)?.is_empty());
        Ok(())
    }
}
