//! In-memory job store.
//!
//! The store is the single source of truth for job state. Every mutation goes
//! through one of its methods and happens under one lock, so a status reader
//! never observes a half-applied update and a progress tick cannot race a
//! cancellation request. Jobs live for the lifetime of the process.

use crate::models::*;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Errors returned by [`JobStore`] operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Receiving side of a job's cancellation signal
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that is never cancelled
    pub fn detached() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation has been requested.
    ///
    /// Never resolves if the job is dropped from the store without being cancelled.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

struct Entry {
    job: Job,
    cancel_tx: watch::Sender<bool>,
}

/// Job store shared between the scheduler and status readers
#[derive(Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<JobId, Entry>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<JobId, Entry>>> {
        self.jobs.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Create a pending job and return its id
    pub fn create(&self, kind: JobKind, title: impl Into<String>) -> StoreResult<JobId> {
        let job = Job::new(kind, title);
        let id = job.id.clone();
        let (cancel_tx, _rx) = watch::channel(false);

        let mut jobs = self.lock()?;
        debug!(job_id = %id, kind = %job.kind, title = %job.title, "Created job");
        jobs.insert(id.clone(), Entry { job, cancel_tx });

        Ok(id)
    }

    /// Snapshot of a job
    pub fn get(&self, id: &JobId) -> StoreResult<Job> {
        let jobs = self.lock()?;
        jobs.get(id)
            .map(|entry| entry.job.clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// All jobs, newest first, optionally filtered by status
    pub fn list(&self, status: Option<JobStatus>) -> StoreResult<Vec<Job>> {
        let jobs = self.lock()?;
        let mut listed: Vec<Job> = jobs
            .values()
            .filter(|entry| status.map_or(true, |s| entry.job.status == s))
            .map(|entry| entry.job.clone())
            .collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listed)
    }

    /// Pending and running jobs
    pub fn active(&self) -> StoreResult<Vec<Job>> {
        Ok(self
            .list(None)?
            .into_iter()
            .filter(|job| job.status.is_active())
            .collect())
    }

    /// Watch a job's cancellation signal
    pub fn cancel_token(&self, id: &JobId) -> StoreResult<CancelToken> {
        let jobs = self.lock()?;
        let entry = jobs.get(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        Ok(CancelToken {
            rx: entry.cancel_tx.subscribe(),
        })
    }

    /// Move a pending job to running.
    ///
    /// Returns `false` when the job was cancelled before it was picked up; the
    /// caller must then not run it.
    pub fn start(&self, id: &JobId) -> StoreResult<bool> {
        let mut jobs = self.lock()?;
        let job = job_mut(&mut jobs, id)?;

        match job.status {
            JobStatus::Pending => {
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
                job.progress = JobProgress::new("Initializing", "", 0, job.progress.total);
                info!(job_id = %id, "Job started");
                Ok(true)
            }
            JobStatus::Cancelled => Ok(false),
            from => Err(StoreError::InvalidTransition {
                id: id.clone(),
                from,
                to: JobStatus::Running,
            }),
        }
    }

    /// Replace the progress snapshot of a running job.
    ///
    /// An update whose processed count is lower than the stored one is stale and
    /// ignored; `processed` is clamped to `total`. Returns whether it was applied.
    pub fn update_progress(&self, id: &JobId, mut progress: JobProgress) -> StoreResult<bool> {
        let mut jobs = self.lock()?;
        let job = job_mut(&mut jobs, id)?;

        if job.status != JobStatus::Running {
            debug!(job_id = %id, status = %job.status, "Ignoring progress for inactive job");
            return Ok(false);
        }
        if progress.processed < job.progress.processed {
            debug!(
                job_id = %id,
                stored = job.progress.processed,
                update = progress.processed,
                "Ignoring stale progress update"
            );
            return Ok(false);
        }

        if progress.total > 0 && progress.processed > progress.total {
            progress = JobProgress {
                processed: progress.total,
                percentage: 100.0,
                ..progress
            };
        }

        debug!(
            job_id = %id,
            step = %progress.current_step,
            processed = progress.processed,
            total = progress.total,
            "Updated job progress"
        );
        job.progress = progress;
        Ok(true)
    }

    /// Mark a running job completed with its result
    pub fn complete(&self, id: &JobId, result: JobResult) -> StoreResult<()> {
        let mut jobs = self.lock()?;
        let job = job_mut(&mut jobs, id)?;
        ensure_running(job, JobStatus::Completed)?;

        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.progress.current_step = "Completed".to_string();
        job.progress.current_item = String::new();
        job.progress.processed = job.progress.total;
        job.progress.percentage = 100.0;
        job.progress.estimated_time_remaining = Some("0s".to_string());

        info!(
            job_id = %id,
            successful = result.successful.len(),
            failed = result.failed.len(),
            skipped = result.skipped.len(),
            "Job completed"
        );
        job.result = Some(result);
        Ok(())
    }

    /// Mark a running job failed
    pub fn fail(&self, id: &JobId, error: impl Into<String>) -> StoreResult<()> {
        let error = error.into();
        let mut jobs = self.lock()?;
        let job = job_mut(&mut jobs, id)?;
        ensure_running(job, JobStatus::Failed)?;

        job.status = JobStatus::Failed;
        job.completed_at = Some(Utc::now());
        job.progress.current_step = "Failed".to_string();

        warn!(job_id = %id, error = %error, "Job failed");
        job.error = Some(error);
        Ok(())
    }

    /// Request cancellation.
    ///
    /// A pending job is cancelled immediately. A running job keeps running until
    /// the orchestrator observes the request and calls [`JobStore::mark_cancelled`].
    /// Returns `false` for a job that is already terminal.
    pub fn cancel(&self, id: &JobId) -> StoreResult<bool> {
        let mut jobs = self.lock()?;
        let entry = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let job = &mut entry.job;

        match job.status {
            JobStatus::Pending => {
                job.status = JobStatus::Cancelled;
                job.cancel_requested = true;
                job.completed_at = Some(Utc::now());
                job.progress.current_step = "Cancelled".to_string();
                job.result = Some(JobResult::default());
                info!(job_id = %id, "Pending job cancelled");
            }
            JobStatus::Running => {
                job.cancel_requested = true;
                info!(job_id = %id, "Cancellation requested for running job");
            }
            _ => return Ok(false),
        }

        entry.cancel_tx.send_replace(true);
        Ok(true)
    }

    /// Move a running job to cancelled, keeping its partial result
    pub fn mark_cancelled(&self, id: &JobId, partial: JobResult) -> StoreResult<()> {
        let mut jobs = self.lock()?;
        let job = job_mut(&mut jobs, id)?;
        ensure_running(job, JobStatus::Cancelled)?;

        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        job.progress.current_step = "Cancelled".to_string();
        job.progress.current_item = String::new();

        info!(
            job_id = %id,
            successful = partial.successful.len(),
            failed = partial.failed.len(),
            "Job cancelled with partial result"
        );
        job.result = Some(partial);
        Ok(())
    }

    /// Drop a terminal job from the store
    pub fn remove(&self, id: &JobId) -> StoreResult<Job> {
        let mut jobs = self.lock()?;
        let status = jobs
            .get(id)
            .map(|entry| entry.job.status)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if status.is_active() {
            return Err(StoreError::InvalidTransition {
                id: id.clone(),
                from: status,
                to: JobStatus::Cancelled,
            });
        }

        let entry = jobs
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        debug!(job_id = %id, "Removed job");
        Ok(entry.job)
    }
}

fn job_mut<'a>(jobs: &'a mut HashMap<JobId, Entry>, id: &JobId) -> StoreResult<&'a mut Job> {
    jobs.get_mut(id)
        .map(|entry| &mut entry.job)
        .ok_or_else(|| StoreError::NotFound(id.clone()))
}

fn ensure_running(job: &Job, to: JobStatus) -> StoreResult<()> {
    if job.status == JobStatus::Running {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            id: job.id.clone(),
            from: job.status,
            to,
        })
    }
}
