//! Bulk execution of a planned worklist.
//!
//! Items run through the pipeline with at most `concurrency` in flight. The
//! loop waits on either the next finished item or the job's cancellation
//! signal; once cancelled it schedules nothing new and drains what is already
//! running, so no external process is abandoned mid-flight.

use crate::pipeline::{DualPipeline, PipelineError};
use crate::worklist::BulkPlan;
use futures::stream::{FuturesUnordered, StreamExt};
use shared::models::{FailedItem, JobId, JobProgress, JobResult, SkipReason, SkippedItem};
use shared::store::{CancelToken, JobStore, StoreResult};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

pub const STEP_CREATING: &str = "Creating dual subtitles";

/// Rolling estimate of the time left, from recent item durations
#[derive(Debug, Clone)]
pub struct EtaEstimator {
    window: usize,
    samples: VecDeque<Duration>,
}

impl EtaEstimator {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            samples: VecDeque::new(),
        }
    }

    pub fn record(&mut self, elapsed: Duration) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(elapsed);
    }

    /// Time left for `remaining` items, `None` before the first sample
    pub fn estimate(&self, remaining: usize) -> Option<Duration> {
        if remaining == 0 {
            return Some(Duration::ZERO);
        }
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        let average = total / self.samples.len() as u32;
        Some(average * remaining as u32)
    }

    pub fn render(&self, remaining: usize) -> String {
        match self.estimate(remaining) {
            None => "Calculating...".to_string(),
            Some(eta) => format_eta(eta),
        }
    }
}

/// `"2m 5s"`, `"42s"` or `"0s"`
pub fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

/// Result of a bulk run; `cancelled` runs carry a partial result
#[derive(Debug, Clone)]
pub struct BulkOutcome {
    pub result: JobResult,
    pub cancelled: bool,
}

pub struct BulkRunner {
    pipeline: DualPipeline,
    store: Arc<JobStore>,
    concurrency: usize,
    eta_window: usize,
}

impl BulkRunner {
    pub fn new(pipeline: DualPipeline, store: Arc<JobStore>, concurrency: usize, eta_window: usize) -> Self {
        Self {
            pipeline,
            store,
            concurrency: concurrency.max(1),
            eta_window,
        }
    }

    pub async fn run(&self, job_id: &JobId, plan: BulkPlan, mut cancel: CancelToken) -> StoreResult<BulkOutcome> {
        let total = plan.worklist.len();
        let mut result = JobResult {
            skipped: plan.skipped,
            ..JobResult::default()
        };
        let mut eta = EtaEstimator::new(self.eta_window);
        let mut processed = 0;
        let mut cancelled = cancel.is_cancelled();

        let mut pending = plan.worklist.into_iter();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while !cancelled && in_flight.len() < self.concurrency {
                let Some(request) = pending.next() else {
                    break;
                };
                self.store.update_progress(
                    job_id,
                    JobProgress::new(STEP_CREATING, &request.label, processed, total).with_eta(eta.render(total - processed)),
                )?;

                let pipeline = self.pipeline.clone();
                let task_request = request.clone();
                in_flight.push(async move {
                    let started = Instant::now();
                    // A panicking episode becomes a failed item, not a stuck job
                    let outcome = tokio::spawn(async move { pipeline.run(&task_request).await }).await;
                    (request, outcome, started.elapsed())
                });
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                Some((request, outcome, elapsed)) = in_flight.next() => {
                    processed += 1;
                    eta.record(elapsed);

                    match outcome {
                        Ok(Ok(outcome)) => {
                            result.successful.push(outcome.into_item(&request.item_id, &request.label));
                        }
                        Ok(Err(PipelineError::AlreadyExists { path })) => {
                            info!(job_id = %job_id, episode = %request.label, "Dual subtitle appeared during the run, skipping");
                            result.skipped.push(SkippedItem {
                                item_id: request.item_id.clone(),
                                label: request.label.clone(),
                                reason: SkipReason::AlreadyExists { path: Some(path) },
                            });
                        }
                        Ok(Err(e)) => {
                            warn!(job_id = %job_id, episode = %request.label, error = %e, "Episode failed");
                            result.failed.push(FailedItem {
                                item_id: request.item_id.clone(),
                                label: request.label.clone(),
                                error: e.to_string(),
                            });
                        }
                        Err(e) => {
                            error!(job_id = %job_id, episode = %request.label, error = %e, "Episode task aborted");
                            result.failed.push(FailedItem {
                                item_id: request.item_id.clone(),
                                label: request.label.clone(),
                                error: format!("episode task aborted: {e}"),
                            });
                        }
                    }

                    self.store.update_progress(
                        job_id,
                        JobProgress::new(STEP_CREATING, &request.label, processed, total)
                            .with_eta(eta.render(total - processed)),
                    )?;
                }
                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    info!(
                        job_id = %job_id,
                        processed,
                        in_flight = in_flight.len(),
                        "Cancellation requested, finishing in-flight episodes"
                    );
                }
                else => break,
            }
        }

        Ok(BulkOutcome { result, cancelled })
    }
}
