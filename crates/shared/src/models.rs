//! Data models for background jobs.
//!
//! A job is one unit of background work: a single dual subtitle, or a bulk run
//! across every episode of a show. These types are what status readers see.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Opaque job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Kind of work a job performs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    SingleDual,
    BulkDual,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::SingleDual => write!(f, "single_dual"),
            JobKind::BulkDual => write!(f, "bulk_dual"),
        }
    }
}

/// Job lifecycle status
///
/// `Pending -> Running -> {Completed, Failed, Cancelled}`; a pending job may
/// also be cancelled before it ever runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// Progress snapshot of a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub current_step: String,
    pub current_item: String,
    pub processed: usize,
    pub total: usize,
    pub percentage: f64,
    pub estimated_time_remaining: Option<String>,
}

impl JobProgress {
    /// Build a snapshot, deriving the percentage from processed/total
    pub fn new(
        current_step: impl Into<String>,
        current_item: impl Into<String>,
        processed: usize,
        total: usize,
    ) -> Self {
        Self {
            current_step: current_step.into(),
            current_item: current_item.into(),
            processed,
            total,
            percentage: percentage(processed, total),
            estimated_time_remaining: None,
        }
    }

    pub fn with_eta(mut self, eta: impl Into<String>) -> Self {
        self.estimated_time_remaining = Some(eta.into());
        self
    }
}

fn percentage(processed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = processed.min(total) as f64 / total as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}

/// Why an item was not processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// A dual subtitle for the same pair (in either order) is already present
    AlreadyExists { path: Option<PathBuf> },
    /// A requested language has no source on this item
    MissingLanguage { languages: Vec<String> },
    /// Excluded by the per-episode configuration
    Excluded,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AlreadyExists { .. } => write!(f, "dual subtitle already exists"),
            SkipReason::MissingLanguage { languages } => {
                write!(f, "missing subtitle language(s): {}", languages.join(", "))
            }
            SkipReason::Excluded => write!(f, "excluded by configuration"),
        }
    }
}

/// Item that produced a dual subtitle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SucceededItem {
    pub item_id: String,
    pub label: String,
    pub output_path: PathBuf,
    pub cue_count: usize,
    /// True when at least one source was an embedded stream
    pub used_embedded: bool,
    /// Degradations that did not stop the item, e.g. a synchronization timeout
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Item that could not be processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub item_id: String,
    pub label: String,
    pub error: String,
}

/// Item that was deliberately not processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub item_id: String,
    pub label: String,
    pub reason: SkipReason,
}

/// Outcome lists of a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub successful: Vec<SucceededItem>,
    pub failed: Vec<FailedItem>,
    pub skipped: Vec<SkippedItem>,
}

impl JobResult {
    pub fn is_empty(&self) -> bool {
        self.successful.is_empty() && self.failed.is_empty() && self.skipped.is_empty()
    }

    /// Number of items the job has an outcome for
    pub fn item_count(&self) -> usize {
        self.successful.len() + self.failed.len() + self.skipped.len()
    }
}

/// A job record as seen by status readers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub title: String,
    pub status: JobStatus,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub progress: JobProgress,

    /// Set once the job is terminal; partial for cancelled jobs
    pub result: Option<JobResult>,

    /// Terminal error text for failed jobs
    pub error: Option<String>,

    /// A cancellation was requested while the job was running
    #[serde(default)]
    pub cancel_requested: bool,
}

impl Job {
    pub fn new(kind: JobKind, title: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            kind,
            title: title.into(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: JobProgress::default(),
            result: None,
            error: None,
            cancel_requested: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_creation() {
        let job = Job::new(JobKind::BulkDual, "Bulk: Frieren");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.id.as_str().len(), 36);
        assert!(job.started_at.is_none());
        assert!(job.result.is_none());
        assert!(!job.is_done());
    }

    #[test]
    fn test_progress_percentage() {
        assert_eq!(JobProgress::new("Processing", "", 5, 10).percentage, 50.0);
        assert_eq!(JobProgress::new("Processing", "", 1, 3).percentage, 33.3);
        assert_eq!(JobProgress::new("Processing", "", 5, 0).percentage, 0.0);
    }

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_job_serializes_full_shape() {
        let mut job = Job::new(JobKind::SingleDual, "Dual: movie");
        job.progress = JobProgress::new("Merging", "movie", 0, 1);
        let value = serde_json::to_value(&job).unwrap();

        assert_eq!(value["kind"], "single_dual");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["progress"]["current_step"], "Merging");
        assert!(value.get("result").is_some());
    }

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::MissingLanguage {
            languages: vec!["ja".to_string(), "en".to_string()],
        };
        assert_eq!(reason.to_string(), "missing subtitle language(s): ja, en");
        let value = serde_json::to_value(&reason).unwrap();
        assert_eq!(value["kind"], "missing_language");
    }
}
