//! Job queue: producer and operator operations over a [`JobStore`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use courier_common::{AppError, AppResult, IdGenerator};
use courier_db::entities::job::{JobStatus, JobType};
use courier_db::entities::job_log::LogLevel;
use courier_db::entities::{job, job_log};
use serde::Serialize;
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::jobs::{self, JobPayload};
use crate::retry::RetryPolicy;
use crate::store::JobStore;

/// Stored error messages are cut to this many characters.
pub const MAX_ERROR_LEN: usize = 1000;

/// Default attempt budget for a job.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Options for [`JobQueue::enqueue`].
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Dispatch priority, higher first. Defaults to 0.
    pub priority: Option<i32>,
    /// Attempt budget. Defaults to 3; must be at least 1.
    pub max_attempts: Option<i32>,
    /// Earliest dispatch time. Defaults to now.
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl EnqueueOptions {
    /// Set the priority.
    #[must_use]
    pub const fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the attempt budget.
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay dispatch until `at`.
    #[must_use]
    pub const fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }
}

/// Number of jobs in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

/// Cut an error message to [`MAX_ERROR_LEN`] characters.
#[must_use]
pub fn truncate_error(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_LEN) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

/// Durable, retrying job queue.
#[derive(Clone)]
pub struct JobQueue {
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) retry: RetryPolicy,
    id_gen: IdGenerator,
}

impl JobQueue {
    /// Create a queue over a job store.
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
            id_gen: IdGenerator::new(),
        }
    }

    /// Use a different time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a retry policy other than immediate retry.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Add a job. Returns its id.
    ///
    /// The payload is checked against the job type before anything is
    /// written; a bad payload never reaches the store.
    pub async fn enqueue(
        &self,
        job_type: JobType,
        payload: Value,
        options: EnqueueOptions,
    ) -> AppResult<String> {
        let max_attempts = options.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts < 1 {
            return Err(AppError::Validation(format!(
                "max_attempts must be at least 1, got {max_attempts}"
            )));
        }
        jobs::validate_payload(job_type, &payload)?;

        let now = self.clock.now();
        let job = job::Model {
            id: self.id_gen.generate(),
            job_type,
            payload,
            status: JobStatus::Pending,
            priority: options.priority.unwrap_or(0),
            attempts: 0,
            max_attempts,
            scheduled_at: options.scheduled_at.unwrap_or(now).into(),
            started_at: None,
            completed_at: None,
            error: None,
            created_at: now.into(),
        };

        let job = self.store.insert(job).await?;
        tracing::debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            priority = job.priority,
            "Job enqueued"
        );
        Ok(job.id)
    }

    /// Add a job from a typed payload.
    pub async fn enqueue_job<T: JobPayload>(
        &self,
        payload: &T,
        options: EnqueueOptions,
    ) -> AppResult<String> {
        let value = serde_json::to_value(payload)?;
        self.enqueue(T::JOB_TYPE, value, options).await
    }

    /// Get a job.
    pub async fn get(&self, id: &str) -> AppResult<job::Model> {
        self.store
            .find(id)
            .await?
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))
    }

    /// Log entries of a job, oldest first.
    pub async fn logs(&self, id: &str) -> AppResult<Vec<job_log::Model>> {
        self.store.logs(id).await
    }

    /// Number of jobs in each status.
    pub async fn counts(&self) -> AppResult<JobCounts> {
        Ok(JobCounts {
            pending: self.store.count_by_status(JobStatus::Pending).await?,
            processing: self.store.count_by_status(JobStatus::Processing).await?,
            completed: self.store.count_by_status(JobStatus::Completed).await?,
            failed: self.store.count_by_status(JobStatus::Failed).await?,
            cancelled: self.store.count_by_status(JobStatus::Cancelled).await?,
        })
    }

    /// Cancel a pending job. Jobs in any other status are left alone.
    ///
    /// Returns whether the job was cancelled.
    pub async fn cancel(&self, id: &str) -> AppResult<bool> {
        let cancelled = self.store.cancel_pending(id).await?;
        if cancelled {
            self.log(id, LogLevel::Info, "Job cancelled", None).await;
        }
        Ok(cancelled)
    }

    /// Give a failed job a fresh attempt budget and make it pending again.
    ///
    /// Returns whether the job was failed and has been requeued.
    pub async fn requeue(&self, id: &str) -> AppResult<bool> {
        let requeued = self.store.requeue_failed(id, self.clock.now()).await?;
        if requeued {
            self.log(id, LogLevel::Warn, "Failed job requeued by operator", None)
                .await;
        }
        Ok(requeued)
    }

    /// Delete terminal jobs created more than `days_old` days ago.
    ///
    /// Pending and processing jobs are never deleted.
    pub async fn cleanup(&self, days_old: u32) -> AppResult<u64> {
        let cutoff = self.clock.now() - Duration::days(i64::from(days_old));
        let deleted = self.store.delete_terminal_before(cutoff).await?;
        if deleted > 0 {
            tracing::info!(count = deleted, days_old, "Cleaned up old jobs");
        }
        Ok(deleted)
    }

    /// Append a log entry. Logging failures are reported but never fail the
    /// operation that produced them.
    pub(crate) async fn log(
        &self,
        job_id: &str,
        level: LogLevel,
        message: &str,
        metadata: Option<Value>,
    ) {
        let entry = job_log::Model {
            id: self.id_gen.generate(),
            job_id: job_id.to_string(),
            level,
            message: message.to_string(),
            metadata,
            created_at: self.clock.now().into(),
        };
        if let Err(e) = self.store.append_log(entry).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to write job log");
        }
    }
}
