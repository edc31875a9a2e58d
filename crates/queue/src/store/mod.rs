//! Persistence ports for jobs, rate limit counters and drip sequences.
//!
//! The PostgreSQL adapters wrap the `courier-db` repositories. The memory
//! adapters back tests and database-less development, and
//! [`MemoryCounterStore`] doubles as the rate limiter's fallback tier.

mod memory;
mod postgres;

pub use memory::{MemoryCounterStore, MemoryJobStore, MemorySequenceStore};
pub use postgres::{PgCounterStore, PgJobStore, PgSequenceStore};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use courier_common::AppResult;
use courier_db::entities::job::JobStatus;
use courier_db::entities::{email_sequence, job, job_log};

use crate::rate_limit::RateLimitResult;

/// Durable storage for jobs and their logs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job.
    async fn insert(&self, job: job::Model) -> AppResult<job::Model>;

    /// Look up a job.
    async fn find(&self, id: &str) -> AppResult<Option<job::Model>>;

    /// Pending, due jobs with attempts left, highest priority first, then
    /// earliest schedule first.
    async fn find_claimable(&self, now: DateTime<Utc>, limit: u64) -> AppResult<Vec<job::Model>>;

    /// Mark a selected job processing and count the attempt.
    async fn claim(&self, job: &job::Model, now: DateTime<Utc>) -> AppResult<job::Model>;

    /// Mark a job completed.
    async fn complete(&self, id: &str, now: DateTime<Utc>) -> AppResult<()>;

    /// Return a job to pending after a failed attempt.
    async fn release(&self, id: &str, error: &str, retry_at: DateTime<Utc>) -> AppResult<()>;

    /// Mark a job permanently failed.
    async fn fail(&self, id: &str, error: &str) -> AppResult<()>;

    /// Cancel a job if it is pending. Returns whether it was.
    async fn cancel_pending(&self, id: &str) -> AppResult<bool>;

    /// Reset a failed job to pending with no attempts. Returns whether it was failed.
    async fn requeue_failed(&self, id: &str, now: DateTime<Utc>) -> AppResult<bool>;

    /// Delete completed, failed and cancelled jobs created before `cutoff`.
    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;

    /// Number of jobs in a status.
    async fn count_by_status(&self, status: JobStatus) -> AppResult<u64>;

    /// Append a log entry.
    async fn append_log(&self, entry: job_log::Model) -> AppResult<()>;

    /// Log entries of a job, oldest first.
    async fn logs(&self, job_id: &str) -> AppResult<Vec<job_log::Model>>;
}

/// Storage for fixed-window rate limit counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count one request against `key` and report the decision.
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<RateLimitResult>;

    /// Remove counters whose window ended before `now`.
    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

/// Storage for drip sequence progress.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Persist a new sequence.
    async fn insert(
        &self,
        sequence: email_sequence::Model,
    ) -> AppResult<email_sequence::Model>;

    /// Look up a sequence.
    async fn find(&self, id: &str) -> AppResult<Option<email_sequence::Model>>;

    /// Look up a subscriber's sequence of a given type.
    async fn find_by_subscriber(
        &self,
        subscriber_email: &str,
        sequence_type: &str,
    ) -> AppResult<Option<email_sequence::Model>>;

    /// List sequences, oldest first.
    async fn list(&self, limit: u64) -> AppResult<Vec<email_sequence::Model>>;

    /// Move a sequence to `step`, completing it when `step` reaches the end.
    async fn set_step(
        &self,
        sequence: email_sequence::Model,
        step: i32,
        now: DateTime<Utc>,
    ) -> AppResult<email_sequence::Model>;
}
