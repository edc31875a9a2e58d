//! PostgreSQL adapters over the `courier-db` repositories.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use courier_common::AppResult;
use courier_db::entities::job::JobStatus;
use courier_db::entities::{email_sequence, job, job_log};
use courier_db::repositories::{
    EmailSequenceRepository, JobLogRepository, JobRepository, RateLimitRepository,
};
use sea_orm::{ActiveModelTrait, DatabaseConnection};

use super::{CounterStore, JobStore, SequenceStore};
use crate::rate_limit::{Counter, RateLimitResult, apply_hit};

/// Job store backed by the `jobs` and `job_logs` tables.
#[derive(Clone)]
pub struct PgJobStore {
    jobs: JobRepository,
    logs: JobLogRepository,
}

impl PgJobStore {
    /// Create a new job store.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            jobs: JobRepository::new(db.clone()),
            logs: JobLogRepository::new(db),
        }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: job::Model) -> AppResult<job::Model> {
        self.jobs.create(job::ActiveModel::from(job).reset_all()).await
    }

    async fn find(&self, id: &str) -> AppResult<Option<job::Model>> {
        self.jobs.find_by_id(id).await
    }

    async fn find_claimable(&self, now: DateTime<Utc>, limit: u64) -> AppResult<Vec<job::Model>> {
        self.jobs.find_claimable(now, limit).await
    }

    async fn claim(&self, job: &job::Model, now: DateTime<Utc>) -> AppResult<job::Model> {
        self.jobs.claim(job, now).await
    }

    async fn complete(&self, id: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.jobs.mark_completed(id, now).await.map(drop)
    }

    async fn release(&self, id: &str, error: &str, retry_at: DateTime<Utc>) -> AppResult<()> {
        self.jobs.release(id, error, retry_at).await.map(drop)
    }

    async fn fail(&self, id: &str, error: &str) -> AppResult<()> {
        self.jobs.mark_failed(id, error).await.map(drop)
    }

    async fn cancel_pending(&self, id: &str) -> AppResult<bool> {
        self.jobs.cancel_pending(id).await
    }

    async fn requeue_failed(&self, id: &str, now: DateTime<Utc>) -> AppResult<bool> {
        self.jobs.requeue_failed(id, now).await
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        self.jobs.delete_terminal_before(cutoff).await
    }

    async fn count_by_status(&self, status: JobStatus) -> AppResult<u64> {
        self.jobs.count_by_status(status).await
    }

    async fn append_log(&self, entry: job_log::Model) -> AppResult<()> {
        self.logs
            .create(job_log::ActiveModel::from(entry).reset_all())
            .await
            .map(drop)
    }

    async fn logs(&self, job_id: &str) -> AppResult<Vec<job_log::Model>> {
        self.logs.find_by_job(job_id).await
    }
}

/// Counter store backed by the `rate_limits` table.
///
/// Read and write are separate statements, so concurrent requests for one
/// key can undercount. The window is approximate by nature.
#[derive(Clone)]
pub struct PgCounterStore {
    repo: RateLimitRepository,
}

impl PgCounterStore {
    /// Create a new counter store.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            repo: RateLimitRepository::new(db),
        }
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<RateLimitResult> {
        let existing = self.repo.find(key).await?.map(|m| Counter {
            count: m.count.max(0) as u32,
            reset_at: m.reset_at.into(),
        });

        let (result, write) = apply_hit(existing, limit, window, now);
        if let Some(counter) = write {
            self.repo
                .save(key, stored_count(counter.count), counter.reset_at)
                .await?;
        }

        Ok(result)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.repo.delete_expired(now).await
    }
}

/// Column value for a counter. The column is `i32`; larger limits clamp.
fn stored_count(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

/// Sequence store backed by the `email_sequences` table.
#[derive(Clone)]
pub struct PgSequenceStore {
    repo: EmailSequenceRepository,
}

impl PgSequenceStore {
    /// Create a new sequence store.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            repo: EmailSequenceRepository::new(db),
        }
    }
}

#[async_trait]
impl SequenceStore for PgSequenceStore {
    async fn insert(
        &self,
        sequence: email_sequence::Model,
    ) -> AppResult<email_sequence::Model> {
        self.repo
            .create(email_sequence::ActiveModel::from(sequence).reset_all())
            .await
    }

    async fn find(&self, id: &str) -> AppResult<Option<email_sequence::Model>> {
        self.repo.find_by_id(id).await
    }

    async fn find_by_subscriber(
        &self,
        subscriber_email: &str,
        sequence_type: &str,
    ) -> AppResult<Option<email_sequence::Model>> {
        self.repo
            .find_by_subscriber(subscriber_email, sequence_type)
            .await
    }

    async fn list(&self, limit: u64) -> AppResult<Vec<email_sequence::Model>> {
        self.repo.find_all(limit).await
    }

    async fn set_step(
        &self,
        sequence: email_sequence::Model,
        step: i32,
        now: DateTime<Utc>,
    ) -> AppResult<email_sequence::Model> {
        self.repo.set_step(sequence, step, now).await
    }
}
