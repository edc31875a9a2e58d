//! Job repository.

use std::sync::Arc;

use crate::entities::job::JobStatus;
use crate::entities::{Job, job};
use chrono::{DateTime, Utc};
use courier_common::{AppError, AppResult};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};

/// Job repository for database operations.
#[derive(Clone)]
pub struct JobRepository {
    db: Arc<DatabaseConnection>,
}

impl JobRepository {
    /// Create a new job repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a job by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<job::Model>> {
        Job::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a job by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<job::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))
    }

    /// Find jobs eligible for dispatch at `now`.
    ///
    /// Eligible means pending, due, and with attempts left. Ordered by
    /// priority (highest first), then by schedule (earliest first).
    pub async fn find_claimable(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<job::Model>> {
        Job::find()
            .filter(job::Column::Status.eq(JobStatus::Pending))
            .filter(job::Column::ScheduledAt.lte(now))
            .filter(Expr::col(job::Column::Attempts).lt(Expr::col(job::Column::MaxAttempts)))
            .order_by_desc(job::Column::Priority)
            .order_by_asc(job::Column::ScheduledAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new job.
    pub async fn create(&self, model: job::ActiveModel) -> AppResult<job::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a job.
    pub async fn update(&self, model: job::ActiveModel) -> AppResult<job::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Claim a selected job: mark it processing and count the attempt.
    ///
    /// This is a plain update computed from the selected snapshot, not a
    /// compare-and-set. Two dispatchers racing on the same job both win.
    pub async fn claim(&self, job: &job::Model, now: DateTime<Utc>) -> AppResult<job::Model> {
        let mut active: job::ActiveModel = job.clone().into();
        active.status = Set(JobStatus::Processing);
        active.attempts = Set(job.attempts + 1);
        active.started_at = Set(job.started_at.or_else(|| Some(now.into())));
        self.update(active).await
    }

    /// Mark a job as completed.
    pub async fn mark_completed(&self, id: &str, now: DateTime<Utc>) -> AppResult<job::Model> {
        let job = self.get_by_id(id).await?;
        let mut active: job::ActiveModel = job.into();
        active.status = Set(JobStatus::Completed);
        active.completed_at = Set(Some(now.into()));
        self.update(active).await
    }

    /// Return a failed attempt to the pending pool, eligible from `retry_at`.
    pub async fn release(
        &self,
        id: &str,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> AppResult<job::Model> {
        let job = self.get_by_id(id).await?;
        let mut active: job::ActiveModel = job.into();
        active.status = Set(JobStatus::Pending);
        active.error = Set(Some(error.to_string()));
        active.scheduled_at = Set(retry_at.into());
        self.update(active).await
    }

    /// Mark a job as permanently failed.
    pub async fn mark_failed(&self, id: &str, error: &str) -> AppResult<job::Model> {
        let job = self.get_by_id(id).await?;
        let mut active: job::ActiveModel = job.into();
        active.status = Set(JobStatus::Failed);
        active.error = Set(Some(error.to_string()));
        self.update(active).await
    }

    /// Cancel a job if it is still pending. Returns whether it was cancelled.
    pub async fn cancel_pending(&self, id: &str) -> AppResult<bool> {
        let result = Job::update_many()
            .col_expr(
                job::Column::Status,
                Expr::value(JobStatus::Cancelled.to_value()),
            )
            .filter(job::Column::Id.eq(id))
            .filter(job::Column::Status.eq(JobStatus::Pending))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    /// Put a dead-lettered job back in the pending pool with a fresh attempt
    /// budget. Returns whether the job was failed and has been requeued.
    pub async fn requeue_failed(&self, id: &str, now: DateTime<Utc>) -> AppResult<bool> {
        let result = Job::update_many()
            .col_expr(job::Column::Status, Expr::value(JobStatus::Pending.to_value()))
            .col_expr(job::Column::Attempts, Expr::value(0))
            .col_expr(job::Column::ScheduledAt, Expr::value(now))
            .filter(job::Column::Id.eq(id))
            .filter(job::Column::Status.eq(JobStatus::Failed))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    /// Delete terminal jobs created before `cutoff`. Their logs cascade.
    pub async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = Job::delete_many()
            .filter(job::Column::Status.is_in(JobStatus::terminal()))
            .filter(job::Column::CreatedAt.lt(cutoff))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Count jobs in a given status.
    pub async fn count_by_status(&self, status: JobStatus) -> AppResult<u64> {
        Job::find()
            .filter(job::Column::Status.eq(status))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
