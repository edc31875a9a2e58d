//! Job log repository.

use std::sync::Arc;

use crate::entities::{JobLog, job_log};
use courier_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};

/// Job log repository for database operations.
#[derive(Clone)]
pub struct JobLogRepository {
    db: Arc<DatabaseConnection>,
}

impl JobLogRepository {
    /// Create a new job log repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Append a log entry.
    pub async fn create(&self, model: job_log::ActiveModel) -> AppResult<job_log::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All entries for a job, oldest first.
    pub async fn find_by_job(&self, job_id: &str) -> AppResult<Vec<job_log::Model>> {
        JobLog::find()
            .filter(job_log::Column::JobId.eq(job_id))
            .order_by_asc(job_log::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::job_log::LogLevel;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_find_by_job() {
        let entry = job_log::Model {
            id: "log1".to_string(),
            job_id: "job1".to_string(),
            level: LogLevel::Error,
            message: "Attempt 1 failed".to_string(),
            metadata: None,
            created_at: Utc::now().into(),
        };

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[entry]])
                .into_connection(),
        );

        let repo = JobLogRepository::new(db);
        let result = repo.find_by_job("job1").await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].level, LogLevel::Error);
    }
}
