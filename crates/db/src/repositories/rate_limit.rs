//! Rate limit counter repository.

use std::sync::Arc;

use crate::entities::{RateLimit, rate_limit};
use chrono::{DateTime, Utc};
use courier_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

/// Rate limit counter repository for database operations.
#[derive(Clone)]
pub struct RateLimitRepository {
    db: Arc<DatabaseConnection>,
}

impl RateLimitRepository {
    /// Create a new rate limit repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find the counter for a key.
    pub async fn find(&self, key: &str) -> AppResult<Option<rate_limit::Model>> {
        RateLimit::find_by_id(key)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Write the counter for a key, creating it if absent.
    pub async fn save(
        &self,
        key: &str,
        count: i32,
        reset_at: DateTime<Utc>,
    ) -> AppResult<rate_limit::Model> {
        let existing = self.find(key).await?;

        let result = if let Some(model) = existing {
            let mut active: rate_limit::ActiveModel = model.into();
            active.count = Set(count);
            active.reset_at = Set(reset_at.into());
            active.update(self.db.as_ref()).await
        } else {
            rate_limit::ActiveModel {
                key: Set(key.to_string()),
                count: Set(count),
                reset_at: Set(reset_at.into()),
            }
            .insert(self.db.as_ref())
            .await
        };

        result.map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete counters whose window ended before `now`.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = RateLimit::delete_many()
            .filter(rate_limit::Column::ResetAt.lt(now))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_counter(key: &str, count: i32) -> rate_limit::Model {
        rate_limit::Model {
            key: key.to_string(),
            count,
            reset_at: (Utc::now() + Duration::seconds(60)).into(),
        }
    }

    #[tokio::test]
    async fn test_save_inserts_new_counter() {
        let counter = create_test_counter("subscribe:abc", 1);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<rate_limit::Model>::new()])
                .append_query_results([[counter.clone()]])
                .into_connection(),
        );

        let repo = RateLimitRepository::new(db);
        let result = repo
            .save("subscribe:abc", 1, counter.reset_at.into())
            .await
            .unwrap();

        assert_eq!(result.count, 1);
    }

    #[tokio::test]
    async fn test_save_updates_existing_counter() {
        let counter = create_test_counter("subscribe:abc", 2);
        let updated = rate_limit::Model {
            count: 3,
            ..counter.clone()
        };

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[counter.clone()]])
                .append_query_results([[updated]])
                .into_connection(),
        );

        let repo = RateLimitRepository::new(db);
        let result = repo
            .save("subscribe:abc", 3, counter.reset_at.into())
            .await
            .unwrap();

        assert_eq!(result.count, 3);
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                }])
                .into_connection(),
        );

        let repo = RateLimitRepository::new(db);

        assert_eq!(repo.delete_expired(Utc::now()).await.unwrap(), 2);
    }
}
