//! Email sequence repository.

use std::sync::Arc;

use crate::entities::email_sequence::SequenceStatus;
use crate::entities::{EmailSequence, email_sequence};
use chrono::{DateTime, Utc};
use courier_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

/// Email sequence repository for database operations.
#[derive(Clone)]
pub struct EmailSequenceRepository {
    db: Arc<DatabaseConnection>,
}

impl EmailSequenceRepository {
    /// Create a new email sequence repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a sequence by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<email_sequence::Model>> {
        EmailSequence::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a sequence by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<email_sequence::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::SequenceNotFound(id.to_string()))
    }

    /// Find the sequence of a given type for a subscriber.
    pub async fn find_by_subscriber(
        &self,
        subscriber_email: &str,
        sequence_type: &str,
    ) -> AppResult<Option<email_sequence::Model>> {
        EmailSequence::find()
            .filter(email_sequence::Column::SubscriberEmail.eq(subscriber_email))
            .filter(email_sequence::Column::SequenceType.eq(sequence_type))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List sequences, oldest first.
    pub async fn find_all(&self, limit: u64) -> AppResult<Vec<email_sequence::Model>> {
        EmailSequence::find()
            .order_by_asc(email_sequence::Column::StartedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new sequence.
    pub async fn create(
        &self,
        model: email_sequence::ActiveModel,
    ) -> AppResult<email_sequence::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Write a new step position, completing the sequence when it reaches
    /// the end.
    pub async fn set_step(
        &self,
        sequence: email_sequence::Model,
        step: i32,
        now: DateTime<Utc>,
    ) -> AppResult<email_sequence::Model> {
        let finished = step >= sequence.total_steps;
        let mut active: email_sequence::ActiveModel = sequence.into();
        active.current_step = Set(step);
        if finished {
            active.status = Set(SequenceStatus::Completed);
            active.completed_at = Set(Some(now.into()));
        }
        active
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
