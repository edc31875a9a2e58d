//! Drip sequence tracker.
//!
//! Bookkeeping of where a subscriber is in a multi-step email sequence.
//! Nothing here schedules sends: an external trigger calls [`SequenceTracker::advance`]
//! and enqueues the matching `email` job.

use std::sync::Arc;

use courier_common::{AppError, AppResult, IdGenerator};
use courier_db::entities::email_sequence::{self, SequenceStatus};
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::store::SequenceStore;

/// Outcome of starting a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceStart {
    /// Sequence id.
    pub id: String,
    /// False when the subscriber was already in this sequence.
    pub created: bool,
}

/// Tracks drip sequence progress.
#[derive(Clone)]
pub struct SequenceTracker {
    store: Arc<dyn SequenceStore>,
    clock: Arc<dyn Clock>,
    id_gen: IdGenerator,
}

impl SequenceTracker {
    /// Create a tracker over a sequence store.
    #[must_use]
    pub fn new(store: Arc<dyn SequenceStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            id_gen: IdGenerator::new(),
        }
    }

    /// Use a different time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start a sequence for a subscriber. Returns its id.
    ///
    /// A subscriber has at most one sequence per type; starting it again
    /// returns the existing id and leaves its progress untouched.
    pub async fn start_sequence(
        &self,
        subscriber_email: &str,
        sequence_type: &str,
        total_steps: i32,
        metadata: Option<Value>,
    ) -> AppResult<String> {
        self.start(subscriber_email, sequence_type, total_steps, metadata)
            .await
            .map(|start| start.id)
    }

    /// Like [`Self::start_sequence`], but also reports whether a new
    /// sequence was created, so callers can skip first-step side effects
    /// on a repeated start.
    pub async fn start(
        &self,
        subscriber_email: &str,
        sequence_type: &str,
        total_steps: i32,
        metadata: Option<Value>,
    ) -> AppResult<SequenceStart> {
        if total_steps < 1 {
            return Err(AppError::Validation(format!(
                "total_steps must be at least 1, got {total_steps}"
            )));
        }
        if sequence_type.is_empty() {
            return Err(AppError::Validation(
                "sequence_type must not be empty".to_string(),
            ));
        }

        if let Some(existing) = self
            .store
            .find_by_subscriber(subscriber_email, sequence_type)
            .await?
        {
            tracing::debug!(
                sequence_id = %existing.id,
                sequence_type,
                "Sequence already started"
            );
            return Ok(SequenceStart {
                id: existing.id,
                created: false,
            });
        }

        let sequence = email_sequence::Model {
            id: self.id_gen.generate(),
            subscriber_email: subscriber_email.to_string(),
            sequence_type: sequence_type.to_string(),
            current_step: 0,
            total_steps,
            status: SequenceStatus::Active,
            started_at: self.clock.now().into(),
            completed_at: None,
            metadata,
        };

        let sequence = self.store.insert(sequence).await?;
        tracing::info!(
            sequence_id = %sequence.id,
            sequence_type,
            total_steps,
            "Sequence started"
        );
        Ok(SequenceStart {
            id: sequence.id,
            created: true,
        })
    }

    /// Get a sequence.
    pub async fn get(&self, id: &str) -> AppResult<email_sequence::Model> {
        self.store
            .find(id)
            .await?
            .ok_or_else(|| AppError::SequenceNotFound(id.to_string()))
    }

    /// Move a sequence forward by one step.
    ///
    /// Reaching `total_steps` completes the sequence in the same write.
    /// Advancing a completed sequence changes nothing and returns it as is.
    pub async fn advance(&self, id: &str) -> AppResult<email_sequence::Model> {
        let sequence = self.get(id).await?;
        if sequence.status == SequenceStatus::Completed {
            return Ok(sequence);
        }

        let step = sequence.current_step + 1;
        let sequence = self.store.set_step(sequence, step, self.clock.now()).await?;

        if sequence.status == SequenceStatus::Completed {
            tracing::info!(sequence_id = %sequence.id, "Sequence completed");
        }
        Ok(sequence)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemorySequenceStore;

    fn tracker() -> SequenceTracker {
        SequenceTracker::new(Arc::new(MemorySequenceStore::new()))
    }

    #[tokio::test]
    async fn test_advance_to_completion() {
        let tracker = tracker();
        let id = tracker
            .start_sequence("reader@example.com", "onboarding", 2, None)
            .await
            .unwrap();

        let first = tracker.advance(&id).await.unwrap();
        assert_eq!(first.current_step, 1);
        assert_eq!(first.status, SequenceStatus::Active);

        let second = tracker.advance(&id).await.unwrap();
        assert_eq!(second.current_step, 2);
        assert_eq!(second.status, SequenceStatus::Completed);
        assert!(second.completed_at.is_some());

        let third = tracker.advance(&id).await.unwrap();
        assert_eq!(third, second);
    }

    #[tokio::test]
    async fn test_start_is_once_per_pair() {
        let tracker = tracker();

        let a = tracker
            .start_sequence("reader@example.com", "onboarding", 3, None)
            .await
            .unwrap();
        tracker.advance(&a).await.unwrap();
        let again = tracker
            .start_sequence("reader@example.com", "onboarding", 3, None)
            .await
            .unwrap();
        let other = tracker
            .start_sequence("reader@example.com", "re-engagement", 3, None)
            .await
            .unwrap();

        assert_eq!(a, again);
        assert_ne!(a, other);
        assert_eq!(tracker.get(&a).await.unwrap().current_step, 1);
    }

    #[tokio::test]
    async fn test_start_reports_only_first_creation() {
        let tracker = tracker();

        let first = tracker
            .start("reader@example.com", "onboarding", 3, None)
            .await
            .unwrap();
        let second = tracker
            .start("reader@example.com", "onboarding", 3, None)
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_rejects_empty_sequence() {
        let result = tracker()
            .start_sequence("reader@example.com", "onboarding", 0, None)
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_advance_unknown_sequence() {
        let result = tracker().advance("missing").await;
        assert!(matches!(result, Err(AppError::SequenceNotFound(_))));
    }
}
