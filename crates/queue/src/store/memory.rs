//! In-memory adapters.
//!
//! State is owned by the adapter instance, process-local and lost on
//! restart. Clones share the same state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use courier_common::{AppError, AppResult};
use courier_db::entities::email_sequence::SequenceStatus;
use courier_db::entities::job::JobStatus;
use courier_db::entities::{email_sequence, job, job_log};
use tokio::sync::{Mutex, RwLock};

use super::{CounterStore, JobStore, SequenceStore};
use crate::rate_limit::{Counter, RateLimitResult, apply_hit};

#[derive(Default)]
struct JobState {
    jobs: HashMap<String, job::Model>,
    logs: Vec<job_log::Model>,
}

/// Job store held in memory.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    state: Arc<RwLock<JobState>>,
}

impl MemoryJobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, id: &str, f: F) -> AppResult<()>
    where
        F: FnOnce(&mut job::Model) + Send,
    {
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))?;
        f(job);
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: job::Model) -> AppResult<job::Model> {
        let mut state = self.state.write().await;
        state.jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn find(&self, id: &str) -> AppResult<Option<job::Model>> {
        Ok(self.state.read().await.jobs.get(id).cloned())
    }

    async fn find_claimable(&self, now: DateTime<Utc>, limit: u64) -> AppResult<Vec<job::Model>> {
        let state = self.state.read().await;
        let mut due: Vec<job::Model> = state
            .jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Pending && j.scheduled_at <= now && j.attempts < j.max_attempts
            })
            .cloned()
            .collect();

        due.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.scheduled_at.cmp(&b.scheduled_at))
        });
        due.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(due)
    }

    async fn claim(&self, job: &job::Model, now: DateTime<Utc>) -> AppResult<job::Model> {
        // Written from the caller's snapshot, like the SQL update.
        let claimed = job::Model {
            status: JobStatus::Processing,
            attempts: job.attempts + 1,
            started_at: job.started_at.or_else(|| Some(now.into())),
            ..job.clone()
        };
        let mut state = self.state.write().await;
        state.jobs.insert(claimed.id.clone(), claimed.clone());
        Ok(claimed)
    }

    async fn complete(&self, id: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.update(id, |j| {
            j.status = JobStatus::Completed;
            j.completed_at = Some(now.into());
        })
        .await
    }

    async fn release(&self, id: &str, error: &str, retry_at: DateTime<Utc>) -> AppResult<()> {
        self.update(id, |j| {
            j.status = JobStatus::Pending;
            j.error = Some(error.to_string());
            j.scheduled_at = retry_at.into();
        })
        .await
    }

    async fn fail(&self, id: &str, error: &str) -> AppResult<()> {
        self.update(id, |j| {
            j.status = JobStatus::Failed;
            j.error = Some(error.to_string());
        })
        .await
    }

    async fn cancel_pending(&self, id: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.jobs.get_mut(id) {
            Some(j) if j.status == JobStatus::Pending => {
                j.status = JobStatus::Cancelled;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn requeue_failed(&self, id: &str, now: DateTime<Utc>) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.jobs.get_mut(id) {
            Some(j) if j.status == JobStatus::Failed => {
                j.status = JobStatus::Pending;
                j.attempts = 0;
                j.scheduled_at = now.into();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let before = state.jobs.len();
        state
            .jobs
            .retain(|_, j| !(j.status.is_terminal() && j.created_at < cutoff));
        let removed = before - state.jobs.len();

        let JobState { jobs, logs } = &mut *state;
        logs.retain(|entry| jobs.contains_key(&entry.job_id));

        Ok(removed as u64)
    }

    async fn count_by_status(&self, status: JobStatus) -> AppResult<u64> {
        let state = self.state.read().await;
        Ok(state.jobs.values().filter(|j| j.status == status).count() as u64)
    }

    async fn append_log(&self, entry: job_log::Model) -> AppResult<()> {
        self.state.write().await.logs.push(entry);
        Ok(())
    }

    async fn logs(&self, job_id: &str) -> AppResult<Vec<job_log::Model>> {
        let state = self.state.read().await;
        Ok(state
            .logs
            .iter()
            .filter(|entry| entry.job_id == job_id)
            .cloned()
            .collect())
    }
}

/// Rate limit counters held in memory.
///
/// All read-modify-write cycles run under one lock, so parallel requests
/// for the same key never lose an increment.
#[derive(Clone, Default)]
pub struct MemoryCounterStore {
    counters: Arc<Mutex<HashMap<String, Counter>>>,
}

impl MemoryCounterStore {
    /// Create an empty counter map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request. Infallible, unlike the trait method's signature.
    pub async fn hit_local(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> RateLimitResult {
        let mut counters = self.counters.lock().await;
        let (result, write) = apply_hit(counters.get(key).copied(), limit, window, now);
        if let Some(counter) = write {
            counters.insert(key.to_string(), counter);
        }
        result
    }

    /// Drop counters whose window has ended.
    pub async fn sweep_local(&self, now: DateTime<Utc>) -> u64 {
        let mut counters = self.counters.lock().await;
        let before = counters.len();
        counters.retain(|_, c| c.reset_at > now);
        (before - counters.len()) as u64
    }

    /// Number of tracked keys.
    pub async fn len(&self) -> usize {
        self.counters.lock().await.len()
    }

    /// Whether no keys are tracked.
    pub async fn is_empty(&self) -> bool {
        self.counters.lock().await.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<RateLimitResult> {
        Ok(self.hit_local(key, limit, window, now).await)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        Ok(self.sweep_local(now).await)
    }
}

/// Drip sequences held in memory.
#[derive(Clone, Default)]
pub struct MemorySequenceStore {
    sequences: Arc<RwLock<HashMap<String, email_sequence::Model>>>,
}

impl MemorySequenceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SequenceStore for MemorySequenceStore {
    async fn insert(
        &self,
        sequence: email_sequence::Model,
    ) -> AppResult<email_sequence::Model> {
        let mut sequences = self.sequences.write().await;
        let duplicate = sequences.values().any(|s| {
            s.subscriber_email == sequence.subscriber_email
                && s.sequence_type == sequence.sequence_type
        });
        if duplicate {
            return Err(AppError::Database(format!(
                "duplicate sequence {} for {}",
                sequence.sequence_type, sequence.subscriber_email
            )));
        }
        sequences.insert(sequence.id.clone(), sequence.clone());
        Ok(sequence)
    }

    async fn find(&self, id: &str) -> AppResult<Option<email_sequence::Model>> {
        Ok(self.sequences.read().await.get(id).cloned())
    }

    async fn find_by_subscriber(
        &self,
        subscriber_email: &str,
        sequence_type: &str,
    ) -> AppResult<Option<email_sequence::Model>> {
        let sequences = self.sequences.read().await;
        Ok(sequences
            .values()
            .find(|s| s.subscriber_email == subscriber_email && s.sequence_type == sequence_type)
            .cloned())
    }

    async fn list(&self, limit: u64) -> AppResult<Vec<email_sequence::Model>> {
        let sequences = self.sequences.read().await;
        let mut all: Vec<_> = sequences.values().cloned().collect();
        all.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        all.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(all)
    }

    async fn set_step(
        &self,
        sequence: email_sequence::Model,
        step: i32,
        now: DateTime<Utc>,
    ) -> AppResult<email_sequence::Model> {
        let mut updated = email_sequence::Model {
            current_step: step,
            ..sequence
        };
        if step >= updated.total_steps {
            updated.status = SequenceStatus::Completed;
            updated.completed_at = Some(now.into());
        }

        let mut sequences = self.sequences.write().await;
        sequences.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }
}
