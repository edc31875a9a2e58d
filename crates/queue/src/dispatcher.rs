//! Dispatcher: drains eligible jobs through the processor registry.

use courier_common::{AppError, AppResult};
use courier_db::entities::job;
use courier_db::entities::job_log::LogLevel;
use serde::Serialize;
use serde_json::json;

use crate::processors::ProcessorRegistry;
use crate::queue::{JobQueue, truncate_error};

/// Tally of one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Jobs claimed.
    pub processed: u64,
    /// Jobs whose processor succeeded.
    pub succeeded: u64,
    /// Jobs whose processor failed, retried or dead-lettered.
    pub failed: u64,
}

impl JobQueue {
    /// Run up to `limit` eligible jobs, one at a time.
    ///
    /// A processor failure is recorded on its job and never stops the run.
    /// Store errors while selecting abort the run; store errors while
    /// recording a job's outcome are logged and the run moves on.
    ///
    /// There is no lock between selecting and claiming: concurrent
    /// dispatchers may run the same job twice.
    pub async fn dispatch(
        &self,
        registry: &ProcessorRegistry,
        limit: u64,
    ) -> AppResult<DispatchSummary> {
        let now = self.clock.now();
        let jobs = self.store.find_claimable(now, limit).await?;
        let mut summary = DispatchSummary::default();

        for selected in jobs {
            let job = match self.store.claim(&selected, self.clock.now()).await {
                Ok(job) => job,
                Err(e) => {
                    tracing::warn!(job_id = %selected.id, error = %e, "Failed to claim job");
                    continue;
                }
            };
            summary.processed += 1;

            match self.execute(registry, &job).await {
                Ok(()) => {
                    summary.succeeded += 1;
                    self.record_success(&job).await;
                }
                Err(e) => {
                    summary.failed += 1;
                    self.record_failure(&job, &e).await;
                }
            }
        }

        if summary.processed > 0 {
            tracing::info!(
                processed = summary.processed,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "Dispatch finished"
            );
        }
        Ok(summary)
    }

    async fn execute(&self, registry: &ProcessorRegistry, job: &job::Model) -> AppResult<()> {
        let processor = registry.get(job.job_type).ok_or_else(|| {
            AppError::Processor(format!("No processor registered for {}", job.job_type))
        })?;

        tracing::debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempts,
            "Running job"
        );
        processor.process(&job.payload).await
    }

    async fn record_success(&self, job: &job::Model) {
        if let Err(e) = self.store.complete(&job.id, self.clock.now()).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to mark job completed");
            return;
        }

        tracing::info!(job_id = %job.id, job_type = %job.job_type, "Job completed");
        self.log(
            &job.id,
            LogLevel::Info,
            "Job completed",
            Some(json!({ "attempt": job.attempts })),
        )
        .await;
    }

    async fn record_failure(&self, job: &job::Model, error: &AppError) {
        let message = truncate_error(&error.to_string());
        let dead = job.attempts >= job.max_attempts;

        let stored = if dead {
            self.store.fail(&job.id, &message).await
        } else {
            let retry_at = self
                .retry
                .retry_at(job.attempts.max(0) as u32, self.clock.now());
            self.store.release(&job.id, &message, retry_at).await
        };
        if let Err(e) = stored {
            tracing::error!(job_id = %job.id, error = %e, "Failed to record job failure");
            return;
        }

        tracing::error!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempts,
            max_attempts = job.max_attempts,
            dead,
            error = %message,
            "Job failed"
        );
        self.log(
            &job.id,
            LogLevel::Error,
            &message,
            Some(json!({
                "attempt": job.attempts,
                "max_attempts": job.max_attempts,
                "dead": dead,
            })),
        )
        .await;
    }
}
