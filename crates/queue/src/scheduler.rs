//! Periodic trigger for dispatch and maintenance.
//!
//! The queue and limiter never run loops of their own. When a host has no
//! external cron, it calls [`run_scheduler`] to spawn interval tasks that
//! drive them.

use std::sync::Arc;
use std::time::Duration;

use courier_common::config::DispatcherConfig;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::processors::ProcessorRegistry;
use crate::queue::JobQueue;
use crate::rate_limit::RateLimiter;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between dispatch runs.
    pub dispatch_interval: Duration,
    /// Jobs claimed per dispatch run.
    pub batch_size: u64,
    /// Interval between cleanup runs.
    pub cleanup_interval: Duration,
    /// Terminal jobs older than this are deleted.
    pub retention_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&DispatcherConfig::default())
    }
}

impl From<&DispatcherConfig> for SchedulerConfig {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            dispatch_interval: Duration::from_secs(config.interval_secs.max(1)),
            batch_size: config.batch_size,
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs.max(1)),
            retention_days: config.retention_days,
        }
    }
}

/// Spawn the dispatch and cleanup loops.
///
/// The rate limiter, if given, has its expired counters swept on the
/// cleanup interval. Returns the task handles so the host can abort them
/// on shutdown.
pub fn run_scheduler(
    config: SchedulerConfig,
    queue: JobQueue,
    registry: Arc<ProcessorRegistry>,
    limiter: Option<RateLimiter>,
) -> Vec<JoinHandle<()>> {
    let dispatch_queue = queue.clone();
    let cleanup_queue = queue;
    let batch_size = config.batch_size;
    let retention_days = config.retention_days;

    // Spawn dispatch task
    let dispatch = tokio::spawn(async move {
        let mut interval = interval(config.dispatch_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = dispatch_queue.dispatch(&registry, batch_size).await {
                tracing::error!(error = %e, "Scheduled dispatch failed");
            }
        }
    });

    // Spawn cleanup task
    let cleanup = tokio::spawn(async move {
        let mut interval = interval(config.cleanup_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = cleanup_queue.cleanup(retention_days).await {
                tracing::error!(error = %e, "Scheduled job cleanup failed");
            }
            if let Some(limiter) = &limiter {
                let count = limiter.sweep().await;
                if count > 0 {
                    tracing::info!(count, "Swept expired rate limit counters");
                }
            }
        }
    });

    tracing::info!(
        dispatch_secs = config.dispatch_interval.as_secs(),
        cleanup_secs = config.cleanup_interval.as_secs(),
        batch_size,
        "Scheduler started"
    );
    vec![dispatch, cleanup]
}
