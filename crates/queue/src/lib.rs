//! Durable job dispatch and admission control for courier.
//!
//! - **Queue**: typed, prioritized, retryable jobs with append-only logs
//! - **Dispatcher**: drains eligible jobs through the processor registry
//! - **Processors**: email, analytics aggregation, cache invalidation,
//!   data export, webhook delivery
//! - **Rate limiting**: fixed-window quotas with an in-memory fallback
//! - **Identity**: stable per-client keys from IP headers
//! - **Drip**: multi-step email sequence bookkeeping
//! - **Scheduler**: optional periodic trigger

pub mod clock;
pub mod dispatcher;
pub mod drip;
pub mod identity;
pub mod jobs;
pub mod processors;
pub mod queue;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::DispatchSummary;
pub use drip::{SequenceStart, SequenceTracker};
pub use identity::resolve_identity;
pub use jobs::*;
pub use processors::{Processor, ProcessorRegistry};
pub use queue::{EnqueueOptions, JobCounts, JobQueue};
pub use rate_limit::{Quota, RateLimitResult, RateLimiter};
pub use retry::RetryPolicy;
pub use scheduler::{SchedulerConfig, run_scheduler};
pub use store::{
    CounterStore, JobStore, MemoryCounterStore, MemoryJobStore, MemorySequenceStore,
    PgCounterStore, PgJobStore, PgSequenceStore, SequenceStore,
};
