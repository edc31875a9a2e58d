//! Database repositories.

mod email_sequence;
mod job;
mod job_log;
mod rate_limit;

pub use email_sequence::EmailSequenceRepository;
pub use job::JobRepository;
pub use job_log::JobLogRepository;
pub use rate_limit::RateLimitRepository;
