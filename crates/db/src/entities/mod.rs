//! Database entities.

#![allow(missing_docs)]

pub mod email_sequence;
pub mod job;
pub mod job_log;
pub mod rate_limit;

pub use email_sequence::Entity as EmailSequence;
pub use job::Entity as Job;
pub use job_log::Entity as JobLog;
pub use rate_limit::Entity as RateLimit;
