//! Email job.

use courier_db::entities::job::JobType;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::JobPayload;

/// Job to send one transactional email.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EmailJob {
    /// Recipient address.
    #[validate(email)]
    pub to: String,

    /// Subject line.
    #[validate(length(min = 1, max = 998))]
    pub subject: String,

    /// Plain text body.
    #[validate(length(min = 1))]
    pub text: String,

    /// Optional HTML body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,

    /// Drip sequence this message belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<String>,
}

impl EmailJob {
    /// Create a plain text email job.
    #[must_use]
    pub fn new(to: impl Into<String>, subject: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            text: text.into(),
            html: None,
            sequence_id: None,
        }
    }

    /// Attach the message to a drip sequence.
    #[must_use]
    pub fn in_sequence(mut self, sequence_id: impl Into<String>) -> Self {
        self.sequence_id = Some(sequence_id.into());
        self
    }
}

impl JobPayload for EmailJob {
    const JOB_TYPE: JobType = JobType::Email;
}
