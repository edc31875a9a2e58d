//! Data export job.

use courier_db::entities::job::JobType;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::JobPayload;

/// Export file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    /// File extension for artifacts in this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    /// MIME type for artifacts in this format.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
        }
    }
}

/// Job to export a dataset and email a link to it.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DataExportJob {
    #[validate(length(min = 1, max = 64))]
    pub dataset_type: String,
    pub format: ExportFormat,
    #[validate(email)]
    pub notify_email: String,
}

impl JobPayload for DataExportJob {
    const JOB_TYPE: JobType = JobType::DataExport;
}
