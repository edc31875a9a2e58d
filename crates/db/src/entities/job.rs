//! Job entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of deferred work. Each kind has exactly one processor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    /// Send one transactional email.
    #[sea_orm(string_value = "email")]
    Email,
    /// Roll up analytics over a date range.
    #[sea_orm(string_value = "analytics-aggregation")]
    AnalyticsAggregation,
    /// Invalidate rendered pages by path or tag.
    #[sea_orm(string_value = "cache-invalidation")]
    CacheInvalidation,
    /// Produce a downloadable dataset export.
    #[sea_orm(string_value = "data-export")]
    DataExport,
    /// POST a payload to an external URL.
    #[sea_orm(string_value = "webhook-delivery")]
    WebhookDelivery,
}

impl JobType {
    /// Wire name of the job type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::AnalyticsAggregation => "analytics-aggregation",
            Self::CacheInvalidation => "cache-invalidation",
            Self::DataExport => "data-export",
            Self::WebhookDelivery => "webhook-delivery",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a job.
///
/// `pending -> processing -> completed`, or back to `pending` on a failure
/// with attempts left, or `failed` once attempts are exhausted. Only
/// `pending` jobs can become `cancelled`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be claimed.
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Claimed by a dispatcher.
    #[sea_orm(string_value = "processing")]
    Processing,
    /// Finished successfully.
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Attempts exhausted (dead-lettered).
    #[sea_orm(string_value = "failed")]
    Failed,
    /// Cancelled before it was claimed.
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl JobStatus {
    /// Whether the job can no longer change state on its own.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Statuses removed by cleanup.
    #[must_use]
    pub const fn terminal() -> [Self; 3] {
        [Self::Completed, Self::Failed, Self::Cancelled]
    }
}

/// A unit of deferred work.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Which processor handles this job.
    #[sea_orm(column_name = "type")]
    pub job_type: JobType,

    /// Processor-specific payload.
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,

    pub status: JobStatus,

    /// Higher dispatches first.
    #[sea_orm(default_value = 0)]
    pub priority: i32,

    /// Number of claims so far.
    #[sea_orm(default_value = 0)]
    pub attempts: i32,

    pub max_attempts: i32,

    /// Not eligible for dispatch before this instant.
    pub scheduled_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub started_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Last failure message, truncated.
    #[sea_orm(column_type = "Text", nullable)]
    pub error: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::job_log::Entity")]
    JobLog,
}

impl Related<super::job_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::JobLog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
