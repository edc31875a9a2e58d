//! Analytics aggregation processor.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Months, NaiveTime, TimeZone, Timelike, Utc};
use courier_common::AppResult;
use courier_db::entities::job::JobType;
use serde_json::Value;
use tokio::sync::RwLock;

use super::Processor;
use crate::jobs::{self, AnalyticsAggregationJob, Granularity};

/// Computes one rollup bucket. Must be idempotent for the same bucket.
#[async_trait]
pub trait Aggregator: Send + Sync {
    /// Roll up `[start, end)` at `granularity`.
    async fn aggregate(
        &self,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<()>;
}

/// Records which buckets have been rolled up.
///
/// Rolling up a bucket twice leaves one entry.
#[derive(Clone, Default)]
pub struct RollupLedger {
    buckets: Arc<RwLock<BTreeSet<(DateTime<Utc>, DateTime<Utc>)>>>,
}

impl RollupLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buckets rolled up so far, in order.
    pub async fn buckets(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.buckets.read().await.iter().copied().collect()
    }
}

#[async_trait]
impl Aggregator for RollupLedger {
    async fn aggregate(
        &self,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<()> {
        tracing::debug!(?granularity, %start, %end, "Rolling up bucket");
        self.buckets.write().await.insert((start, end));
        Ok(())
    }
}

/// Start of the bucket containing `at`.
fn bucket_start(granularity: Granularity, at: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = Utc.from_utc_datetime(&at.date_naive().and_time(NaiveTime::MIN));
    match granularity {
        Granularity::Hour => midnight + Duration::hours(i64::from(at.hour())),
        Granularity::Day => midnight,
        Granularity::Week => {
            midnight - Duration::days(i64::from(at.weekday().num_days_from_monday()))
        }
        Granularity::Month => midnight - Duration::days(i64::from(at.day0())),
    }
}

fn next_bucket(granularity: Granularity, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match granularity {
        Granularity::Hour => start.checked_add_signed(Duration::hours(1)),
        Granularity::Day => start.checked_add_signed(Duration::days(1)),
        Granularity::Week => start.checked_add_signed(Duration::weeks(1)),
        Granularity::Month => start.checked_add_months(Months::new(1)),
    }
}

/// Split `[start, end)` into calendar-aligned buckets.
///
/// The first bucket starts at the boundary at or before `start`; an empty
/// range yields no buckets.
#[must_use]
pub fn buckets(
    granularity: Granularity,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut out = Vec::new();
    if end <= start {
        return out;
    }

    let mut cursor = bucket_start(granularity, start);
    while cursor < end {
        let Some(next) = next_bucket(granularity, cursor) else {
            break;
        };
        out.push((cursor, next));
        cursor = next;
    }
    out
}

/// Processor for `analytics-aggregation` jobs.
#[derive(Clone)]
pub struct AggregationProcessor {
    aggregator: Arc<dyn Aggregator>,
}

impl AggregationProcessor {
    /// Create a new aggregation processor.
    #[must_use]
    pub fn new(aggregator: Arc<dyn Aggregator>) -> Self {
        Self { aggregator }
    }
}

#[async_trait]
impl Processor for AggregationProcessor {
    fn job_type(&self) -> JobType {
        JobType::AnalyticsAggregation
    }

    async fn process(&self, payload: &Value) -> AppResult<()> {
        let job: AnalyticsAggregationJob = jobs::decode(payload)?;
        let ranges = buckets(job.granularity, job.start_date, job.end_date);

        for (start, end) in &ranges {
            self.aggregator
                .aggregate(job.granularity, *start, *end)
                .await?;
        }

        tracing::info!(
            granularity = ?job.granularity,
            buckets = ranges.len(),
            "Analytics aggregation finished"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_daily_buckets_align_to_midnight() {
        let ranges = buckets(
            Granularity::Day,
            ts("2026-03-01T10:30:00Z"),
            ts("2026-03-03T00:00:00Z"),
        );

        assert_eq!(
            ranges,
            vec![
                (ts("2026-03-01T00:00:00Z"), ts("2026-03-02T00:00:00Z")),
                (ts("2026-03-02T00:00:00Z"), ts("2026-03-03T00:00:00Z")),
            ]
        );
    }

    #[test]
    fn test_weekly_buckets_start_monday() {
        // 2026-03-04 is a Wednesday
        let ranges = buckets(
            Granularity::Week,
            ts("2026-03-04T12:00:00Z"),
            ts("2026-03-05T00:00:00Z"),
        );

        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].0, ts("2026-03-02T00:00:00Z"));
    }

    #[test]
    fn test_monthly_buckets_follow_calendar() {
        let ranges = buckets(
            Granularity::Month,
            ts("2026-01-15T00:00:00Z"),
            ts("2026-03-01T00:00:00Z"),
        );

        assert_eq!(
            ranges,
            vec![
                (ts("2026-01-01T00:00:00Z"), ts("2026-02-01T00:00:00Z")),
                (ts("2026-02-01T00:00:00Z"), ts("2026-03-01T00:00:00Z")),
            ]
        );
    }

    #[test]
    fn test_empty_range_has_no_buckets() {
        let at = ts("2026-03-01T00:00:00Z");
        assert!(buckets(Granularity::Hour, at, at).is_empty());
    }

    #[tokio::test]
    async fn test_reprocessing_is_idempotent() {
        let ledger = RollupLedger::new();
        let processor = AggregationProcessor::new(Arc::new(ledger.clone()));
        let payload = json!({
            "granularity": "hour",
            "start_date": "2026-03-01T00:00:00Z",
            "end_date": "2026-03-01T03:00:00Z",
        });

        processor.process(&payload).await.unwrap();
        processor.process(&payload).await.unwrap();

        assert_eq!(ledger.buckets().await.len(), 3);
    }
}
