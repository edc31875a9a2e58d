//! Data export processor.

use std::sync::Arc;

use async_trait::async_trait;
use courier_common::{AppError, AppResult, StorageBackend, generate_artifact_key};
use courier_db::entities::job::{JobStatus, JobType};
use sea_orm::Iterable;
use serde_json::{Map, Value, json};

use super::{EmailSender, Processor};
use crate::jobs::{self, DataExportJob, EmailJob, ExportFormat};
use crate::store::{JobStore, SequenceStore};

/// One exported record.
pub type Row = Map<String, Value>;

/// Most records a single export will load.
const MAX_EXPORT_ROWS: u64 = 50_000;

/// Loads the records of a named dataset.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Load every record of `dataset_type`.
    async fn load(&self, dataset_type: &str) -> AppResult<Vec<Row>>;
}

/// Datasets read from the courier stores.
///
/// - `subscribers`: one row per drip sequence.
/// - `job-stats`: one row per job status with its count.
#[derive(Clone)]
pub struct StoreDatasetSource {
    sequences: Arc<dyn SequenceStore>,
    jobs: Arc<dyn JobStore>,
}

impl StoreDatasetSource {
    /// Create a new dataset source.
    #[must_use]
    pub fn new(sequences: Arc<dyn SequenceStore>, jobs: Arc<dyn JobStore>) -> Self {
        Self { sequences, jobs }
    }
}

#[async_trait]
impl DatasetSource for StoreDatasetSource {
    async fn load(&self, dataset_type: &str) -> AppResult<Vec<Row>> {
        match dataset_type {
            "subscribers" => {
                let sequences = self.sequences.list(MAX_EXPORT_ROWS).await?;
                sequences
                    .into_iter()
                    .map(|s| -> AppResult<Row> {
                        let mut row = Row::new();
                        row.insert("subscriber_email".into(), json!(s.subscriber_email));
                        row.insert("sequence_type".into(), json!(s.sequence_type));
                        row.insert("current_step".into(), json!(s.current_step));
                        row.insert("total_steps".into(), json!(s.total_steps));
                        row.insert("status".into(), serde_json::to_value(s.status)?);
                        row.insert("started_at".into(), json!(s.started_at.to_rfc3339()));
                        row.insert(
                            "completed_at".into(),
                            json!(s.completed_at.map(|t| t.to_rfc3339())),
                        );
                        Ok(row)
                    })
                    .collect()
            }
            "job-stats" => {
                let mut rows = Vec::new();
                for status in JobStatus::iter() {
                    let count = self.jobs.count_by_status(status).await?;
                    let mut row = Row::new();
                    row.insert("status".into(), serde_json::to_value(status)?);
                    row.insert("count".into(), json!(count));
                    rows.push(row);
                }
                Ok(rows)
            }
            other => Err(AppError::Validation(format!("Unknown dataset: {other}"))),
        }
    }
}

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => escape_csv(s),
        Some(other) => escape_csv(&other.to_string()),
    }
}

/// Render rows in an export format.
///
/// CSV columns are the union of all row keys in first-seen order.
pub fn render(format: ExportFormat, rows: &[Row]) -> AppResult<Vec<u8>> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_vec_pretty(rows)?),
        ExportFormat::Csv => {
            let mut columns: Vec<&str> = Vec::new();
            for key in rows.iter().flat_map(Map::keys) {
                if !columns.contains(&key.as_str()) {
                    columns.push(key);
                }
            }

            let mut out = columns
                .iter()
                .map(|c| escape_csv(c))
                .collect::<Vec<_>>()
                .join(",");
            out.push('\n');
            for row in rows {
                let line = columns
                    .iter()
                    .map(|c| csv_cell(row.get(*c)))
                    .collect::<Vec<_>>()
                    .join(",");
                out.push_str(&line);
                out.push('\n');
            }
            Ok(out.into_bytes())
        }
    }
}

/// Processor for `data-export` jobs.
///
/// Loads the dataset, writes the rendered artifact to storage, then emails
/// the download link.
#[derive(Clone)]
pub struct DataExportProcessor {
    source: Arc<dyn DatasetSource>,
    storage: Arc<dyn StorageBackend>,
    email: Arc<dyn EmailSender>,
}

impl DataExportProcessor {
    /// Create a new data export processor.
    #[must_use]
    pub fn new(
        source: Arc<dyn DatasetSource>,
        storage: Arc<dyn StorageBackend>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            source,
            storage,
            email,
        }
    }
}

#[async_trait]
impl Processor for DataExportProcessor {
    fn job_type(&self) -> JobType {
        JobType::DataExport
    }

    async fn process(&self, payload: &Value) -> AppResult<()> {
        let job: DataExportJob = jobs::decode(payload)?;

        let rows = self.source.load(&job.dataset_type).await?;
        let data = render(job.format, &rows)?;
        let key = generate_artifact_key(&job.dataset_type, job.format.extension());
        let artifact = self
            .storage
            .put(&key, &data, job.format.content_type())
            .await?;

        let notice = EmailJob::new(
            job.notify_email.clone(),
            format!("Your {} export is ready", job.dataset_type),
            format!(
                "Your export of {} ({} rows, {} bytes) is ready.\n\nDownload: {}\nMD5: {}\n",
                job.dataset_type,
                rows.len(),
                artifact.size,
                artifact.url,
                artifact.md5
            ),
        );
        self.email.send(&notice).await?;

        tracing::info!(
            dataset = %job.dataset_type,
            rows = rows.len(),
            key = %artifact.key,
            "Data export written"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use courier_common::StoredArtifact;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<EmailJob>>,
    }

    #[async_trait]
    impl EmailSender for RecordingSender {
        async fn send(&self, message: &EmailJob) -> AppResult<()> {
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingStorage {
        puts: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl StorageBackend for RecordingStorage {
        async fn put(
            &self,
            key: &str,
            data: &[u8],
            content_type: &str,
        ) -> AppResult<StoredArtifact> {
            self.puts.lock().await.push((key.to_string(), data.to_vec()));
            Ok(StoredArtifact {
                key: key.to_string(),
                url: self.public_url(key),
                size: data.len() as u64,
                content_type: content_type.to_string(),
                md5: String::new(),
            })
        }

        async fn delete(&self, _key: &str) -> AppResult<()> {
            Ok(())
        }

        fn public_url(&self, key: &str) -> String {
            format!("https://files.example.com/{key}")
        }
    }

    struct FixedSource(Vec<Row>);

    #[async_trait]
    impl DatasetSource for FixedSource {
        async fn load(&self, _dataset_type: &str) -> AppResult<Vec<Row>> {
            Ok(self.0.clone())
        }
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_render_csv_escapes_and_fills_gaps() {
        let rows = vec![
            row(json!({"email": "a@example.com", "note": "hi, there"})),
            row(json!({"email": "b@example.com", "step": 2})),
        ];

        let csv = String::from_utf8(render(ExportFormat::Csv, &rows).unwrap()).unwrap();

        assert_eq!(
            csv,
            "email,note,step\na@example.com,\"hi, there\",\nb@example.com,,2\n"
        );
    }

    #[tokio::test]
    async fn test_export_writes_artifact_then_notifies() {
        let sender = Arc::new(RecordingSender::default());
        let storage = Arc::new(RecordingStorage::default());
        let source = Arc::new(FixedSource(vec![row(json!({"email": "a@example.com"}))]));
        let processor = DataExportProcessor::new(source, storage.clone(), sender.clone());

        processor
            .process(&json!({
                "dataset_type": "subscribers",
                "format": "json",
                "notify_email": "ops@example.com",
            }))
            .await
            .unwrap();

        let puts = storage.puts.lock().await;
        assert_eq!(puts.len(), 1);
        assert!(puts[0].0.ends_with(".json"));

        let sent = sender.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ops@example.com");
        assert!(sent[0].text.contains("https://files.example.com/"));
    }
}
