//! Artifact storage for data exports.

use std::path::PathBuf;

use crate::{AppError, AppResult};

/// Metadata of a stored artifact.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    /// Storage key (relative path).
    pub key: String,
    /// Public URL to download the artifact.
    pub url: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME content type.
    pub content_type: String,
    /// MD5 checksum of the contents.
    pub md5: String,
}

/// Storage backend trait.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store an artifact under `key`, replacing any previous contents.
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<StoredArtifact>;

    /// Delete an artifact. Missing keys are not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Get the public URL for a key.
    fn public_url(&self, key: &str) -> String;
}

/// Local filesystem storage backend.
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new local storage backend.
    #[must_use]
    pub const fn new(base_path: PathBuf, base_url: String) -> Self {
        Self { base_path, base_url }
    }
}

#[async_trait::async_trait]
impl StorageBackend for LocalStorage {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<StoredArtifact> {
        let path = self.base_path.join(key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to create directory: {e}")))?;
        }

        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write file: {e}")))?;

        Ok(StoredArtifact {
            key: key.to_string(),
            url: self.public_url(key),
            size: data.len() as u64,
            content_type: content_type.to_string(),
            md5: format!("{:x}", md5::compute(data)),
        })
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.base_path.join(key);
        if path.exists() {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to delete file: {e}")))?;
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}

/// Generate a storage key for an export artifact.
///
/// Keys are grouped by date and dataset: `2026/10/18/subscribers/<ts>_<uuid>.csv`.
#[must_use]
pub fn generate_artifact_key(dataset: &str, extension: &str) -> String {
    use chrono::Utc;

    let now = Utc::now();
    let date_path = now.format("%Y/%m/%d").to_string();
    let dataset: String = dataset
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    format!(
        "{}/{}/{}_{}.{}",
        date_path,
        dataset,
        now.timestamp_millis(),
        uuid::Uuid::new_v4().simple(),
        extension
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_artifact_key() {
        let key = generate_artifact_key("subscribers", "csv");
        assert!(key.contains("/subscribers/"));
        assert!(key.ends_with(".csv"));
    }

    #[test]
    fn test_generate_artifact_key_sanitizes_dataset() {
        let key = generate_artifact_key("../etc/passwd", "json");
        assert!(!key.contains(".."));
        assert!(key.contains("___etc_passwd"));
    }

    #[tokio::test]
    async fn test_local_storage_put_and_delete() {
        let dir = std::env::temp_dir().join(format!("courier-storage-{}", uuid::Uuid::new_v4()));
        let storage = LocalStorage::new(dir.clone(), "/exports/".to_string());

        let stored = storage
            .put("a/b/report.json", b"{\"rows\":[]}", "application/json")
            .await
            .unwrap();
        assert_eq!(stored.url, "/exports/a/b/report.json");
        assert_eq!(stored.size, 11);
        assert!(dir.join("a/b/report.json").exists());

        storage.delete("a/b/report.json").await.unwrap();
        assert!(!dir.join("a/b/report.json").exists());
        // Deleting twice is fine.
        storage.delete("a/b/report.json").await.unwrap();

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
