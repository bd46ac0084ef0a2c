//! File snapshot backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{PulseError, Result};
use crate::metrics::{MetricRegistry, MetricsSnapshot};
use crate::storage::PersistentStorage;

/// Persists the registry as a single JSON document, rewritten in full
/// on every save. Single-writer by contract, so no file locking.
pub struct FileStorage {
    registry: Arc<MetricRegistry>,
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl AsRef<Path>, registry: Arc<MetricRegistry>) -> Self {
        Self { registry, path: path.as_ref().to_path_buf() }
    }
}

#[async_trait]
impl PersistentStorage for FileStorage {
    async fn save(&self) -> Result<()> {
        let snapshot = self.registry.snapshot().await;

        let mut doc = serde_json::to_vec(&snapshot)
            .map_err(|e| PulseError::Internal(format!("failed to encode snapshot: {e}")))?;
        doc.push(b'\n');

        tokio::fs::write(&self.path, doc)
            .await
            .map_err(|e| PulseError::Io { path: self.path.clone(), source: e })?;

        debug!(path = %self.path.display(), "snapshot written");
        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        let doc = tokio::fs::read(&self.path)
            .await
            .map_err(|e| PulseError::Io { path: self.path.clone(), source: e })?;

        let snapshot: MetricsSnapshot = serde_json::from_slice(&doc)
            .map_err(|e| PulseError::decode(format!("failed to decode snapshot: {e}")))?;

        self.registry.replace(snapshot).await;

        debug!(path = %self.path.display(), "snapshot restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_then_restore_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics-db.json");

        let registry = Arc::new(MetricRegistry::new());
        registry.update_gauge("Alloc", 1024.5).await;
        registry.update_counter("PollCount", 15).await;

        FileStorage::new(&path, registry.clone()).save().await.unwrap();

        let fresh = Arc::new(MetricRegistry::new());
        FileStorage::new(&path, fresh.clone()).restore().await.unwrap();

        assert_eq!(fresh.snapshot().await, registry.snapshot().await);
    }

    #[tokio::test]
    async fn test_save_rewrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics-db.json");

        let registry = Arc::new(MetricRegistry::new());
        let storage = FileStorage::new(&path, registry.clone());

        registry.update_counter("stale", 1).await;
        storage.save().await.unwrap();

        registry.replace(MetricsSnapshot::default()).await;
        registry.update_counter("fresh", 2).await;
        storage.save().await.unwrap();

        let fresh = Arc::new(MetricRegistry::new());
        FileStorage::new(&path, fresh.clone()).restore().await.unwrap();

        assert!(fresh.counter("stale").await.is_err());
        assert_eq!(fresh.counter("fresh").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_restore_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(MetricRegistry::new());
        let storage = FileStorage::new(dir.path().join("nope.json"), registry);

        assert!(matches!(storage.restore().await, Err(PulseError::Io { .. })));
    }

    #[tokio::test]
    async fn test_restore_accepts_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics-db.json");
        tokio::fs::write(&path, "{\"Counter\":{\"c\":1},\"Gauge\":{}}\n").await.unwrap();

        let registry = Arc::new(MetricRegistry::new());
        FileStorage::new(&path, registry.clone()).restore().await.unwrap();
        assert_eq!(registry.counter("c").await.unwrap(), 1);
    }
}
