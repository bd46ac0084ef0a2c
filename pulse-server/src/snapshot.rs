//! Snapshot writer: drives the persistent backend either periodically
//! or synchronously after each update (the latter lives in the
//! write-sync middleware and the gRPC handler).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info};

use pulse_core::{retry, PersistentStorage, Result};

/// Save with the shared bounded-retry schedule.
pub async fn save_with_retry(storage: &Arc<dyn PersistentStorage>) -> Result<()> {
    retry::with_backoff(&retry::DEFAULT_BACKOFF, || async move { storage.save().await }).await
}

/// Periodically persist the registry until shutdown fires. Save errors
/// are logged; the next tick retries.
pub async fn run_periodic(
    storage: Arc<dyn PersistentStorage>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    // the first tick completes immediately; skip it so saves are spaced
    ticker.tick().await;

    info!(interval = ?interval, "start persist metrics job");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("persist metrics job shutting down");
                return;
            }
            _ = ticker.tick() => {
                match storage.save().await {
                    Ok(()) => info!("metrics saved"),
                    Err(err) => error!(%err, "can't save metrics, next tick retries"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{FileStorage, MetricRegistry};

    #[tokio::test]
    async fn test_periodic_writer_saves_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics-db.json");

        let registry = Arc::new(MetricRegistry::new());
        registry.update_counter("ticks", 1).await;
        let storage: Arc<dyn PersistentStorage> =
            Arc::new(FileStorage::new(&path, registry.clone()));

        let (tx, rx) = broadcast::channel(1);
        let writer = tokio::spawn(run_periodic(storage, Duration::from_millis(10), rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        writer.await.unwrap();

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("\"ticks\":1"));
    }
}
