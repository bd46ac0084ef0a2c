//! PostgreSQL snapshot backend.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, instrument};

use crate::error::{PulseError, Result};
use crate::metrics::{MetricKind, MetricRegistry, MetricsSnapshot};
use crate::storage::PersistentStorage;

const SAVE_GAUGE: &str = "INSERT INTO metrics (id, mtype, mdelta, mvalue) \
     VALUES ($1, $2, $3, $4) \
     ON CONFLICT (id) DO UPDATE SET mvalue = EXCLUDED.mvalue";

const SAVE_COUNTER: &str = "INSERT INTO metrics (id, mtype, mdelta, mvalue) \
     VALUES ($1, $2, $3, $4) \
     ON CONFLICT (id) DO UPDATE SET mdelta = EXCLUDED.mdelta";

const GET_METRICS: &str = "SELECT id, mtype, mdelta, mvalue FROM metrics";

/// Connect a pool to the given DSN and verify the connection.
pub async fn connect(dsn: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(dsn)
        .await
        .map_err(PulseError::backend)?;

    sqlx::query("SELECT 1").execute(&pool).await.map_err(PulseError::backend)?;

    Ok(pool)
}

/// Persists the registry as one row per metric, upserted on the
/// primary key. Every row carries exactly one of mdelta / mvalue.
pub struct DbStorage {
    registry: Arc<MetricRegistry>,
    pool: PgPool,
}

impl DbStorage {
    pub fn new(registry: Arc<MetricRegistry>, pool: PgPool) -> Self {
        Self { registry, pool }
    }
}

#[async_trait]
impl PersistentStorage for DbStorage {
    #[instrument(skip(self))]
    async fn save(&self) -> Result<()> {
        let snapshot = self.registry.snapshot().await;

        let mut tx = self.pool.begin().await.map_err(PulseError::backend)?;

        for (id, value) in &snapshot.gauge {
            sqlx::query(SAVE_GAUGE)
                .bind(id)
                .bind(MetricKind::Gauge.as_str())
                .bind(Option::<i64>::None)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(PulseError::backend)?;
        }

        for (id, delta) in &snapshot.counter {
            sqlx::query(SAVE_COUNTER)
                .bind(id)
                .bind(MetricKind::Counter.as_str())
                .bind(delta)
                .bind(Option::<f64>::None)
                .execute(&mut *tx)
                .await
                .map_err(PulseError::backend)?;
        }

        tx.commit().await.map_err(PulseError::backend)?;

        debug!(
            gauges = snapshot.gauge.len(),
            counters = snapshot.counter.len(),
            "snapshot saved to database"
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn restore(&self) -> Result<()> {
        let rows = sqlx::query(GET_METRICS)
            .fetch_all(&self.pool)
            .await
            .map_err(PulseError::backend)?;

        let mut snapshot = MetricsSnapshot::default();
        for row in rows {
            let id: String = row.try_get("id").map_err(PulseError::backend)?;
            let mtype: String = row.try_get("mtype").map_err(PulseError::backend)?;
            let mdelta: Option<i64> = row.try_get("mdelta").map_err(PulseError::backend)?;
            let mvalue: Option<f64> = row.try_get("mvalue").map_err(PulseError::backend)?;

            match MetricKind::parse(&mtype) {
                Ok(MetricKind::Gauge) => {
                    let value = mvalue.ok_or_else(|| {
                        PulseError::Backend { reason: format!("gauge row {id} has no mvalue") }
                    })?;
                    snapshot.gauge.insert(id, value);
                }
                Ok(MetricKind::Counter) => {
                    let delta = mdelta.ok_or_else(|| {
                        PulseError::Backend { reason: format!("counter row {id} has no mdelta") }
                    })?;
                    snapshot.counter.insert(id, delta);
                }
                Err(_) => {
                    return Err(PulseError::Backend {
                        reason: format!("row {id} has unknown mtype {mtype:?}"),
                    })
                }
            }
        }

        self.registry.replace(snapshot).await;

        debug!("snapshot restored from database");
        Ok(())
    }
}
