//! Aggregation service: validates and routes typed upserts into the
//! registry and produces read projections for the transport layers.

use std::sync::Arc;

use crate::error::{PulseError, Result};
use crate::metrics::{Metric, MetricKind, MetricRegistry, MetricsSnapshot};

/// Cheaply clonable handle over the shared [`MetricRegistry`].
#[derive(Debug, Clone, Default)]
pub struct MetricsService {
    registry: Arc<MetricRegistry>,
}

impl MetricsService {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self { registry }
    }

    /// The underlying registry, for snapshot writers.
    pub fn registry(&self) -> Arc<MetricRegistry> {
        self.registry.clone()
    }

    /// Parse and apply an untyped upsert, as received on the URL form.
    /// The kind is matched case-insensitively here.
    pub async fn upsert(&self, kind: &str, name: &str, raw_value: &str) -> Result<()> {
        match MetricKind::parse_relaxed(kind)? {
            MetricKind::Gauge => {
                let value: f64 = raw_value
                    .parse()
                    .map_err(|_| PulseError::BadValue { value: raw_value.to_string() })?;
                self.registry.update_gauge(name, value).await;
            }
            MetricKind::Counter => {
                let delta: i64 = raw_value
                    .parse()
                    .map_err(|_| PulseError::BadValue { value: raw_value.to_string() })?;
                self.registry.update_counter(name, delta).await;
            }
        }
        Ok(())
    }

    /// Apply a typed upsert and read the stored value back. Gauges echo
    /// the submitted value; counters echo the accumulated total.
    pub async fn upsert_typed(&self, metric: &Metric) -> Result<Metric> {
        match MetricKind::parse(&metric.mtype)? {
            MetricKind::Gauge => {
                let value = metric
                    .value
                    .ok_or_else(|| PulseError::EmptyValue { kind: metric.mtype.clone() })?;
                self.registry.update_gauge(&metric.id, value).await;

                let stored = self.registry.gauge(&metric.id).await?;
                Ok(Metric::gauge(metric.id.clone(), stored))
            }
            MetricKind::Counter => {
                let delta = metric
                    .delta
                    .ok_or_else(|| PulseError::EmptyValue { kind: metric.mtype.clone() })?;
                self.registry.update_counter(&metric.id, delta).await;

                let stored = self.registry.counter(&metric.id).await?;
                Ok(Metric::counter(metric.id.clone(), stored))
            }
        }
    }

    /// Look a metric up by kind and name. The kind is matched exactly,
    /// as on JSON payloads.
    pub async fn metric(&self, kind: &str, name: &str) -> Result<(Option<i64>, Option<f64>)> {
        match MetricKind::parse(kind)? {
            MetricKind::Counter => Ok((Some(self.registry.counter(name).await?), None)),
            MetricKind::Gauge => Ok((None, Some(self.registry.gauge(name).await?))),
        }
    }

    /// A consistent view of everything currently known.
    pub async fn all_metrics(&self) -> MetricsSnapshot {
        self.registry.snapshot().await
    }
}
