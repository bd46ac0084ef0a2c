//! In-memory authoritative metric state.

use std::collections::BTreeMap;

use tokio::sync::RwLock;

use crate::error::{PulseError, Result};
use crate::metrics::MetricsSnapshot;

#[derive(Debug, Default)]
struct Maps {
    gauge: BTreeMap<String, f64>,
    counter: BTreeMap<String, i64>,
}

/// The registry holds two name-keyed mappings, one per metric kind,
/// behind a single lock. Writers take the lock exclusively, so readers
/// never observe a half-applied upsert.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    maps: RwLock<Maps>,
}

impl MetricRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a gauge to the incoming value, replacing any previous one.
    pub async fn update_gauge(&self, name: &str, value: f64) {
        let mut maps = self.maps.write().await;
        maps.gauge.insert(name.to_string(), value);
    }

    /// Add a delta to a counter; an absent counter starts at zero.
    pub async fn update_counter(&self, name: &str, delta: i64) {
        let mut maps = self.maps.write().await;
        *maps.counter.entry(name.to_string()).or_insert(0) += delta;
    }

    /// Get a gauge value by name.
    pub async fn gauge(&self, name: &str) -> Result<f64> {
        let maps = self.maps.read().await;
        maps.gauge
            .get(name)
            .copied()
            .ok_or_else(|| PulseError::NotFound { kind: "gauge", name: name.to_string() })
    }

    /// Get a counter value by name.
    pub async fn counter(&self, name: &str) -> Result<i64> {
        let maps = self.maps.read().await;
        maps.counter
            .get(name)
            .copied()
            .ok_or_else(|| PulseError::NotFound { kind: "counter", name: name.to_string() })
    }

    /// Return a point-in-time view of both mappings. Reads within one
    /// snapshot are mutually consistent.
    pub async fn snapshot(&self) -> MetricsSnapshot {
        let maps = self.maps.read().await;
        MetricsSnapshot { counter: maps.counter.clone(), gauge: maps.gauge.clone() }
    }

    /// Atomically swap both mappings with the snapshot's contents.
    pub async fn replace(&self, snapshot: MetricsSnapshot) {
        let mut maps = self.maps.write().await;
        maps.counter = snapshot.counter;
        maps.gauge = snapshot.gauge;
    }
}
