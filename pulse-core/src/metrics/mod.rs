//! Metric model: kinds, the wire record, and point-in-time snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PulseError, Result};

pub mod registry;
pub mod service;

pub use registry::MetricRegistry;
pub use service::MetricsService;

/// The two metric kinds the pipeline understands.
///
/// A gauge is a replaceable float observation; a counter accumulates
/// signed integer deltas. Names are not namespaced per kind, so a gauge
/// and a counter may share a name and stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    /// Parse a kind exactly as it appears on JSON and gRPC payloads.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(PulseError::UnknownKind { kind: s.to_string() }),
        }
    }

    /// Parse a kind from a URL path segment, case-insensitively.
    pub fn parse_relaxed(s: &str) -> Result<Self> {
        Self::parse(s.to_ascii_lowercase().as_str())
            .map_err(|_| PulseError::UnknownKind { kind: s.to_string() })
    }

    /// Convert to the canonical wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

/// A single metric record as it travels over the wire.
///
/// Exactly one of `value` / `delta` is populated, matching `mtype`.
/// Field order matters for response bodies: `delta`, `value`, `id`, `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub mtype: String,
}

impl Metric {
    /// Build a gauge record.
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            delta: None,
            value: Some(value),
            id: id.into(),
            mtype: MetricKind::Gauge.as_str().to_string(),
        }
    }

    /// Build a counter record.
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            delta: Some(delta),
            value: None,
            id: id.into(),
            mtype: MetricKind::Counter.as_str().to_string(),
        }
    }

    /// Validate the always-required fields, returning one message per
    /// missing field.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.mtype.trim().is_empty() {
            missing.push("field \"type\" is required".to_string());
        }
        if self.id.trim().is_empty() {
            missing.push("field \"id\" is required".to_string());
        }
        missing
    }
}

/// A point-in-time dump of the registry. Doubles as the file snapshot
/// document: `{"Counter":{…},"Gauge":{…}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(rename = "Counter")]
    pub counter: BTreeMap<String, i64>,
    #[serde(rename = "Gauge")]
    pub gauge: BTreeMap<String, f64>,
}

impl MetricsSnapshot {
    /// Flatten the snapshot into wire records, gauges first.
    pub fn to_records(&self) -> Vec<Metric> {
        let mut records = Vec::with_capacity(self.gauge.len() + self.counter.len());
        for (name, value) in &self.gauge {
            records.push(Metric::gauge(name.clone(), *value));
        }
        for (name, delta) in &self.counter {
            records.push(Metric::counter(name.clone(), *delta));
        }
        records
    }
}
