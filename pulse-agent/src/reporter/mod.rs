//! Report transport.
//!
//! A reporter flattens the current sampled state into a batch of wire
//! records and ships it to the server. Two transports exist: HTTP
//! (JSON, signed/encrypted/compressed) and gRPC (protobuf,
//! gzip-compressed).

use async_trait::async_trait;

use pulse_core::{Metric, Result};

use crate::collector::Metrics;

pub mod grpc;
pub mod http;

pub use grpc::GrpcReporter;
pub use http::HttpReporter;

/// Something that can deliver one report of the current metrics.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn send_report(&self) -> Result<()>;
}

/// Flatten the sampled state into wire records, gauges first.
pub fn build_payload(metrics: &Metrics) -> Vec<Metric> {
    let gauges = metrics.gauge_report();
    let counters = metrics.counter_report();

    let mut payload = Vec::with_capacity(gauges.len() + counters.len());
    for (name, value) in gauges {
        payload.push(Metric::gauge(name, value));
    }
    for (name, delta) in counters {
        payload.push(Metric::counter(name, delta));
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_payload_covers_both_kinds() {
        let mut metrics = Metrics::default();
        metrics.update_runtime();

        let payload = build_payload(&metrics);

        let poll = payload.iter().find(|m| m.id == "PollCount").unwrap();
        assert_eq!(poll.mtype, "counter");
        assert_eq!(poll.delta, Some(1));
        assert_eq!(poll.value, None);

        let random = payload.iter().find(|m| m.id == "RandomValue").unwrap();
        assert_eq!(random.mtype, "gauge");
        assert!(random.value.is_some());
        assert!(random.delta.is_none());
    }
}
