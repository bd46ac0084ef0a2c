//! gRPC report transport.

use std::time::Duration;

use async_trait::async_trait;
use tonic::codec::CompressionEncoding;
use tonic::Code;
use tracing::{info, warn};

use pulse_api::pulse::v1::metrics_service_client::MetricsServiceClient;
use pulse_api::pulse::v1::{Metric as ProtoMetric, MetricsRequest};
use pulse_core::{PulseError, Result};

use crate::collector::SharedMetrics;
use crate::reporter::Reporter;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// 3 attempts, 1 s initial backoff, multiplier 2.0, capped at 3 s.
const RETRY_BACKOFF: [Duration; 2] = [Duration::from_secs(1), Duration::from_secs(2)];

/// Ships reports as a gzip-compressed unary `Updates` call, retrying
/// only on `UNAVAILABLE`.
pub struct GrpcReporter {
    metrics: SharedMetrics,
    endpoint: String,
}

impl GrpcReporter {
    pub fn new(metrics: SharedMetrics, endpoint: String) -> Self {
        let endpoint = if endpoint.contains("://") {
            endpoint
        } else {
            format!("http://{endpoint}")
        };
        Self { metrics, endpoint }
    }

    async fn build_payload(&self) -> Vec<ProtoMetric> {
        let metrics = self.metrics.read().await;

        let gauges = metrics.gauge_report();
        let counters = metrics.counter_report();

        let mut payload = Vec::with_capacity(gauges.len() + counters.len());
        for (id, value) in gauges {
            payload.push(ProtoMetric { delta: 0, value, id, mtype: "gauge".to_string() });
        }
        for (id, delta) in counters {
            payload.push(ProtoMetric { delta, value: 0.0, id, mtype: "counter".to_string() });
        }
        payload
    }

    async fn try_send(&self, payload: Vec<ProtoMetric>) -> std::result::Result<(), tonic::Status> {
        let mut client = MetricsServiceClient::connect(self.endpoint.clone())
            .await
            .map_err(|e| tonic::Status::unavailable(e.to_string()))?
            .send_compressed(CompressionEncoding::Gzip);

        let mut request = tonic::Request::new(MetricsRequest { metrics: payload });
        request.set_timeout(REQUEST_TIMEOUT);

        client.updates(request).await.map(|_| ())
    }
}

#[async_trait]
impl Reporter for GrpcReporter {
    async fn send_report(&self) -> Result<()> {
        let payload = self.build_payload().await;
        let count = payload.len();

        let mut last_status;
        let mut delays = RETRY_BACKOFF.iter();
        loop {
            match self.try_send(payload.clone()).await {
                Ok(()) => {
                    info!(metrics = count, "report sent");
                    return Ok(());
                }
                Err(status) => {
                    last_status = status;
                }
            }

            // only UNAVAILABLE is worth another attempt
            if last_status.code() != Code::Unavailable {
                break;
            }
            match delays.next() {
                Some(delay) => {
                    warn!(code = %last_status.code(), delay = ?delay, "can't send report, retrying");
                    tokio::time::sleep(*delay).await;
                }
                None => break,
            }
        }

        Err(PulseError::transport(format!(
            "{} {}",
            last_status.code(),
            last_status.message()
        )))
    }
}
