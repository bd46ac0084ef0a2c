//! gRPC transport: unary batch ingestion mirroring the HTTP surface.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{error, info, instrument};

use pulse_api::pulse::v1::metrics_service_server::MetricsService as GrpcMetricsService;
use pulse_api::pulse::v1::MetricsRequest;
use pulse_core::{Metric, MetricsService, PersistentStorage, PulseError};

use crate::snapshot;

/// gRPC service implementation.
pub struct MetricsGrpc {
    service: MetricsService,
    storage: Option<Arc<dyn PersistentStorage>>,
    /// Save after every successful request (store-interval 0).
    sync_save: bool,
}

impl MetricsGrpc {
    pub fn new(
        service: MetricsService,
        storage: Option<Arc<dyn PersistentStorage>>,
        sync_save: bool,
    ) -> Self {
        Self { service, storage, sync_save }
    }
}

#[tonic::async_trait]
impl GrpcMetricsService for MetricsGrpc {
    #[instrument(skip(self, request), fields(metrics = request.get_ref().metrics.len()))]
    async fn updates(&self, request: Request<MetricsRequest>) -> Result<Response<()>, Status> {
        info!("gRPC: Updates");

        let req = request.into_inner();

        for metric in &req.metrics {
            let record = Metric {
                delta: Some(metric.delta),
                value: Some(metric.value),
                id: metric.id.clone(),
                mtype: metric.mtype.clone(),
            };

            let missing = record.missing_fields();
            if !missing.is_empty() {
                return Err(Status::invalid_argument(missing.join(", ")));
            }

            match self.service.upsert_typed(&record).await {
                Ok(_) => {}
                Err(err @ PulseError::EmptyValue { .. })
                | Err(err @ PulseError::UnknownKind { .. }) => {
                    info!(%err, kind = %metric.mtype, "invalid metric record");
                    return Err(Status::invalid_argument(err.to_string()));
                }
                Err(err) => {
                    info!(%err, kind = %metric.mtype, name = %metric.id, "can't get updated value");
                    return Err(Status::internal(""));
                }
            }
        }

        if let Some(storage) = self.storage.as_ref().filter(|_| self.sync_save) {
            match snapshot::save_with_retry(storage).await {
                Ok(()) => info!("all metrics saved successfully"),
                Err(err) => error!(%err, "can't save metrics"),
            }
        }

        Ok(Response::new(()))
    }
}
