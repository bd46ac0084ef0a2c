//! Server wiring: storage selection, restore, transports, shutdown.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::codec::CompressionEncoding;
use tracing::{info, warn};

use pulse_api::pulse::v1::metrics_service_server::MetricsServiceServer;
use pulse_core::crypto::keys;
use pulse_core::net::Cidr;
use pulse_core::storage::{database, migrations};
use pulse_core::{
    shutdown, DbStorage, FileStorage, MetricRegistry, MetricsService, PersistentStorage, Result,
};

use crate::config::ServerConfig;
use crate::grpc::MetricsGrpc;
use crate::state::AppState;
use crate::{http, snapshot};

/// Start the metrics server and block until shutdown completes.
pub async fn run(cfg: ServerConfig) -> anyhow::Result<()> {
    let registry = Arc::new(MetricRegistry::new());
    let service = MetricsService::new(registry.clone());

    let (db, storage) = setup_persistent_storage(&cfg, registry.clone()).await;

    if cfg.restore {
        match &storage {
            Some(storage) => match storage.restore().await {
                Ok(()) => info!("metrics restored from persistent storage"),
                Err(err) => {
                    warn!(%err, "can't restore metrics from persistent storage, starting empty")
                }
            },
            None => warn!("restore requested but no persistent storage is configured"),
        }
    }

    let private_key = cfg.private_key_path.as_ref().and_then(|path| {
        match keys::load_private_key(path) {
            Ok(key) => {
                info!("private key successfully loaded");
                Some(Arc::new(key))
            }
            Err(err) => {
                warn!(%err, "can't get private key from file");
                None
            }
        }
    });

    let trusted_subnet = if cfg.trusted_subnet.is_empty() {
        None
    } else {
        match cfg.trusted_subnet.parse::<Cidr>() {
            Ok(subnet) => Some(subnet),
            Err(err) => {
                warn!(%err, "can't parse trusted subnet CIDR");
                None
            }
        }
    };

    let sync_save = cfg.store_interval == 0 && storage.is_some();
    if sync_save {
        info!("all data will be saved synchronously");
    }

    let state = AppState {
        service: service.clone(),
        db,
        hash_key: (!cfg.hash_key.is_empty()).then(|| Arc::new(cfg.hash_key.clone().into_bytes())),
        private_key,
        trusted_subnet,
        storage: storage.clone(),
        sync_save,
    };

    let shutdown_tx = shutdown::shutdown_signal();

    let mut background = Vec::new();

    if let Some(storage) = storage.clone() {
        if cfg.store_interval > 0 {
            info!(interval = cfg.store_interval, "all data will be saved asynchronously");
            background.push(tokio::spawn(snapshot::run_periodic(
                storage,
                std::time::Duration::from_secs(cfg.store_interval),
                shutdown_tx.subscribe(),
            )));
        }
    }

    if let Some(grpc_endpoint) = cfg.grpc_endpoint.clone() {
        let grpc_service = MetricsGrpc::new(service.clone(), storage.clone(), sync_save);
        let rx = shutdown_tx.subscribe();
        background.push(tokio::spawn(async move {
            if let Err(err) = serve_grpc(grpc_endpoint, grpc_service, rx).await {
                warn!(%err, "gRPC server");
            }
        }));
    }

    serve_http(&cfg.endpoint, http::router(state), shutdown_tx.subscribe()).await?;

    for task in background {
        let _ = task.await;
    }

    if let Some(storage) = &storage {
        match storage.save().await {
            Ok(()) => info!("all metrics saved to persistent storage successfully"),
            Err(err) => {
                warn!(%err, "can't save metrics to persistent storage before shutting down")
            }
        }
    }

    Ok(())
}

/// Pick the persistent backend: database when a DSN is set, else the
/// file snapshot, else none. Backend setup failures degrade the server
/// to in-memory only.
async fn setup_persistent_storage(
    cfg: &ServerConfig,
    registry: Arc<MetricRegistry>,
) -> (Option<PgPool>, Option<Arc<dyn PersistentStorage>>) {
    if !cfg.database_dsn.is_empty() {
        return match setup_database(&cfg.database_dsn, registry).await {
            Ok((pool, storage)) => (Some(pool), Some(storage)),
            Err(err) => {
                warn!(%err, "can't setup persistent storage");
                (None, None)
            }
        };
    }

    if !cfg.file_storage_path.is_empty() {
        info!(path = %cfg.file_storage_path, "all data will be saved to file");
        return (None, Some(Arc::new(FileStorage::new(&cfg.file_storage_path, registry))));
    }

    info!("no persistent storage configured");
    (None, None)
}

async fn setup_database(
    dsn: &str,
    registry: Arc<MetricRegistry>,
) -> Result<(PgPool, Arc<dyn PersistentStorage>)> {
    let pool = database::connect(dsn).await?;
    migrations::run(&pool).await?;

    info!("all data will be saved to database");
    let storage: Arc<dyn PersistentStorage> = Arc::new(DbStorage::new(registry, pool.clone()));
    Ok((pool, storage))
}

async fn serve_http(
    endpoint: &str,
    app: axum::Router,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(endpoint)
        .await
        .with_context(|| format!("can't bind HTTP endpoint {endpoint}"))?;

    info!(addr = %endpoint, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            info!("gracefully shutting down HTTP server...");
        })
        .await
        .context("HTTP server")?;

    Ok(())
}

async fn serve_grpc(
    endpoint: String,
    service: MetricsGrpc,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&endpoint)
        .await
        .with_context(|| format!("can't bind gRPC endpoint {endpoint}"))?;

    info!(addr = %endpoint, "gRPC server started");

    tonic::transport::Server::builder()
        .add_service(
            MetricsServiceServer::new(service).accept_compressed(CompressionEncoding::Gzip),
        )
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
            let _ = shutdown.recv().await;
            info!("gracefully shutting down gRPC server...");
        })
        .await
        .context("gRPC server")?;

    Ok(())
}
