//! Agent task fan-out: two pollers, one reporter, graceful shutdown
//! with a final report.

use std::sync::Arc;

use sysinfo::{System, SystemExt};
use tokio::sync::{broadcast, RwLock, Semaphore};
use tracing::{info, warn};

use pulse_core::crypto::keys;
use pulse_core::{net, shutdown};

use crate::collector::{Metrics, SharedMetrics};
use crate::config::AgentConfig;
use crate::reporter::{GrpcReporter, HttpReporter, Reporter};

/// Start the agent and block until shutdown completes.
pub async fn run(cfg: AgentConfig) -> anyhow::Result<()> {
    let metrics: SharedMetrics = Arc::new(RwLock::new(Metrics::default()));

    let public_key = cfg.public_key_path.as_ref().and_then(|path| {
        match keys::load_public_key(path) {
            Ok(key) => {
                info!("public key successfully loaded");
                Some(key)
            }
            Err(err) => {
                warn!(%err, "can't get public key from file");
                None
            }
        }
    });

    let local_ip = net::outbound_ip();

    let reporter: Arc<dyn Reporter> = match cfg.grpc_endpoint.clone() {
        Some(endpoint) => {
            info!(endpoint = %endpoint, "reports go over gRPC");
            Arc::new(GrpcReporter::new(metrics.clone(), endpoint))
        }
        None => {
            let hash_key =
                (!cfg.hash_key.is_empty()).then(|| cfg.hash_key.clone().into_bytes());
            Arc::new(HttpReporter::new(
                metrics.clone(),
                cfg.report_url(),
                hash_key,
                public_key,
                local_ip,
            )?)
        }
    };

    info!(
        endpoint = %cfg.endpoint_host,
        poll_interval = ?cfg.poll_interval,
        report_interval = ?cfg.report_interval,
        "agent started"
    );

    let shutdown_tx = shutdown::shutdown_signal();

    let pollers = [
        tokio::spawn(run_runtime_poll(
            metrics.clone(),
            cfg.poll_interval,
            shutdown_tx.subscribe(),
        )),
        tokio::spawn(run_host_poll(metrics.clone(), cfg.poll_interval, shutdown_tx.subscribe())),
        tokio::spawn(run_report_send(
            reporter.clone(),
            cfg.report_interval,
            cfg.rate_limit,
            shutdown_tx.subscribe(),
        )),
    ];

    let mut shutdown_rx = shutdown_tx.subscribe();
    let _ = shutdown_rx.recv().await;

    info!("shutting down...");
    for task in pollers {
        let _ = task.await;
    }

    // one final report so nothing sampled since the last tick is lost
    match reporter.send_report().await {
        Ok(()) => info!("metrics saved to the server before shutdown"),
        Err(err) => warn!(%err, "failed to save metrics to the server before shutdown"),
    }

    info!("shutdown successfully");
    Ok(())
}

/// Sample the runtime metrics on every poll tick.
async fn run_runtime_poll(
    metrics: SharedMetrics,
    interval: std::time::Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    info!(interval = ?interval, "start update metrics job");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("update metrics job shutting down");
                return;
            }
            _ = ticker.tick() => {
                metrics.write().await.update_runtime();
            }
        }
    }
}

/// Sample host CPU and memory on every poll tick. Owns its sysinfo
/// handle so CPU deltas are computed against the previous tick.
async fn run_host_poll(
    metrics: SharedMetrics,
    interval: std::time::Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut sys = System::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    info!(interval = ?interval, "start update host metrics job");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("update host metrics job shutting down");
                return;
            }
            _ = ticker.tick() => {
                metrics.write().await.update_host(&mut sys);
            }
        }
    }
}

/// Send the collected metrics on every report tick. The semaphore
/// bounds how many sends may be in flight at once.
async fn run_report_send(
    reporter: Arc<dyn Reporter>,
    interval: std::time::Duration,
    rate_limit: usize,
    mut shutdown: broadcast::Receiver<()>,
) {
    let limiter = Arc::new(Semaphore::new(rate_limit.max(1)));
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    info!(interval = ?interval, rate_limit, "start report metrics job");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("report metrics job shutting down");
                return;
            }
            _ = ticker.tick() => {
                let Ok(permit) = limiter.clone().acquire_owned().await else {
                    return;
                };
                let reporter = reporter.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(err) = reporter.send_report().await {
                        warn!(%err, "failed to send metrics to server");
                    }
                });
            }
        }
    }
}
