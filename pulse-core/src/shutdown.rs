//! Graceful shutdown handling.
//!
//! Provides a process-wide shutdown broadcast driven by SIGINT,
//! SIGTERM, and SIGQUIT. Every long-lived task subscribes and winds
//! down when the channel fires.

use tokio::sync::broadcast;
use tracing::info;

/// Create a shutdown signal broadcaster.
///
/// Returns a sender whose subscribers receive one message when
/// SIGINT, SIGTERM, or SIGQUIT arrives.
pub fn shutdown_signal() -> broadcast::Sender<()> {
    let (tx, _) = broadcast::channel(1);
    let sender = tx.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(unix)]
        let quit = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::quit())
                .expect("Failed to install SIGQUIT handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        #[cfg(not(unix))]
        let quit = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C)");
            }
            _ = terminate => {
                info!("Received SIGTERM");
            }
            _ = quit => {
                info!("Received SIGQUIT");
            }
        }

        let _ = sender.send(());
    });

    tx
}
