use tracing::info;

mod app;
mod config;
mod grpc;
mod http;
mod snapshot;
mod state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pulse_core::observability::init()
        .map_err(|e| anyhow::anyhow!("can't initialize observability: {e}"))?;

    info!(version = env!("CARGO_PKG_VERSION"), "pulsed starting");

    let cfg = config::ServerConfig::load();
    info!(?cfg, "resolved configuration");

    app::run(cfg).await?;

    info!("pulsed shut down");
    Ok(())
}
