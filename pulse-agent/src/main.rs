use tracing::info;

mod agent;
mod alloc;
mod collector;
mod config;
mod reporter;

#[global_allocator]
static GLOBAL: alloc::CountingAllocator = alloc::CountingAllocator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pulse_core::observability::init()
        .map_err(|e| anyhow::anyhow!("can't initialize observability: {e}"))?;

    info!(version = env!("CARGO_PKG_VERSION"), "pulse-agent starting");

    let cfg = config::AgentConfig::load();
    info!(?cfg, "resolved configuration");

    agent::run(cfg).await?;

    info!("pulse-agent shut down");
    Ok(())
}
