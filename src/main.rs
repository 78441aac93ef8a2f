//! moordns daemon entry point.

use log::{error, info};
use tokio::signal;
use tokio::sync::watch;

use moordns::config::Config;
use moordns::docker::DockerDirectory;
use moordns::server::run_dns_server;
use moordns::sync::ContainerDns;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("starting moordns with config: {:?}", cfg);

    // Container directory (Docker) and the sync engine. A failed initial
    // listing is fatal: without it there is nothing correct to serve.
    let directory = DockerDirectory::connect()?;
    let engine = ContainerDns::new(directory, cfg.domains.clone()).await?;
    let cache = engine.cache();

    // Synchronization engine
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_handle = tokio::spawn(engine.run(shutdown_rx));

    // DNS server
    let dns_cache = cache.clone();
    let domains = cfg.domains.clone();
    let dns_bind = cfg.dns_bind;
    let ttl = cfg.ttl;
    let forward = cfg.forward;
    let dns_handle = tokio::spawn(async move {
        if let Err(e) = run_dns_server(dns_bind, dns_cache, domains, ttl, forward).await {
            error!("DNS server failed: {}", e);
        }
    });

    // Graceful shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("unable to listen for shutdown signal: {}", err);
        }
    }

    let _ = shutdown_tx.send(true);
    dns_handle.abort();
    let _ = sync_handle.await;

    info!("shutdown complete");
    Ok(())
}
