use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pond_arena_server::config::ServerConfig;
use pond_arena_server::metrics::Metrics;
use pond_arena_server::net::game_session::spawn_session_host;
use pond_arena_server::net::transport::WebTransportServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Pond Arena Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {}:{}, tick rate {} Hz",
        config.bind_address, config.port, config.tick_rate
    );

    let metrics = Arc::new(Metrics::new());

    #[cfg(feature = "metrics_endpoint")]
    {
        let metrics = metrics.clone();
        let address = config.bind_address.to_string();
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = pond_arena_server::metrics::start_metrics_server(metrics, &address, port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let commands = spawn_session_host(config.clone(), metrics.clone());
    let server = WebTransportServer::new(config.clone(), commands, metrics.clone()).await?;

    info!("Server ready on https://{}", server.bind_addr());
    info!("Certificate hash: {}", server.cert_hash());
    info!(
        "Chrome flag: --ignore-certificate-errors-spki-list={}",
        server.cert_hash()
    );

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
            }
        }
    }

    info!("Server stopped");
    Ok(())
}
