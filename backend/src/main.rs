//! livecast server entry point

use std::sync::Arc;

use anyhow::Result;

use livecast::api;
use livecast::config::Config;
use livecast::services::{
    DatabaseServiceConfig, HttpServerConfig, ServicesManager, StreamServiceConfig, init_tracing,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(Config::from_env()?);

    init_tracing(config.log_format)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        hls_dir = %config.hls_dir.display(),
        "Starting livecast"
    );

    let builder = ServicesManager::builder()
        .add_service(DatabaseServiceConfig::from_url(&config.database_url))
        .add_service(StreamServiceConfig::from_config(&config))
        .add_service(HttpServerConfig {
            config: config.clone(),
        });
    let services = api::with_api_routes(builder).start().await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping services");
    services.stop_all().await?;

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
