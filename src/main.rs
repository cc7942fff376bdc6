//! HBNB - storage-backed REST server
//!
//! Selects the storage backend from configuration, loads it, and serves the
//! REST API until interrupted.

use std::sync::Arc;

use clap::Parser;
use hbnb::config::{ApiConfig, StorageConfig};
use hbnb::{api, StorageEngine, APP_NAME, APP_VERSION};

// =============================================================================
// CLI
// =============================================================================

/// HBNB - rental listing storage and search
#[derive(Parser, Debug)]
#[command(name = APP_NAME)]
#[command(about = "Rental listing storage and search service")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    storage: StorageConfig,

    #[command(flatten)]
    api: ApiConfig,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Environment from .env feeds the clap env fallbacks
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    tracing::info!("HBNB v{}", APP_VERSION);
    tracing::info!(storage = %cli.storage.kind, "Storage backend selected");

    let engine = Arc::new(StorageEngine::open(&cli.storage).await?);
    let app = api::router(Arc::clone(&engine));

    let address = cli.api.bind_address();
    let listener = tokio::net::TcpListener::bind((cli.api.host.as_str(), cli.api.port)).await?;
    tracing::info!("Starting HTTP server on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
