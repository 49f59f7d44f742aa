//! access-sync - access-control connector for the device graph

use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use access_sync::{
    config::Args,
    sync::FileCheckpoint,
    ApiClient, InMemoryGraph, SyncEngine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("access_sync={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let client_config = args.client_config()?;
    let topology = args.topology()?;
    let engine_config = args.engine_config()?;

    info!("======================================");
    info!("  access-sync");
    info!("======================================");
    info!("API: {}", client_config.base_url);
    info!("Network: {} / {}", topology.network_context, topology.virtual_network);
    info!("Occupants: {}", topology.occupant_context);
    info!("Pull interval: {}ms", engine_config.period.as_millis());
    info!("Checkpoint: {}", args.sync_state_path.display());
    info!("======================================");

    let source = Arc::new(ApiClient::new(client_config)?);

    // Standalone mode: the graph lives in memory, pre-provisioned with the anchors
    let graph = Arc::new(
        InMemoryGraph::with_topology(&topology.network_context, &topology.virtual_network).await,
    );
    let checkpoint = Arc::new(FileCheckpoint::open(&args.sync_state_path).await);

    let mut engine = SyncEngine::new(engine_config, topology, source, graph, checkpoint);
    let cancel = CancellationToken::new();
    let engine_cancel = cancel.clone();
    let mut engine_handle = tokio::spawn(async move { engine.run(engine_cancel).await });

    let shutdown = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            true
        }
        result = &mut engine_handle => {
            match result {
                Ok(Ok(())) => info!("Sync engine exited"),
                Ok(Err(e)) => {
                    error!("Sync engine failed: {}", e);
                    std::process::exit(1);
                }
                Err(e) => {
                    error!("Sync engine task error: {}", e);
                    std::process::exit(1);
                }
            }
            false
        }
    };

    if shutdown {
        cancel.cancel();
        // An in-flight cycle is allowed to finish
        match engine_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Sync engine error during shutdown: {}", e),
            Err(e) => error!("Sync engine task error: {}", e),
        }
    }

    info!("access-sync stopped");
    Ok(())
}
