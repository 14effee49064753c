mod amount;
mod api;
mod chain;
mod config;
mod db;
mod decoder;
mod models;
mod payload;
mod pipeline;
mod registry;
mod rpc;
mod settlement;

use std::sync::{Arc, Mutex};
use tokio::signal;
use tracing::{error, info};

use chain::HttpChainClient;
use pipeline::Pipeline;
use registry::TokenRegistry;
use settlement::SettlementEngine;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transfer_settler=debug,info".into()),
        )
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();

    info!("Transfer settler starting...");

    // Load configuration
    let cfg = config::load()?;
    info!("Loaded config:");
    info!("  RPC URL: {}", cfg.rpc_http_url);
    info!("  TX RPC URL: {}", cfg.tx_rpc_url);
    info!("  DB Path: {}", cfg.db_path);
    info!("  Port: {}", cfg.port);
    info!("  Service wallet: {}", cfg.service_wallet);
    info!("  Trigger token: {}", cfg.trigger_token);
    info!("  Minted token: {} ({} decimals, x{} multiplier)",
        cfg.minted_token, cfg.minted_token_decimals, cfg.mint_multiplier);
    info!("  Tokens tracked: {}", cfg.tokens.len());

    // Run DB migrations once at startup
    {
        let conn = db::connect(&cfg.db_path)?;
        db::run_migrations(&conn)?;
    }

    // Shared DB connection
    let shared_conn = Arc::new(Mutex::new(db::connect(&cfg.db_path)?));

    let registry = TokenRegistry::from_entries(&cfg.tokens);
    let chain = HttpChainClient::new(
        cfg.tx_rpc_url.clone(),
        cfg.rpc_http_url.clone(),
        cfg.service_wallet,
        cfg.minted_token,
    )?;
    let engine = SettlementEngine::new(chain, &cfg);
    let pipeline = Arc::new(Pipeline::new(Arc::clone(&shared_conn), registry, engine));

    // Spawn API task
    let api_handle = tokio::spawn({
        let cfg = cfg.clone();
        let conn = Arc::clone(&shared_conn);
        async move { api::serve(cfg, conn, pipeline).await }
    });

    // Graceful shutdown
    tokio::select! {
        res = api_handle => match res {
            Ok(Ok(_)) => info!("API exited cleanly"),
            Ok(Err(e)) => error!("API error: {:?}", e),
            Err(e) => error!("API task panicked: {:?}", e),
        },
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received, stopping...");
        }
    }

    info!("Transfer settler stopped.");
    Ok(())
}
