//! cardroom server binary.

use cardroom::api::handlers::AppState;
use cardroom::api::ApiServer;
use cardroom::bets::BetRegistry;
use cardroom::catalog::CardCatalog;
use cardroom::config::{generate_sample_config, ConfigLoader};
use cardroom::oracle::HttpOracle;
use cardroom::settlement::SettlementEngine;
use cardroom::stats::StatsAggregator;
use cardroom::store::LedgerStore;
use cardroom::wallet::WalletAccessor;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cardroom")]
#[command(about = "Chip-betting ledger and settlement service", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Database directory (overrides config)
    #[arg(long)]
    data_dir: Option<String>,

    /// API listen port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Scoring oracle base URL (overrides config)
    #[arg(long)]
    oracle_url: Option<String>,

    /// Write a sample configuration file to the given path and exit
    #[arg(long)]
    generate_config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardroom=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    if let Some(path) = args.generate_config {
        generate_sample_config(&path)?;
        info!("sample configuration written to {}", path);
        return Ok(());
    }

    let mut loader = ConfigLoader::new();
    if let Some(ref path) = args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;

    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(url) = args.oracle_url {
        config.oracle.base_url = url;
    }

    info!("opening ledger store at {}", config.storage.data_dir);
    let store = LedgerStore::open(&config.storage.data_dir, config.storage.txn_retry_budget)?;

    let wallets = WalletAccessor::new(store.clone(), &config.economy);
    let catalog = CardCatalog::new(store.clone(), wallets.clone());
    let registry = BetRegistry::new(store.clone(), wallets.clone(), catalog.clone());
    let stats = StatsAggregator::new(store.clone());

    let seeded = catalog.ensure_seeded()?;
    if seeded > 0 {
        info!(cards = seeded, "installed starter card catalog");
    }

    let oracle = Arc::new(HttpOracle::new(&config.oracle)?);
    let engine = Arc::new(SettlementEngine::new(
        store,
        registry.clone(),
        wallets.clone(),
        stats.clone(),
        oracle,
        config.oracle.clone(),
    ));

    if !config.api.enabled {
        info!("API disabled by configuration; nothing to serve");
        return Ok(());
    }

    let state = Arc::new(AppState {
        wallets,
        catalog,
        registry,
        stats,
        engine,
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    ApiServer::new(config.api.clone(), state).run().await
}
