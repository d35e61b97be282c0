//! chainsync CLI — run and inspect the Linea event indexer.
//!
//! ```bash
//! chainsync run      --config chainsync.yaml
//! chainsync validate --config chainsync.yaml
//! chainsync info
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use chainsync_core::config::Config;
use chainsync_engine::{Broadcaster, Engine, HandlerRegistry};
use chainsync_observability::{init_tracing, LogConfig};

mod handlers;

#[derive(Parser)]
#[command(
    name = "chainsync",
    about = "Event indexer for ZK-finalized EVM chains",
    version
)]
struct Cli {
    /// Emit JSON structured logs
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync engine
    Run {
        /// Path to the YAML configuration file
        #[arg(short, long, default_value = "chainsync.yaml")]
        config: String,
    },

    /// Load and validate a configuration file, then exit
    Validate {
        #[arg(short, long, default_value = "chainsync.yaml")]
        config: String,
    },

    /// Show build and defaults info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&LogConfig {
        json: cli.json_logs,
        ..LogConfig::default()
    });

    match cli.command {
        Commands::Run { config } => run(&config).await,
        Commands::Validate { config } => {
            let cfg = Config::load(&config)
                .with_context(|| format!("loading config from {config}"))?;
            println!("configuration OK: {} on {}", cfg.name, cfg.network);
            println!("  chain ID:  {}", cfg.chain_id);
            println!("  rpc:       {}", cfg.rpc_url);
            println!("  contracts: {}", cfg.contracts.keys().cloned().collect::<Vec<_>>().join(", "));
            Ok(())
        }
        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

async fn run(config_path: &str) -> Result<()> {
    let cfg = Config::load(config_path)
        .with_context(|| format!("loading config from {config_path}"))?;

    let registry = Arc::new(HandlerRegistry::new());
    // Standard ERC-20 transfers get the built-in typed table.
    for (name, contract) in &cfg.contracts {
        if contract.events.iter().any(|e| e == "Transfer") {
            registry.register(format!("{name}:Transfer"), Arc::new(handlers::TransferHandler));
        }
    }
    tracing::info!(handlers = ?registry.list(), "handlers registered");

    let broadcaster = Broadcaster::default();
    let mut engine = Engine::new(cfg, registry, broadcaster)
        .await
        .context("constructing engine")?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    engine.run(shutdown_rx).await?;
    engine.close().await;
    Ok(())
}

fn cmd_info() {
    println!("chainsync {}", env!("CARGO_PKG_VERSION"));
    println!("  Networks: linea-mainnet (59144), linea-sepolia (59141)");
    println!("  Default batch size: 1000 blocks/call");
    println!("  Default poll interval: 2s");
    println!("  Default retries: 3 (1s backoff, doubling)");
    println!("  Circuit breaker: 5 consecutive failures, 30s open, 5 probes");
    println!("  Storage: PostgreSQL (events + typed tables)");
}
