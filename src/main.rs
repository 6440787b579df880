//! Cross-chain transaction engine.
//!
//! # Architecture Overview
//!
//! ```text
//!   CLI command ─────────────┐
//!                            ▼
//!                   ┌──────────────────┐      ┌────────────────┐
//!                   │  bridge engine   │─────▶│ transfer store │
//!                   └───────┬──────────┘      └────────────────┘
//!                           │ lock / unlock          ▲
//!                           ▼                        │ checkpoints
//!                   ┌──────────────────┐      ┌──────┴─────────┐
//!                   │   transaction    │      │ bridge watcher │ (one per chain)
//!                   │    submitter     │      └──────┬─────────┘
//!                   └───────┬──────────┘             │ eth_getLogs
//!                           ▼                        ▼
//!                   ┌─────────────────────────────────────────┐
//!                   │     client pool (one RPC per chain)     │
//!                   └─────────────────────────────────────────┘
//! ```

use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy::primitives::{Address, TxHash, U256};
use clap::{Parser, Subcommand};
use serde_json::json;

use crosschain_engine::blockchain::gas;
use crosschain_engine::bridge::{spawn_watchers, TransferFilter, TransferRequest, TransferStatus};
use crosschain_engine::config::loader::load_config;
use crosschain_engine::config::watcher::ConfigWatcher;
use crosschain_engine::lifecycle::{build_runtime, wait_for_shutdown_signal, Runtime, Shutdown};
use crosschain_engine::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "crosschain-engine")]
#[command(about = "Multi-chain transaction lifecycle and lock/unlock bridge engine", long_about = None)]
struct Cli {
    /// Engine configuration file.
    #[arg(short, long, default_value = "engine.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run bridge watchers until interrupted
    Run,
    /// Lock value on the source chain for release on the destination chain
    Transfer {
        #[arg(long)]
        from_chain: u64,
        #[arg(long)]
        to_chain: u64,
        /// Sending account (must be in BRIDGE_ACCOUNT_KEYS)
        #[arg(long)]
        from: Address,
        #[arg(long)]
        to: Address,
        /// Token contract; omit for the native asset
        #[arg(long, default_value_t = Address::ZERO)]
        token: Address,
        /// Amount in the asset's smallest unit
        #[arg(long)]
        amount: U256,
    },
    /// List transfer records, newest first
    List {
        #[arg(long)]
        from_chain: Option<u64>,
        #[arg(long)]
        to_chain: Option<u64>,
        /// Matches sender or recipient
        #[arg(long)]
        address: Option<Address>,
        /// 0 locked-pending, 1 locked-confirmed, 2 unlocked-pending, 3 completed
        #[arg(long)]
        status: Option<u8>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        page_size: usize,
    },
    /// Re-send a pending transaction with a higher fee
    Accelerate {
        #[arg(long)]
        chain: u64,
        tx_hash: TxHash,
    },
    /// Replace a pending transaction with a zero-value self transfer
    Cancel {
        #[arg(long)]
        chain: u64,
        tx_hash: TxHash,
    },
    /// Show the current fee market and speed tiers
    Gas {
        #[arg(long)]
        chain: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    logging::init_logging(&config.observability.log_level);

    tracing::info!(
        config = %cli.config.display(),
        chains = config.chains.len(),
        "crosschain-engine v0.1.0 starting"
    );

    let runtime = build_runtime(config)?;

    // Every exit path, including a failed command, closes connections and flushes the store.
    let result = execute(&runtime, cli.command, &cli.config).await;
    runtime.shutdown();
    result
}

async fn execute(
    runtime: &Runtime,
    command: Commands,
    config_path: &Path,
) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Run => run(runtime, config_path).await,
        Commands::Transfer {
            from_chain,
            to_chain,
            from,
            to,
            token,
            amount,
        } => {
            let initiated = runtime
                .engine
                .initiate_transfer(TransferRequest {
                    from_chain_id: from_chain,
                    to_chain_id: to_chain,
                    from_address: from,
                    to_address: to,
                    token_address: token,
                    amount,
                })
                .await?;
            let explorer = runtime
                .registry
                .get(from_chain)
                .ok()
                .and_then(|c| c.explorer_tx_url(&initiated.tx_hash.to_string()));
            print_json(&json!({
                "tx_hash": initiated.tx_hash,
                "nonce": initiated.nonce,
                "explorer": explorer,
                "transfer": initiated.transfer,
            }))
        }
        Commands::List {
            from_chain,
            to_chain,
            address,
            status,
            page,
            page_size,
        } => {
            let status = match status {
                Some(code) => Some(
                    TransferStatus::from_u8(code)
                        .ok_or_else(|| format!("unknown transfer status {}", code))?,
                ),
                None => None,
            };
            let filter = TransferFilter {
                from_chain_id: from_chain,
                to_chain_id: to_chain,
                address,
                status,
            };
            let listed = runtime
                .engine
                .list_transfers(&filter, page, page_size)
                .await?;
            print_json(&json!({
                "total": listed.total,
                "records": listed.records,
            }))
        }
        Commands::Accelerate { chain, tx_hash } => {
            let replaced = runtime.submitter.accelerate(chain, tx_hash).await?;
            print_json(&json!({
                "replaced": tx_hash,
                "tx_hash": replaced.tx_hash,
                "nonce": replaced.call.nonce,
                "fee_per_gas": replaced.call.fee_per_gas.to_string(),
            }))
        }
        Commands::Cancel { chain, tx_hash } => {
            let replaced = runtime.submitter.cancel(chain, tx_hash).await?;
            print_json(&json!({
                "cancelled": tx_hash,
                "tx_hash": replaced.tx_hash,
                "nonce": replaced.call.nonce,
                "fee_per_gas": replaced.call.fee_per_gas.to_string(),
            }))
        }
        Commands::Gas { chain } => {
            let quote = gas::quote(&runtime.pool, chain).await?;
            print_json(&json!({
                "chain_id": quote.chain_id,
                "block_number": quote.block_number,
                "base_fee": quote.base_fee.to_string(),
                "priority_fee": quote.priority_fee.to_string(),
                "tiers": quote.tiers().iter().map(|t| json!({
                    "speed": t.speed.as_str(),
                    "max_fee_per_gas": t.max_fee_per_gas.to_string(),
                    "max_priority_fee_per_gas": t.max_priority_fee_per_gas.to_string(),
                    "estimated_wait_secs": t.estimated_wait_secs,
                })).collect::<Vec<_>>(),
            }))
        }
    }
}

async fn run(runtime: &Runtime, config_path: &Path) -> Result<(), Box<dyn Error>> {
    let config = &runtime.config;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let handles = if config.watcher.enabled {
        spawn_watchers(&runtime.engine, &config.watcher, &shutdown)
    } else {
        tracing::info!("Bridge watchers disabled");
        Vec::new()
    };

    let (config_watcher, mut reloads) = ConfigWatcher::new(config_path);
    let _watch_guard = match config_watcher.run() {
        Ok(guard) => Some(guard),
        Err(e) => {
            tracing::warn!(error = %e, "Config hot reload unavailable");
            None
        }
    };

    let signal = wait_for_shutdown_signal();
    tokio::pin!(signal);
    loop {
        tokio::select! {
            Some(reloaded) = reloads.recv() => runtime.apply_chain_reload(reloaded.chains),
            _ = &mut signal => break,
        }
    }

    shutdown.trigger();
    for handle in handles {
        match tokio::time::timeout(Duration::from_secs(30), handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Watcher task failed"),
            Err(_) => tracing::warn!("Watcher did not stop within 30 seconds"),
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
