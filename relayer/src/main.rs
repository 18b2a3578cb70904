//! Entry point wiring every per-chain worker together: configuration loading, signer setup,
//! the shared Store and Pricing oracle, and the `/status`/`/metrics` HTTP server
//! (spec.md §6 "External interfaces", SPEC_FULL.md §2 "ambient stack").

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chain_ethereum::{EthereumAmbAdapter, RpcEthereumProvider};
use clap::Parser;
use ethers_signers::LocalWallet;
use relay_base::{
    CachedPricing, ChainSettings, Getter, GetterConfig, HttpPriceFeed, InMemoryStore, LogFormat, PriceFeed, Settings,
    StaticPriceFeed,
};
use relay_core::{AmbAdapter, ChainId, Store, StoreExt};
use submitter::{Dispatcher, Evaluator, EvaluatorConfig, Wallet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod collector;
mod error;
mod metrics;
mod orchestrator;
mod status;
mod worker;

use collector::Collector;
use error::AppError;
use metrics::RelayerMetrics;
use orchestrator::{Orchestrator, WorkerExit};
use status::StatusBoard;
use worker::ChainWorker;

/// Relays bounty-escrowed messages between a fixed set of chain pairs.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: SubCommand,
}

#[derive(Debug, Parser)]
enum SubCommand {
    /// Start the relayer and run until shutdown.
    Run(RunArgs),
}

#[derive(Debug, Parser)]
struct RunArgs {
    /// Path to the TOML configuration file (spec.md §6 "Configuration keys").
    #[arg(long, short = 'c')]
    config: PathBuf,

    /// Emit logs as JSON lines instead of the default human-readable format.
    #[arg(long)]
    json_logs: bool,
}

async fn load_signer(settings: &ChainSettings) -> eyre::Result<LocalWallet> {
    let raw = tokio::fs::read_to_string(&settings.signer_key_path).await?;
    let key = raw.trim();
    let wallet: LocalWallet = key.parse()?;
    Ok(wallet)
}

fn build_pricing(settings: &Settings) -> CachedPricing {
    let feed: Arc<dyn PriceFeed> = match &settings.pricing.base_url {
        Some(base_url) => {
            let symbols: HashMap<ChainId, String> = settings
                .chains
                .values()
                .filter_map(|c| c.price_feed_symbol.clone().map(|sym| (ChainId(c.chain_id), sym)))
                .collect();
            Arc::new(HttpPriceFeed::new(base_url.clone(), symbols))
        }
        None => {
            // No price API configured: every chain's native token prices its own gas at a
            // flat 1 (SPEC_FULL.md §4, resolving spec.md §4.4's silence on a missing feed).
            Arc::new(StaticPriceFeed::new(ethers_core::types::U256::from(1)))
        }
    };
    CachedPricing::new(
        feed,
        Duration::from_millis(settings.pricing.cache_duration_ms),
        settings.pricing.max_tries,
    )
}

async fn build_orchestrator(
    chain: &ChainSettings,
    store: Arc<dyn Store>,
    adapter: Arc<dyn AmbAdapter>,
    pricing: Arc<CachedPricing>,
    board: Arc<StatusBoard>,
    metrics: Arc<RelayerMetrics>,
    provider_metrics: chain_ethereum::EthereumProviderMetrics,
) -> eyre::Result<Orchestrator<RpcEthereumProvider>> {
    let chain_id = ChainId(chain.chain_id);
    let counterparty_chain_id = ChainId(chain.counterparty_chain_id);
    let url: url::Url = chain.rpc_url.parse()?;
    let provider = Arc::new(RpcEthereumProvider::new(url, chain.chain_id as u64).with_metrics(provider_metrics));

    let signer = load_signer(chain).await?;
    let wallet = Wallet::new(
        provider.clone(),
        signer,
        chain_id,
        chain.low_balance_warning,
        chain.confirmations,
        Duration::from_millis(chain.confirmation_timeout_ms),
    )
    .await?;
    let dispatcher = Dispatcher::new(provider.clone(), wallet, chain.clone(), adapter.clone(), chain.escrow_address);

    let checkpoint_key = format!("checkpoint:{chain_id}");
    let checkpoint = store.get::<u64>(&checkpoint_key).await?.map(|v| v.value).unwrap_or(0);
    let getter_config = GetterConfig {
        addresses: vec![chain.escrow_address],
        block_delay: chain.block_delay,
        interval: Duration::from_millis(chain.interval_ms),
        retry_interval: Duration::from_millis(chain.retry_interval_ms),
        max_blocks: chain.max_blocks,
        starting_block: chain.starting_block,
        stopping_block: chain.stopping_block,
    };
    let getter = Getter::new(provider.clone(), getter_config, checkpoint);

    let worker = ChainWorker::new(getter, dispatcher, chain.clone(), chain.escrow_address, metrics.clone());
    let collector = Collector::new(adapter.clone(), chain_id, counterparty_chain_id);
    let evaluator = Evaluator::new(EvaluatorConfig {
        min_delivery_reward: chain.min_delivery_reward.unwrap_or_default(),
        relative_min_delivery_reward: chain.relative_min_delivery_reward.unwrap_or(0.0),
        min_ack_reward: chain.min_ack_reward.unwrap_or_default(),
        relative_min_ack_reward: chain.relative_min_ack_reward.unwrap_or(0.0),
        new_orders_delay: Duration::from_millis(chain.new_orders_delay_ms),
    });

    board.mark_active(chain_id).await;
    Ok(Orchestrator::new(
        worker,
        collector,
        evaluator,
        store,
        pricing,
        chain_id,
        counterparty_chain_id,
        Duration::from_millis(chain.processing_interval_ms),
        metrics,
    ))
}

async fn run(args: RunArgs) -> Result<(), AppError> {
    let log_format = if args.json_logs { LogFormat::Json } else { LogFormat::Pretty };
    relay_base::init_tracing(log_format);

    let settings = Settings::load(&args.config)?;
    // spec.md §6 "environment variable PORT" overrides whatever the config file says, the
    // way the teacher's agents let the status server's bind port come from the environment.
    let port = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(settings.port);

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let pricing = Arc::new(build_pricing(&settings));
    let metrics = Arc::new(RelayerMetrics::new().map_err(|e| AppError::Fatal(eyre::eyre!(e)))?);
    let provider_metrics = chain_ethereum::EthereumProviderMetrics::new(metrics.registry(), "all")
        .map_err(|e| AppError::Fatal(eyre::eyre!(e)))?;
    let board = Arc::new(StatusBoard::new());

    let incentives_addresses: HashMap<ChainId, ethers_core::types::H160> = settings
        .chains
        .values()
        .map(|c| (ChainId(c.chain_id), c.escrow_address))
        .collect();
    let adapter: Arc<dyn AmbAdapter> = Arc::new(EthereumAmbAdapter::new(incentives_addresses));

    let shutdown = CancellationToken::new();
    let mut handles = Vec::new();

    for chain in settings.chains.values() {
        let mut orchestrator = build_orchestrator(
            chain,
            store.clone(),
            adapter.clone(),
            pricing.clone(),
            board.clone(),
            metrics.clone(),
            provider_metrics.clone(),
        )
        .await
        .map_err(AppError::Fatal)?;
        let chain_id = ChainId(chain.chain_id);
        let shutdown = shutdown.clone();
        let board = board.clone();
        handles.push(tokio::spawn(async move {
            let exit = orchestrator.run(shutdown).await;
            board.mark_inactive(chain_id).await;
            (chain_id, exit)
        }));
    }

    let status_shutdown = shutdown.clone();
    let status_board = board.clone();
    let status_metrics = metrics.clone();
    let status_handle = tokio::spawn(async move {
        tokio::select! {
            result = status::serve(port, status_board, status_metrics) => {
                if let Err(err) = result {
                    error!(?err, "status server exited unexpectedly");
                }
            }
            _ = status_shutdown.cancelled() => {}
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            shutdown.cancel();
        }
    }

    let mut fatal: Option<String> = None;
    for handle in handles {
        match handle.await {
            Ok((chain_id, WorkerExit::Fatal(reason))) => {
                warn!(chain = %chain_id, reason = %reason, "chain worker exited fatally");
                fatal.get_or_insert(reason);
            }
            Ok((_, WorkerExit::Shutdown)) => {}
            Err(err) => warn!(?err, "chain worker task panicked"),
        }
    }
    status_handle.abort();

    match fatal {
        Some(reason) => Err(AppError::Fatal(eyre::eyre!(reason))),
        None => Ok(()),
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let SubCommand::Run(args) = cli.cmd;

    if let Err(err) = run(args).await {
        error!(?err, "relayer exiting with error");
        std::process::exit(err.exit_code());
    }
    Ok(())
}
