use cosmoshub_sweeper::client::{CosmosClient, GaiadCli, LcdClient};
use cosmoshub_sweeper::config::SweeperConfig;
use cosmoshub_sweeper::engine::TxLifecycle;
use cosmoshub_sweeper::health::check_endpoints;
use cosmoshub_sweeper::sweeper::WalletSweeper;
use cosmoshub_sweeper::utils::gas::{GasEstimator, ScriptProbe};
use cosmoshub_sweeper::wallet::KeyringRoster;

use anyhow::{Context, Result};
use clap::Parser;
use core_logic::{
    setup_logger, DestinationBook, EventSink, MetricsCollector, RpcManager, TracingSink,
    WalletLoader,
};
use dotenv::dotenv;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::env;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Withdraws staking rewards and forwards surplus ATOM", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "chains/cosmoshub/config.toml")]
    config: String,
    /// Log what would be withdrawn or sent without broadcasting
    #[arg(long)]
    dry_run: bool,
    /// Seed for wallet order, reserves, destinations and delays
    #[arg(long)]
    seed: Option<u64>,
    #[arg(short, long)]
    export_metrics: Option<String>,
    #[arg(long)]
    skip_health_check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let mut config = SweeperConfig::load(&args.config)?;
    if args.dry_run {
        config.dry_run = true;
    }

    let log_level = env::var("LOG_LEVEL").ok();
    let _log_guard = setup_logger(&config.log_dir, log_level.as_deref());

    info!("Loaded config from: {}", args.config);
    if let Err(e) = config.validate() {
        error!("{}", e);
        return Err(e.into());
    }
    info!("{}", config.summary());

    let seed = args.seed.unwrap_or_else(|| rand::thread_rng().gen());
    info!("RNG seed: {}", seed);
    let mut seeds = StdRng::seed_from_u64(seed);

    let metrics = Arc::new(MetricsCollector::new());
    let sink: Arc<dyn EventSink> = Arc::new(TracingSink::new(metrics.clone()));

    let rpc = Arc::new(RpcManager::with_rng(
        &config.endpoints,
        StdRng::seed_from_u64(seeds.gen()),
    )?);

    let lcd = LcdClient::new(&config.chain.denom)?.with_metrics(metrics.clone());
    let cli = GaiadCli::new(&config.gaiad.binary, &config.chain.chain_id, &config.chain.denom)
        .with_keyring_backend(config.gaiad.keyring_backend.clone())
        .with_home(config.gaiad.home.clone());
    let client = Arc::new(CosmosClient::new(lcd, cli));

    if args.skip_health_check {
        info!("Skipping endpoint health check");
    } else {
        check_endpoints(client.as_ref(), &rpc, &config.chain.chain_id).await;
    }

    let book = DestinationBook::load(&config.destinations)?;
    for (exchange, count) in book.counts() {
        info!("{}: {} addresses", exchange, count);
    }

    let roster = KeyringRoster::new(
        client.clone(),
        book,
        config.num_wallets,
        StdRng::seed_from_u64(seeds.gen()),
    );
    let wallets = roster
        .load_wallets()
        .await
        .context("Failed to build the wallet roster")?;

    let probe = ScriptProbe::new(
        config.withdraw.probe(),
        config.send.probe(),
    );
    let estimator = GasEstimator::new(Arc::new(probe))
        .with_fallback(config.fallback_gas())
        .with_attempts(config.gas_probe_attempts, 1000);
    let lifecycle = TxLifecycle::new(
        client.clone(),
        rpc.clone(),
        estimator,
        config.gas_price,
        sink.clone(),
    );

    let mut sweeper = WalletSweeper::new(
        client,
        rpc,
        lifecycle,
        sink,
        config.sweep_settings(),
        StdRng::seed_from_u64(seeds.gen()),
    )
    .with_metrics(metrics.clone());

    let summary = sweeper.run(wallets).await;
    info!(
        "Sweep finished: {} wallets, {} with actions, {} failed",
        summary.results.len(),
        summary.with_action(),
        summary.failed()
    );
    if summary.failed() > 0 {
        warn!("Some wallets failed; see the log above for details");
    }

    if let Some(metrics_path) = args.export_metrics {
        match metrics.export_to_file(&metrics_path).await {
            Ok(_) => info!("Final metrics exported to {}", metrics_path),
            Err(e) => error!("Failed to export final metrics: {}", e),
        }
    }

    Ok(())
}
