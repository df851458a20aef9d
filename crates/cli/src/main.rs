//! Command Line Interface for the LB Liquidity Provider.
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use lb_lp_data::{Database, InMemoryPositionStore, PositionStore};
use lb_lp_domain::entities::{BinId, OperationRecord, PlannedBin, PositionPlan};
use lb_lp_domain::enums::{Asset, OperationKind};
use lb_lp_domain::value_objects::{BinOffsets, RebalanceThreshold, TokenBalances};
use lb_lp_execution::config::StrategyConfig;
use lb_lp_execution::lifecycle::{EventData, LifecycleController, LifecycleTracker, TickOutcome};
use lb_lp_execution::retry::RetryPolicy;
use lb_lp_execution::strategy::{ExecutorConfig, StopReason, StrategyExecutor};
use lb_lp_execution::sync::Reconciler;
use lb_lp_protocols::lb::config::{AVALANCHE_CHAIN_ID, DEFAULT_RPC_URL};
use lb_lp_protocols::lb::wallet::signer_from_key;
use lb_lp_protocols::lb::{DryRunWriter, LbClientConfig, LbPairClient};
use lb_lp_protocols::{ChainReader, ChainWriter};
use prettytable::{Table, row};
use rust_decimal::Decimal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "lb-lp")]
#[command(about = "Liquidity Book rebalancing liquidity provider", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct Settings {
    /// Avalanche C-Chain RPC endpoint
    #[arg(long, env = "RPC_URL", default_value = DEFAULT_RPC_URL, global = true)]
    rpc_url: String,

    /// Expected chain id
    #[arg(long, env = "CHAIN_ID", default_value_t = AVALANCHE_CHAIN_ID, global = true)]
    chain_id: u64,

    /// LB pair address
    #[arg(
        long,
        env = "POOL_ADDRESS",
        default_value = "0x856b38bf1e2e367f747dd4d3951dda8a35f1bf60",
        global = true
    )]
    pool_address: Address,

    /// LB router address
    #[arg(
        long,
        env = "ROUTER_ADDRESS",
        default_value = "0x18556da13313f3532c54711497a8fedac273220e",
        global = true
    )]
    router_address: Address,

    /// SQLite database file
    #[arg(long, env = "DATABASE_PATH", default_value = "lb_lp.db", global = true)]
    db_path: String,

    /// Bins between the active bin and the first X bin
    #[arg(long, env = "ASSET_X_OFFSET", default_value_t = 1, global = true)]
    asset_x_offset: u32,

    /// Bins between the active bin and the first Y bin
    #[arg(long, env = "ASSET_Y_OFFSET", default_value_t = 1, global = true)]
    asset_y_offset: u32,

    /// Consecutive bins each asset is spread over
    #[arg(long, env = "BINS_PER_SIDE", default_value_t = 1, global = true)]
    bins_per_side: u32,

    /// Drift outside the position, in bins, that triggers a rebalance
    #[arg(long, env = "REBALANCE_THRESHOLD", default_value_t = 2, global = true)]
    rebalance_threshold: u32,

    /// Seconds between strategy ticks
    #[arg(long, env = "CHECK_INTERVAL_SECONDS", default_value_t = 120, global = true)]
    check_interval_seconds: u64,

    /// Asset X always left in the wallet
    #[arg(long, env = "RESERVE_X", default_value = "0", global = true)]
    reserve_x: Decimal,

    /// Asset Y always left in the wallet (gas for WAVAX pairs)
    #[arg(long, env = "RESERVE_Y", default_value = "0", global = true)]
    reserve_y: Decimal,

    /// Smallest asset X amount worth depositing
    #[arg(long, env = "MIN_DEPOSIT_X", default_value = "0", global = true)]
    min_deposit_x: Decimal,

    /// Smallest asset Y amount worth depositing
    #[arg(long, env = "MIN_DEPOSIT_Y", default_value = "0", global = true)]
    min_deposit_y: Decimal,

    /// Tolerated amount shortfall in basis points
    #[arg(long, env = "SLIPPAGE_BPS", default_value_t = 500, global = true)]
    slippage_bps: u32,

    /// Tolerated active bin movement during a deposit
    #[arg(long, env = "ID_SLIPPAGE", default_value_t = 0, global = true)]
    id_slippage: u32,

    /// Router deadline in seconds
    #[arg(long, env = "DEADLINE_SECONDS", default_value_t = 300, global = true)]
    deadline_seconds: u64,

    /// Seconds to wait for a receipt
    #[arg(long, env = "CONFIRMATION_TIMEOUT_SECONDS", default_value_t = 120, global = true)]
    confirmation_timeout_seconds: u64,

    /// Attempts per chain call before giving up
    #[arg(long, env = "RETRY_ATTEMPTS", default_value_t = 5, global = true)]
    retry_attempts: usize,

    /// First retry delay in milliseconds
    #[arg(long, env = "RETRY_BASE_DELAY_MS", default_value_t = 500, global = true)]
    retry_base_delay_ms: u64,

    /// Half-width of the startup orphan share scan
    #[arg(long, env = "SCAN_RANGE", default_value_t = 10, global = true)]
    scan_range: u32,
}

impl Settings {
    fn client_config(&self) -> LbClientConfig {
        LbClientConfig {
            rpc_url: self.rpc_url.clone(),
            chain_id: self.chain_id,
            pair_address: self.pool_address,
            router_address: self.router_address,
            slippage_bps: self.slippage_bps,
            id_slippage: self.id_slippage,
            deadline: Duration::from_secs(self.deadline_seconds),
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_seconds),
        }
    }

    fn strategy_config(&self, owner: Address) -> Result<StrategyConfig> {
        let mut config = StrategyConfig::new(self.pool_address.to_string(), owner.to_string());
        config.offsets = BinOffsets::new(self.asset_x_offset, self.asset_y_offset)?;
        config.bins_per_side = self.bins_per_side;
        config.rebalance_threshold = RebalanceThreshold::new(self.rebalance_threshold)?;
        config.check_interval = Duration::from_secs(self.check_interval_seconds);
        config.reserve = TokenBalances::new(self.reserve_x, self.reserve_y);
        config.min_deposit = TokenBalances::new(self.min_deposit_x, self.min_deposit_y);
        config.retry = RetryPolicy::new(
            self.retry_attempts,
            self.retry_base_delay_ms,
            RetryPolicy::default().max_delay_ms,
            RetryPolicy::default().jitter_pct,
        );
        config.scan_range = self.scan_range;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AssetArg {
    X,
    Y,
}

impl From<AssetArg> for Asset {
    fn from(value: AssetArg) -> Self {
        match value {
            AssetArg::X => Asset::X,
            AssetArg::Y => Asset::Y,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show pair tokens, active bin and surrounding reserves
    PoolInfo {
        /// Bins shown on each side of the active bin
        #[arg(long, default_value_t = 5)]
        around: u32,
    },
    /// Deposit one asset into a single bin
    Add {
        /// Target bin id
        #[arg(long)]
        bin: BinId,

        /// Asset to deposit
        #[arg(long, value_enum)]
        asset: AssetArg,

        /// Amount in token units
        #[arg(long)]
        amount: Decimal,
    },
    /// Withdraw every share held in the given bins
    Remove {
        /// Comma separated bin ids
        #[arg(long, value_delimiter = ',', required = true)]
        bins: Vec<BinId>,
    },
    /// Close the strategy position without redeploying
    WithdrawAll,
    /// Show the current position and recent closed ones
    Positions {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show recorded add/remove operations
    History {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// List bins around the active bin where the wallet holds shares
    Scan {
        #[arg(long, default_value_t = 50)]
        range: u32,
    },
    /// Reconcile the stored position with the chain
    Reconcile {
        /// Clear the failure marker left by a halted run
        #[arg(long)]
        clear_failure: bool,
    },
    /// Run the rebalancing strategy until interrupted
    Run {
        /// Log intended transactions instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = &cli.settings;

    match &cli.command {
        Commands::PoolInfo { around } => {
            let client = connect(settings).await?;
            let info = client.pool_info(*around).await?;

            println!("Pair:       {}", info.pair_address);
            println!(
                "Tokens:     {} ({}) / {} ({})",
                info.token_x.symbol, info.token_x.address, info.token_y.symbol, info.token_y.address
            );
            println!("Bin step:   {} bps", info.bin_step);
            println!("Active bin: {}", info.active_bin);
            println!(
                "Reserves:   {} {} / {} {}",
                info.reserve_x, info.token_x.symbol, info.reserve_y, info.token_y.symbol
            );

            let mut table = Table::new();
            table.add_row(row!["Bin", "Offset", info.token_x.symbol, info.token_y.symbol]);
            for bin in &info.bins {
                let offset = i64::from(bin.bin_id) - i64::from(info.active_bin);
                table.add_row(row![bin.bin_id, offset, bin.reserve_x, bin.reserve_y]);
            }
            table.printstd();
        }
        Commands::Add { bin, asset, amount } => {
            let asset = Asset::from(*asset);
            if *amount <= Decimal::ZERO {
                bail!("amount must be positive");
            }
            let client = connect(settings).await?;
            let store = open_store(settings).await?;
            let active = client.active_bin().await?;
            match asset {
                Asset::X if *bin < active => bail!("asset X can only go at or above bin {active}"),
                Asset::Y if *bin > active => bail!("asset Y can only go at or below bin {active}"),
                _ => {}
            }

            let plan = PositionPlan::new(
                active,
                vec![PlannedBin {
                    bin_id: *bin,
                    asset,
                    amount: *amount,
                }],
            );
            let receipt = client.add_liquidity(&plan).await?;
            let (amount_x, amount_y) = match asset {
                Asset::X => (*amount, Decimal::ZERO),
                Asset::Y => (Decimal::ZERO, *amount),
            };
            record_manual(
                store.as_ref(),
                OperationRecord::new(OperationKind::Add, vec![*bin])
                    .with_amounts(amount_x, amount_y)
                    .with_tx(Some(receipt.tx_hash.clone()))
                    .with_note("manual add"),
            )
            .await;
            println!("Deposited {amount} {asset} into bin {bin}: {}", receipt.tx_hash);
        }
        Commands::Remove { bins } => {
            let client = connect(settings).await?;
            let store = open_store(settings).await?;
            let config = settings.strategy_config(client.owner())?;
            if let Some(current) = store.current(&config.pool_address).await? {
                if bins.iter().any(|b| current.bin_ids.contains(b)) {
                    warn!(
                        position = %current.id,
                        "Removing shares from bins tracked by the strategy position"
                    );
                }
            }

            let receipt = client.remove_liquidity(bins).await?;
            record_manual(
                store.as_ref(),
                OperationRecord::new(OperationKind::Remove, bins.clone())
                    .with_tx(Some(receipt.tx_hash.clone()))
                    .with_note("manual remove"),
            )
            .await;
            println!("Removed liquidity from bins {bins:?}: {}", receipt.tx_hash);
        }
        Commands::WithdrawAll => {
            let client = connect(settings).await?;
            let store = open_store(settings).await?;
            let config = settings.strategy_config(client.owner())?;
            let controller =
                LifecycleController::new(&config, client.clone(), client.clone(), store);

            let resumed = controller.resume().await?;
            let mut state = resumed.state;
            let outcome = controller.withdraw_all(&mut state).await?;
            match outcome {
                TickOutcome::Withdrawn { position_id } => {
                    println!("Position {position_id} withdrawn");
                }
                TickOutcome::NothingToWithdraw => println!("No open strategy position"),
                TickOutcome::Failed { reason } => bail!("withdrawal failed: {reason}"),
                other => println!("Withdrawal ended with {other:?}"),
            }
            if !resumed.orphan_bins.is_empty() {
                let bins: Vec<String> = resumed.orphan_bins.keys().map(|b| b.to_string()).collect();
                println!(
                    "Untracked shares remain in bins {}; use `remove --bins {}`",
                    bins.join(", "),
                    bins.join(",")
                );
            }
        }
        Commands::Positions { limit } => {
            let store = open_store(settings).await?;
            let pool = settings.pool_address.to_string();

            match store.current(&pool).await? {
                Some(current) => {
                    println!("Current position {} ({})", current.id, current.status);
                    println!("  Bins:     {:?}", current.bin_ids_vec());
                    println!(
                        "  Deposits: X {} / Y {}",
                        current.asset_x_amount, current.asset_y_amount
                    );
                    if let Some(failure) = &current.failure {
                        println!("  FAILED:   {failure}");
                    }
                }
                None => println!("No open position"),
            }

            let mut table = Table::new();
            table.add_row(row!["Id", "Status", "Bins", "X", "Y", "Opened", "Closed", "Last tx"]);
            for position in store.history(&pool, *limit).await? {
                table.add_row(row![
                    position.id,
                    position.status,
                    format!("{:?}", position.bin_ids_vec()),
                    position.asset_x_amount,
                    position.asset_y_amount,
                    position.opened_at.format("%Y-%m-%d %H:%M:%S"),
                    position
                        .closed_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default(),
                    position.last_tx_hash.unwrap_or_default(),
                ]);
            }
            table.printstd();
        }
        Commands::History { limit } => {
            let store = open_store(settings).await?;
            let mut table = Table::new();
            table.add_row(row!["Time", "Kind", "Position", "Bins", "X", "Y", "Tx", "Note"]);
            for op in store.operations(*limit).await? {
                table.add_row(row![
                    op.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                    op.kind,
                    op.position_id.map(|p| p.to_string()).unwrap_or_default(),
                    format!("{:?}", op.bin_ids),
                    op.amount_x,
                    op.amount_y,
                    op.tx_hash.unwrap_or_default(),
                    op.note.unwrap_or_default(),
                ]);
            }
            table.printstd();
        }
        Commands::Scan { range } => {
            let client = connect(settings).await?;
            let active = client.active_bin().await?;
            let held = client.scan_user_bins(active, *range).await?;
            if held.is_empty() {
                println!("No shares within {range} bins of active bin {active}");
                return Ok(());
            }

            let mut table = Table::new();
            table.add_row(row!["Bin", "Offset", "Shares"]);
            for (bin, shares) in &held {
                table.add_row(row![bin, i64::from(*bin) - i64::from(active), shares]);
            }
            table.printstd();
        }
        Commands::Reconcile { clear_failure } => {
            let client = connect(settings).await?;
            let store = open_store(settings).await?;
            let config = settings.strategy_config(client.owner())?;
            let reconciler = Reconciler::new(&config, client, store);

            if *clear_failure {
                match reconciler.clear_failure().await? {
                    Some(position) => println!("Cleared failure on position {}", position.id),
                    None => println!("No open position"),
                }
            }

            let result = reconciler.reconcile().await?;
            println!("Status: {:?}", result.status);
            println!("Phase:  {}", result.state.phase);
            if let Some(position) = &result.position {
                println!("Position {} ({}) bins {:?}", position.id, position.status, position.bin_ids_vec());
            }
            if let Some(failure) = &result.state.failure {
                println!("Failure: {failure}");
                println!("Resolve on-chain state, then run `reconcile --clear-failure`");
            }
            for (bin, shares) in &result.orphan_bins {
                println!("Untracked shares in bin {bin}: {shares}");
            }
        }
        Commands::Run { dry_run } => {
            let client = connect(settings).await?;
            let config = settings.strategy_config(client.owner())?;

            let (writer, store): (Arc<dyn ChainWriter>, Arc<dyn PositionStore>) = if *dry_run {
                info!("Dry run: transactions are logged, positions kept in memory");
                (
                    Arc::new(DryRunWriter::new()),
                    Arc::new(InMemoryPositionStore::new()),
                )
            } else {
                (client.clone(), open_store(settings).await?)
            };

            let controller = Arc::new(LifecycleController::new(
                &config,
                client.clone(),
                writer,
                store,
            ));
            let resumed = controller.resume().await?;
            let mut state = resumed.state;

            let executor = StrategyExecutor::new(
                controller,
                ExecutorConfig {
                    check_interval: config.check_interval,
                    dry_run: *dry_run,
                },
            );
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Could not listen for ctrl-c");
                    std::future::pending::<()>().await;
                }
            };

            let reason = executor.run(&mut state, shutdown).await;
            print_session(executor.controller().tracker()).await;
            match reason {
                StopReason::Failed(reason) => {
                    bail!("strategy halted: {reason}; run `reconcile` after fixing on-chain state")
                }
                StopReason::Shutdown | StopReason::Stopped => {
                    println!("Strategy stopped in phase {}", state.phase);
                }
            }
        }
    }

    Ok(())
}

/// Prints the positions this run handled.
async fn print_session(tracker: &LifecycleTracker) {
    let mut summaries = tracker.get_all_summaries().await;
    if summaries.is_empty() {
        println!("No positions handled this run");
        return;
    }
    summaries.sort_by_key(|s| s.opened_at);

    let mut table = Table::new();
    table.add_row(row!["Id", "Bins", "X", "Y", "Opened", "Closed", "Outcome"]);
    for summary in &summaries {
        let outcome = if summary.failed {
            let events = tracker.get_events(&summary.position).await;
            events
                .iter()
                .rev()
                .find_map(|e| match &e.data {
                    EventData::Failed(data) => {
                        Some(format!("FAILED in {}: {}", data.phase, data.reason))
                    }
                    _ => None,
                })
                .unwrap_or_else(|| "FAILED".to_string())
        } else if summary.is_open {
            "open".to_string()
        } else {
            summary
                .close_reason
                .map(|r| format!("{r:?}"))
                .unwrap_or_else(|| "closed".to_string())
        };
        table.add_row(row![
            summary.position,
            format!("{:?}", summary.bin_ids),
            summary.amount_x,
            summary.amount_y,
            summary.opened_at.format("%Y-%m-%d %H:%M:%S"),
            summary
                .closed_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
            outcome,
        ]);
    }
    table.printstd();

    let stats = tracker.get_aggregate_stats().await;
    println!(
        "Positions: {} opened, {} closed, {} still open; {} rebalances, {} failures",
        stats.total_positions,
        stats.closed_positions,
        stats.open_positions,
        stats.total_rebalances,
        stats.total_failures
    );
}

async fn connect(settings: &Settings) -> Result<Arc<LbPairClient>> {
    let key = Zeroizing::new(
        std::env::var("PRIVATE_KEY").context("PRIVATE_KEY must be set in .env or environment")?,
    );
    let signer = signer_from_key(key)?;
    let client = LbPairClient::connect(settings.client_config(), signer).await?;
    Ok(Arc::new(client))
}

async fn open_store(settings: &Settings) -> Result<Arc<dyn PositionStore>> {
    let db = Database::connect(&settings.db_path)
        .await
        .with_context(|| format!("opening {}", settings.db_path))?;
    db.migrate().await?;
    Ok(Arc::new(db.positions()))
}

async fn record_manual(store: &dyn PositionStore, operation: OperationRecord) {
    if let Err(e) = store.record_operation(&operation).await {
        warn!(error = %e, "Could not record operation history");
    }
}
