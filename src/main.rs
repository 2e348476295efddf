//! Binary-options trading bot
//!
//! Trades SMA crossover, RSI reversion or martingale strategies against a
//! broker session, or executes free-text signals from authorized senders.

mod api;
mod models;
mod shutdown;
mod signals;
mod trading;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{AccountKind, BrokerClient, GatewayClient, PaperBroker, PaperConfig, Session};
use crate::models::TradeAction;
use crate::shutdown::Shutdown;
use crate::signals::{AllowList, SignalHandler};
use crate::trading::{
    normalize_symbol, validate_max_step, EngineConfig, ExecutorConfig, MartingaleConfig,
    MartingaleDirection, PositionSizer, RetryPolicy, RsiConfig, RsiReversion, SizingMethod,
    SmaConfig, SmaCrossover, Strategy, StrategyEngine, TradeExecutor,
};

/// Binary-options trading bot CLI.
#[derive(Parser)]
#[command(name = "bintrader")]
#[command(about = "Indicator and signal driven binary-options trading bot", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Trade against the simulated in-process broker
    #[arg(long, global = true)]
    paper: bool,

    /// Seed for the simulated broker's price path
    #[arg(long, global = true)]
    paper_seed: Option<u64>,

    /// Symbols the simulated broker reports as closed (repeatable)
    #[arg(long = "paper-closed", global = true)]
    paper_closed: Vec<String>,

    /// Account to trade on (practice, real)
    #[arg(long, default_value = "practice", global = true)]
    account: AccountKind,

    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by the strategy commands.
#[derive(Args)]
struct RunArgs {
    /// Base asset; its OTC variant is used when closed
    #[arg(short, long, default_value = "EURUSD")]
    asset: String,

    /// Base stake per trade
    #[arg(long, default_value = "1")]
    amount: Decimal,

    /// Option duration in seconds
    #[arg(short, long, default_value = "60")]
    duration: u32,

    /// Settled trades before the run completes
    #[arg(short, long)]
    max_trades: Option<u32>,

    /// Seconds to wait between cycles
    #[arg(short, long, default_value = "70")]
    interval: u64,

    /// Candle period in seconds
    #[arg(long, default_value = "60")]
    candle_period: u32,

    /// Give up after this many consecutive failed candle fetches
    /// (retries forever when omitted)
    #[arg(long)]
    max_fetch_retries: Option<u32>,

    /// Stop after this many consecutive trades that did not settle
    #[arg(long, default_value = "3")]
    max_failed_trades: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the account balance
    Balance,

    /// List currently open assets
    Assets,

    /// Place one trade and wait for its result
    Trade {
        /// Asset symbol, e.g. EURUSD
        asset: String,

        /// CALL or PUT (BUY/SELL accepted)
        action: TradeAction,

        /// Stake
        #[arg(default_value = "1")]
        amount: Decimal,

        /// Duration in seconds
        #[arg(default_value = "60")]
        duration: u32,
    },

    /// Run the moving-average crossover strategy
    Sma {
        #[command(flatten)]
        run: RunArgs,

        /// Short moving-average period
        #[arg(long, default_value = "5")]
        short: usize,

        /// Long moving-average period
        #[arg(long, default_value = "20")]
        long: usize,

        /// Size with martingale doubling, capped at this many steps
        #[arg(long)]
        martingale_steps: Option<u32>,
    },

    /// Run the RSI reversion strategy
    Rsi {
        #[command(flatten)]
        run: RunArgs,

        /// RSI period
        #[arg(long, default_value = "14")]
        period: usize,

        /// Buy at or below this RSI
        #[arg(long, default_value = "30")]
        oversold: Decimal,

        /// Sell at or above this RSI
        #[arg(long, default_value = "70")]
        overbought: Decimal,

        /// Size with martingale doubling, capped at this many steps
        #[arg(long)]
        martingale_steps: Option<u32>,
    },

    /// Run the martingale strategy (trades every cycle, doubles after losses)
    Martingale {
        #[command(flatten)]
        run: RunArgs,

        /// Loss streak after which the stake resets
        #[arg(long, default_value = "4")]
        max_step: u32,

        /// Direction of the first trade
        #[arg(long, default_value = "CALL")]
        direction: TradeAction,

        /// Keep the direction after a win instead of flipping it
        #[arg(long)]
        no_flip: bool,
    },

    /// Parse a text signal and execute it
    Signal {
        /// Signal text, e.g. "EURUSD CALL 5 60"
        text: Vec<String>,

        /// Only show the parsed signal
        #[arg(long)]
        parse_only: bool,
    },

    /// Read "<sender_id> <message>" lines from stdin and act on signals
    Listen,

    /// Show the default configuration
    Config,
}

/// Defaults as printed by `config`.
#[derive(Serialize)]
struct ConfigView {
    engine: EngineConfig,
    sma: SmaConfig,
    rsi: RsiConfig,
    martingale: MartingaleConfig,
    martingale_sizing: SizingMethod,
    executor: ExecutorConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Commands that need no broker
    match &cli.command {
        Commands::Config => return print_config(),
        Commands::Signal {
            text,
            parse_only: true,
        } => {
            match signals::parse(&text.join(" ")) {
                Some(signal) => println!("{}", signal),
                None => println!("No signal found."),
            }
            return Ok(());
        }
        _ => {}
    }

    let broker: Arc<dyn BrokerClient> = if cli.paper {
        let config = PaperConfig {
            closed_assets: cli.paper_closed.iter().cloned().collect::<HashSet<_>>(),
            ..Default::default()
        };
        match cli.paper_seed {
            Some(seed) => Arc::new(PaperBroker::with_seed(config, seed)),
            None => Arc::new(PaperBroker::new(config)),
        }
    } else {
        Arc::new(GatewayClient::from_env()?)
    };

    let session = Session::new(broker);
    session
        .connect(cli.account)
        .await
        .context("Failed to connect to broker")?;

    let executor = TradeExecutor::new(session.clone(), ExecutorConfig::default());

    let shutdown = Shutdown::new();
    shutdown.listen_for_ctrl_c();

    let result = run_command(cli.command, executor, shutdown).await;
    session.close().await;
    result
}

async fn run_command(command: Commands, mut executor: TradeExecutor, shutdown: Shutdown) -> Result<()> {
    match command {
        Commands::Balance => {
            let balance = executor.balance().await?;
            println!("Current balance: ${:.2}", balance);
        }

        Commands::Assets => {
            let assets = executor.list_open_assets().await?;
            if assets.is_empty() {
                println!("No assets are open right now.");
                return Ok(());
            }

            println!("\n=== Available Assets ({}) ===", assets.len());
            for asset in assets {
                println!("  {}", asset);
            }
        }

        Commands::Trade {
            asset,
            action,
            amount,
            duration,
        } => {
            anyhow::ensure!(amount > Decimal::ZERO, "amount must be positive");
            anyhow::ensure!(duration > 0, "duration must be positive");

            let settlement = executor
                .execute(&normalize_symbol(&asset), amount, action, duration, None)
                .await?;
            println!(
                "\nTrade {} {}: profit ${:.2}",
                settlement.trade_id, settlement.outcome, settlement.profit
            );
            println!("\n{}", executor.stats());
        }

        Commands::Sma {
            run,
            short,
            long,
            martingale_steps,
        } => {
            let sma = SmaConfig {
                short_period: short,
                long_period: long,
            };
            sma.validate()?;
            let config = engine_config(&run, EngineConfig::default().max_trades)?;
            let sizer = sizer_for(config.amount, martingale_steps)?;
            run_strategy(Box::new(SmaCrossover::new(sma)), sizer, executor, config, shutdown).await?;
        }

        Commands::Rsi {
            run,
            period,
            oversold,
            overbought,
            martingale_steps,
        } => {
            let rsi = RsiConfig {
                period,
                oversold,
                overbought,
            };
            rsi.validate()?;
            let config = engine_config(&run, EngineConfig::default().max_trades)?;
            let sizer = sizer_for(config.amount, martingale_steps)?;
            run_strategy(Box::new(RsiReversion::new(rsi)), sizer, executor, config, shutdown).await?;
        }

        Commands::Martingale {
            run,
            max_step,
            direction,
            no_flip,
        } => {
            let martingale = MartingaleConfig {
                max_step,
                initial_direction: direction,
                flip_on_win: !no_flip,
            };
            martingale.validate()?;
            let config = engine_config(&run, 10)?;
            let sizer = PositionSizer::martingale(config.amount, martingale.max_step);
            info!(
                worst_case = %sizer.worst_case_streak_cost(),
                "Worst-case cost of a full loss streak"
            );
            let strategy = MartingaleDirection::new(&martingale);
            run_strategy(Box::new(strategy), sizer, executor, config, shutdown).await?;
        }

        Commands::Signal { text, .. } => {
            let text = text.join(" ");
            let Some(signal) = signals::parse(&text) else {
                println!("No signal found in: {}", text);
                return Ok(());
            };

            println!("Signal detected!\n{}\n", signal);
            let settlement = executor
                .execute(
                    &signal.asset,
                    signal.amount,
                    signal.action,
                    signal.duration_secs,
                    None,
                )
                .await?;
            println!(
                "Trade {} {}: profit ${:.2}",
                settlement.trade_id, settlement.outcome, settlement.profit
            );
        }

        Commands::Listen => listen(executor, shutdown).await?,

        Commands::Config => print_config()?,
    }

    Ok(())
}

fn engine_config(run: &RunArgs, default_max_trades: u32) -> Result<EngineConfig> {
    let config = EngineConfig {
        asset: normalize_symbol(&run.asset),
        amount: run.amount,
        duration_secs: run.duration,
        max_trades: run.max_trades.unwrap_or(default_max_trades),
        poll_interval_secs: run.interval,
        candle_period_secs: run.candle_period,
        max_failed_trades: run.max_failed_trades,
        retry: RetryPolicy {
            max_attempts: run.max_fetch_retries,
            ..Default::default()
        },
    };
    config.validate()?;
    Ok(config)
}

fn sizer_for(amount: Decimal, martingale_steps: Option<u32>) -> Result<PositionSizer> {
    match martingale_steps {
        Some(steps) => {
            validate_max_step(steps)?;
            Ok(PositionSizer::martingale(amount, steps))
        }
        None => Ok(PositionSizer::fixed(amount)),
    }
}

async fn run_strategy(
    strategy: Box<dyn Strategy>,
    sizer: PositionSizer,
    executor: TradeExecutor,
    config: EngineConfig,
    shutdown: Shutdown,
) -> Result<()> {
    println!("\n=== {} Strategy ===", strategy.name());
    println!("Parameters: {}", strategy.describe());
    println!("Asset: {}  Stake: ${}  Sizing: {}", config.asset, config.amount, sizer.method());
    println!("Max trades: {}  Interval: {}s", config.max_trades, config.poll_interval_secs);
    println!("\nPress Ctrl+C to stop.\n");

    let mut engine = StrategyEngine::new(strategy, sizer, executor, config, shutdown);
    match engine.run().await {
        Ok(report) => {
            println!("\n{}", report);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Strategy stopped");
            println!("\n{}", engine.stats());
            Err(e.into())
        }
    }
}

/// Serve signals from stdin until EOF or Ctrl+C.
async fn listen(executor: TradeExecutor, shutdown: Shutdown) -> Result<()> {
    let allow = AllowList::from_env();
    info!(senders = allow.len(), "Listening for signals on stdin");
    println!("Send lines as: <sender_id> <message>   (Ctrl+C to stop)\n");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(reply) = rx.recv().await {
            println!("{}\n", reply);
        }
    });

    let mut handler = SignalHandler::new(allow, executor, tx);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = shutdown.triggered() => break,
        };
        let Some(line) = line else { break };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((sender, text)) = line.split_once(char::is_whitespace) else {
            warn!(line = %line, "Expected '<sender_id> <message>'");
            continue;
        };
        let Ok(sender) = sender.parse::<i64>() else {
            warn!(sender = %sender, "Invalid sender id");
            continue;
        };

        handler.handle(sender, text).await?;
    }

    let stats = handler.executor().stats().clone();
    drop(handler);
    printer.await.ok();
    println!("{}", stats);
    Ok(())
}

fn print_config() -> Result<()> {
    let martingale = MartingaleConfig::default();
    let view = ConfigView {
        engine: EngineConfig::default(),
        sma: SmaConfig::default(),
        rsi: RsiConfig::default(),
        martingale_sizing: SizingMethod::Martingale {
            max_step: martingale.max_step,
        },
        martingale,
        executor: ExecutorConfig::default(),
    };
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
