//! Strategy engine: the poll / evaluate / execute / cool down loop.

use std::fmt;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::models::{Candle, StrategyStats, TradeAction};
use crate::shutdown::Shutdown;

use super::config::EngineConfig;
use super::executor::{ExecutionError, TradeExecutor};
use super::strategy::{Decision, HoldReason, Strategy};
use super::PositionSizer;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The retry policy gave up on the candle feed
    #[error("market data unavailable after {attempts} consecutive failed fetches")]
    DataUnavailable { attempts: u32 },

    /// Orders kept failing to reach a settlement
    #[error("{attempts} consecutive trades failed to settle")]
    TradesFailing { attempts: u32 },

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Engine state. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    WaitingForData,
    Evaluating,
    Signaled(TradeAction),
    NoSignal,
    Executing(TradeAction),
    Cooldown,
    Completed,
}

/// Outcome of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub strategy: &'static str,
    pub stats: StrategyStats,
    pub cycles: u32,
    /// Trades whose result never arrived, even after reconciliation
    pub unresolved_trades: usize,
    pub interrupted: bool,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stats)?;
        writeln!(f, "Strategy:     {}", self.strategy)?;
        writeln!(f, "Cycles:       {}", self.cycles)?;
        if self.unresolved_trades > 0 {
            writeln!(f, "Unresolved:   {}", self.unresolved_trades)?;
        }
        if self.interrupted {
            writeln!(f, "Stopped by user")?;
        }
        Ok(())
    }
}

/// Runs one strategy against one asset until the trade budget is spent.
pub struct StrategyEngine {
    strategy: Box<dyn Strategy>,
    sizer: PositionSizer,
    executor: TradeExecutor,
    config: EngineConfig,
    shutdown: Shutdown,

    state: EngineState,
    window: Vec<Candle>,
    failed_fetches: u32,
    failed_trades: u32,
    cycles: u32,
    interrupted: bool,
}

impl StrategyEngine {
    pub fn new(
        strategy: Box<dyn Strategy>,
        sizer: PositionSizer,
        executor: TradeExecutor,
        config: EngineConfig,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            strategy,
            sizer,
            executor,
            config,
            shutdown,
            state: EngineState::WaitingForData,
            window: Vec::new(),
            failed_fetches: 0,
            failed_trades: 0,
            cycles: 0,
            interrupted: false,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn stats(&self) -> &StrategyStats {
        self.executor.stats()
    }

    pub fn sizer(&self) -> &PositionSizer {
        &self.sizer
    }

    pub fn executor(&self) -> &TradeExecutor {
        &self.executor
    }

    fn budget_spent(&self) -> bool {
        self.stats().total_trades() >= self.config.max_trades
    }

    /// Drive the state machine to completion.
    ///
    /// Only fatal broker errors, an exhausted retry policy and a run of
    /// unsettled trades end the run with an error. The symbol resolved here
    /// is used for both candles and orders until the run ends.
    pub async fn run(&mut self) -> Result<RunReport, EngineError> {
        let asset = match self.executor.resolve_asset(&self.config.asset).await {
            Ok(asset) => asset,
            Err(ExecutionError::AssetUnavailable(_)) => {
                self.state = EngineState::Completed;
                return Ok(self.report());
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            strategy = self.strategy.name(),
            params = %self.strategy.describe(),
            asset = %asset,
            base_amount = %self.sizer.base_amount(),
            sizing = %self.sizer.method(),
            max_trades = self.config.max_trades,
            "Starting strategy"
        );

        self.state = EngineState::WaitingForData;
        while self.state != EngineState::Completed {
            self.state = self.step(&asset).await?;
        }

        self.finish().await
    }

    /// One state transition.
    async fn step(&mut self, asset: &str) -> Result<EngineState, EngineError> {
        let next = match self.state {
            EngineState::WaitingForData => {
                if self.shutdown.is_triggered() {
                    self.interrupted = true;
                    return Ok(EngineState::Completed);
                }
                if self.budget_spent() {
                    return Ok(EngineState::Completed);
                }
                self.wait_for_data(asset).await?
            }

            EngineState::Evaluating => {
                self.cycles += 1;
                match self.strategy.decide(&self.window) {
                    Decision::Enter(action) => EngineState::Signaled(action),
                    Decision::Hold(HoldReason::InsufficientData { have, need }) => {
                        warn!(have = have, need = need, "Not enough data for analysis");
                        EngineState::NoSignal
                    }
                    Decision::Hold(HoldReason::Neutral) => EngineState::NoSignal,
                }
            }

            EngineState::Signaled(action) => {
                info!(action = %action, "Signal");
                EngineState::Executing(action)
            }

            EngineState::NoSignal => {
                info!("No clear signal, holding");
                EngineState::Cooldown
            }

            EngineState::Executing(action) => {
                self.execute(asset, action).await?;
                EngineState::Cooldown
            }

            EngineState::Cooldown => {
                if self.budget_spent() {
                    EngineState::Completed
                } else {
                    let interval = self.config.poll_interval();
                    info!(secs = interval.as_secs(), "Waiting before next check");
                    if self.shutdown.sleep(interval).await {
                        EngineState::WaitingForData
                    } else {
                        self.interrupted = true;
                        EngineState::Completed
                    }
                }
            }

            EngineState::Completed => EngineState::Completed,
        };

        debug!(from = ?self.state, to = ?next, "Engine transition");
        Ok(next)
    }

    async fn wait_for_data(&mut self, asset: &str) -> Result<EngineState, EngineError> {
        if !self.strategy.uses_market_data() {
            self.window.clear();
            return Ok(EngineState::Evaluating);
        }

        let fetched = self
            .executor
            .session()
            .broker()
            .get_candles(asset, self.config.candle_period_secs)
            .await;

        match fetched {
            Ok(candles) => {
                self.failed_fetches = 0;
                self.window = candles;
                Ok(EngineState::Evaluating)
            }
            Err(e) if e.is_fatal() => Err(ExecutionError::Broker(e).into()),
            Err(e) => {
                self.failed_fetches += 1;
                warn!(asset = %asset, error = %e, failures = self.failed_fetches, "Failed to get candle data");

                if self.config.retry.is_exhausted(self.failed_fetches) {
                    error!(attempts = self.failed_fetches, "Giving up on market data");
                    return Err(EngineError::DataUnavailable {
                        attempts: self.failed_fetches,
                    });
                }

                if self.shutdown.sleep(self.config.retry.pause()).await {
                    Ok(EngineState::WaitingForData)
                } else {
                    self.interrupted = true;
                    Ok(EngineState::Completed)
                }
            }
        }
    }

    async fn execute(&mut self, asset: &str, action: TradeAction) -> Result<(), EngineError> {
        let amount = self.sizer.current_amount();
        info!(
            trade = self.stats().total_trades() + 1,
            max_trades = self.config.max_trades,
            amount = %amount,
            "Placing trade"
        );

        let result = self
            .executor
            .execute(
                asset,
                amount,
                action,
                self.config.duration_secs,
                Some(&mut self.sizer),
            )
            .await;

        match result {
            Ok(settlement) => {
                self.failed_trades = 0;
                self.strategy.on_settlement(settlement.outcome);
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                self.failed_trades += 1;
                warn!(error = %e, failures = self.failed_trades, "Trade did not complete");

                if self.failed_trades >= self.config.max_failed_trades {
                    error!(attempts = self.failed_trades, "Giving up after repeated trade failures");
                    self.reconcile().await;
                    return Err(EngineError::TradesFailing {
                        attempts: self.failed_trades,
                    });
                }
                Ok(())
            }
        }
    }

    async fn reconcile(&mut self) {
        if self.executor.pending_trades().is_empty() {
            return;
        }
        let settled = self.executor.reconcile_pending(Some(&mut self.sizer)).await;
        for settlement in settled {
            self.strategy.on_settlement(settlement.outcome);
        }
    }

    /// Reconcile leftovers and build the report.
    async fn finish(&mut self) -> Result<RunReport, EngineError> {
        self.reconcile().await;

        if self.interrupted {
            info!("Strategy stopped by user");
        } else {
            info!("Strategy completed");
        }
        Ok(self.report())
    }

    fn report(&self) -> RunReport {
        RunReport {
            strategy: self.strategy.name(),
            stats: self.stats().clone(),
            cycles: self.cycles,
            unresolved_trades: self.executor.pending_trades().len(),
            interrupted: self.interrupted,
        }
    }
}
