//! Trade executor: asset resolution, order submission, settlement and stats.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::api::{BrokerError, Session};
use crate::models::{Outcome, StrategyStats, Trade, TradeAction};

use super::config::ExecutorConfig;
use super::PositionSizer;

/// Suffix of the always-open variant of a symbol.
pub const OTC_SUFFIX: &str = "_otc";

/// Broker spelling of a symbol: upper-case base, lower-case OTC suffix.
pub fn normalize_symbol(raw: &str) -> String {
    let raw = raw.trim();
    match otc_base(raw) {
        Some(base) => format!("{}{}", base.to_uppercase(), OTC_SUFFIX),
        None => raw.to_uppercase(),
    }
}

/// Base of an OTC symbol, with the suffix matched in any case.
fn otc_base(symbol: &str) -> Option<&str> {
    let cut = symbol.len().checked_sub(OTC_SUFFIX.len())?;
    let suffix = symbol.get(cut..)?;
    suffix.eq_ignore_ascii_case(OTC_SUFFIX).then(|| &symbol[..cut])
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Neither the symbol nor its OTC variant is open
    #[error("no available version of {0} found")]
    AssetUnavailable(String),

    /// The broker did not accept the order; nothing was traded
    #[error("trade submission failed: {0}")]
    SubmissionFailed(String),

    /// The trade stays pending and can be reconciled later
    #[error("settlement check for trade {trade_id} failed: {reason}")]
    SettlementCheckFailed { trade_id: String, reason: String },

    #[error("unknown trade {0}")]
    UnknownTrade(String),

    #[error("trade {0} is already settled")]
    AlreadySettled(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl ExecutionError {
    /// Errors that end the session rather than the current trade.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecutionError::Broker(e) if e.is_fatal())
    }
}

/// Settled result of one trade.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub trade_id: String,
    pub outcome: Outcome,
    /// Signed: positive on a win, non-positive on a loss
    pub profit: Decimal,
}

/// Submits orders on a shared session and owns the resulting trades and stats.
pub struct TradeExecutor {
    session: Session,
    config: ExecutorConfig,
    active_trades: HashMap<String, Trade>,
    stats: StrategyStats,
}

impl TradeExecutor {
    pub fn new(session: Session, config: ExecutorConfig) -> Self {
        Self {
            session,
            config,
            active_trades: HashMap::new(),
            stats: StrategyStats::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn stats(&self) -> &StrategyStats {
        &self.stats
    }

    pub fn trade(&self, trade_id: &str) -> Option<&Trade> {
        self.active_trades.get(trade_id)
    }

    /// Trades still waiting for a result, oldest first.
    pub fn pending_trades(&self) -> Vec<&Trade> {
        let mut pending: Vec<_> = self.active_trades.values().filter(|t| t.is_pending()).collect();
        pending.sort_by(|a, b| a.entry_time.cmp(&b.entry_time).then_with(|| a.id.cmp(&b.id)));
        pending
    }

    /// Find a tradable symbol for `asset`: the symbol itself, or its OTC
    /// variant when closed. Exactly one fallback is attempted.
    pub async fn resolve_asset(&self, asset: &str) -> Result<String, ExecutionError> {
        let asset = normalize_symbol(asset);
        if self.is_open(&asset).await? {
            return Ok(asset);
        }
        warn!(asset = %asset, "Asset is closed");

        if otc_base(&asset).is_some() {
            error!(asset = %asset, "No available version of asset found");
            return Err(ExecutionError::AssetUnavailable(asset));
        }

        let otc = format!("{}{}", asset, OTC_SUFFIX);
        warn!(asset = %otc, "Trying OTC asset");
        if self.is_open(&otc).await? {
            return Ok(otc);
        }

        error!(asset = %asset, "No available version of asset found");
        Err(ExecutionError::AssetUnavailable(asset))
    }

    async fn is_open(&self, symbol: &str) -> Result<bool, ExecutionError> {
        let status = self.session.broker().check_asset(symbol).await?;
        Ok(status.is_some_and(|s| s.is_open))
    }

    /// Resolve the asset and place the order. The trade is registered as
    /// pending on success.
    pub async fn submit(
        &mut self,
        asset: &str,
        amount: Decimal,
        action: TradeAction,
        duration_secs: u32,
    ) -> Result<Trade, ExecutionError> {
        let _flight = self.session.single_flight().await;
        self.submit_in_flight(asset, amount, action, duration_secs).await
    }

    /// Wait for a submitted trade to expire, then settle it. On success the
    /// trade, the stats and the optional sizer are updated.
    pub async fn await_settlement(
        &mut self,
        trade_id: &str,
        sizer: Option<&mut PositionSizer>,
    ) -> Result<Settlement, ExecutionError> {
        let _flight = self.session.single_flight().await;
        self.settle_in_flight(trade_id, sizer).await
    }

    /// Submit and settle as one uninterrupted sequence on the session.
    pub async fn execute(
        &mut self,
        asset: &str,
        amount: Decimal,
        action: TradeAction,
        duration_secs: u32,
        sizer: Option<&mut PositionSizer>,
    ) -> Result<Settlement, ExecutionError> {
        let _flight = self.session.single_flight().await;
        let trade = self.submit_in_flight(asset, amount, action, duration_secs).await?;
        self.settle_in_flight(&trade.id, sizer).await
    }

    /// Give every pending trade one more settlement check, without waiting
    /// for expiry again.
    pub async fn reconcile_pending(&mut self, mut sizer: Option<&mut PositionSizer>) -> Vec<Settlement> {
        let due: Vec<String> = self.pending_trades().into_iter().map(|t| t.id.clone()).collect();

        let mut settled = Vec::new();
        for trade_id in due {
            info!(trade_id = %trade_id, "Reconciling pending trade");
            let _flight = self.session.single_flight().await;
            match self.check_settlement(&trade_id, sizer.as_deref_mut()).await {
                Ok(settlement) => settled.push(settlement),
                Err(e) => warn!(trade_id = %trade_id, error = %e, "Trade is still unresolved"),
            }
        }
        settled
    }

    pub async fn balance(&self) -> Result<Decimal, ExecutionError> {
        let balance = self.session.broker().get_balance().await?;
        info!(balance = %balance, "Current balance");
        Ok(balance)
    }

    /// Names of all currently open assets.
    pub async fn list_open_assets(&self) -> Result<Vec<String>, ExecutionError> {
        let mut open = Vec::new();
        for name in self.session.broker().all_asset_names().await? {
            if self.is_open(&name).await? {
                open.push(name);
            }
        }
        info!(count = open.len(), "Available assets");
        Ok(open)
    }

    async fn submit_in_flight(
        &mut self,
        asset: &str,
        amount: Decimal,
        action: TradeAction,
        duration_secs: u32,
    ) -> Result<Trade, ExecutionError> {
        let symbol = self.resolve_asset(asset).await?;

        info!(
            asset = %symbol,
            action = %action,
            amount = %amount,
            duration = duration_secs,
            "Executing trade"
        );

        let receipt = self
            .session
            .broker()
            .trade(action, amount, &symbol, duration_secs)
            .await
            .map_err(|e| {
                if e.is_fatal() {
                    ExecutionError::Broker(e)
                } else {
                    ExecutionError::SubmissionFailed(e.to_string())
                }
            })?;

        if !receipt.success {
            let reason = if receipt.message.is_empty() {
                "rejected by broker".to_string()
            } else {
                receipt.message
            };
            error!(asset = %symbol, reason = %reason, "Trade execution failed");
            return Err(ExecutionError::SubmissionFailed(reason));
        }

        let trade_id = receipt
            .trade_id
            .ok_or_else(|| ExecutionError::SubmissionFailed("broker returned no trade id".into()))?;

        let trade = Trade::new(trade_id.clone(), symbol, action, amount, duration_secs);
        self.active_trades.insert(trade_id.clone(), trade.clone());
        info!(trade_id = %trade_id, "Trade executed");

        Ok(trade)
    }

    async fn settle_in_flight(
        &mut self,
        trade_id: &str,
        sizer: Option<&mut PositionSizer>,
    ) -> Result<Settlement, ExecutionError> {
        let trade = self
            .active_trades
            .get(trade_id)
            .ok_or_else(|| ExecutionError::UnknownTrade(trade_id.to_string()))?;
        if !trade.is_pending() {
            return Err(ExecutionError::AlreadySettled(trade_id.to_string()));
        }

        let wait = trade.time_to_expiry() + self.config.settlement_buffer();
        info!(trade_id = %trade_id, wait_secs = wait.as_secs(), "Waiting for trade to complete");
        tokio::time::sleep(wait).await;

        self.check_settlement(trade_id, sizer).await
    }

    async fn check_settlement(
        &mut self,
        trade_id: &str,
        sizer: Option<&mut PositionSizer>,
    ) -> Result<Settlement, ExecutionError> {
        match self.active_trades.get(trade_id) {
            None => return Err(ExecutionError::UnknownTrade(trade_id.to_string())),
            Some(trade) if !trade.is_pending() => {
                return Err(ExecutionError::AlreadySettled(trade_id.to_string()))
            }
            Some(_) => {}
        }

        debug!(trade_id = %trade_id, "Checking trade result");
        let (win, reported) = match self.query_result(trade_id, self.config.settlement_timeout()).await {
            Ok(result) => result,
            Err(e) if e.is_fatal() => return Err(ExecutionError::Broker(e)),
            Err(e) => {
                error!(trade_id = %trade_id, error = %e, "Error checking trade result");
                return Err(ExecutionError::SettlementCheckFailed {
                    trade_id: trade_id.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let (outcome, profit) = if win {
            (Outcome::Win, reported)
        } else {
            (Outcome::Loss, -reported.abs())
        };

        let trade = self
            .active_trades
            .get_mut(trade_id)
            .ok_or_else(|| ExecutionError::UnknownTrade(trade_id.to_string()))?;
        trade
            .settle(outcome, profit)
            .map_err(|_| ExecutionError::AlreadySettled(trade_id.to_string()))?;

        match outcome {
            Outcome::Win => {
                self.stats.record_win(profit);
                info!(trade_id = %trade_id, profit = %profit, "Win");
            }
            Outcome::Loss => {
                self.stats.record_loss(profit);
                info!(trade_id = %trade_id, lost = %profit.abs(), "Loss");
            }
        }
        if let Some(sizer) = sizer {
            sizer.record(outcome);
        }

        info!(
            wins = self.stats.wins,
            losses = self.stats.losses,
            win_rate = %self.stats.win_rate().round_dp(2),
            total_profit = %self.stats.total_profit,
            "Stats"
        );

        Ok(Settlement {
            trade_id: trade_id.to_string(),
            outcome,
            profit,
        })
    }

    /// `check_win` followed by `get_profit`, bounded by `timeout`.
    async fn query_result(&self, trade_id: &str, timeout: Duration) -> Result<(bool, Decimal), BrokerError> {
        let broker = self.session.broker();
        let query = async {
            let win = broker.check_win(trade_id).await?;
            let profit = broker.get_profit().await?;
            Ok::<_, BrokerError>((win, profit))
        };

        tokio::time::timeout(timeout, query)
            .await
            .map_err(|_| BrokerError::Request(format!("no result within {}s", timeout.as_secs())))?
    }
}
