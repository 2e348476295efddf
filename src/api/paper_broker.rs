//! In-process simulated broker for paper trading.
//!
//! Prices follow a bounded random walk per asset. Orders settle at expiry by
//! comparing the exit price with the entry price; a win pays `payout` times
//! the stake, a loss forfeits the stake, an unchanged price refunds it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::Instant;
use tracing::debug;

use crate::models::{Candle, TradeAction};

use super::broker::BrokerClient;
use super::types::{AccountKind, AssetStatus, BrokerError, OrderReceipt};

const PAPER_ASSETS: &[&str] = &[
    "EURUSD", "GBPUSD", "USDJPY", "AUDCAD", "EURJPY", "EURUSD_otc", "GBPUSD_otc", "USDJPY_otc",
    "AUDCAD_otc", "EURJPY_otc",
];

/// Paper broker settings.
#[derive(Debug, Clone)]
pub struct PaperConfig {
    pub initial_balance: Decimal,
    /// Fraction of the stake paid on a win (0.85 = 85%)
    pub payout: Decimal,
    pub start_price: Decimal,
    /// Max relative move per price step
    pub volatility: f64,
    /// Candles kept per asset
    pub history_len: usize,
    /// Symbols reported as closed
    pub closed_assets: HashSet<String>,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_balance: dec!(10000),
            payout: dec!(0.85),
            start_price: dec!(1.08),
            volatility: 0.0005,
            history_len: 60,
            closed_assets: HashSet::new(),
        }
    }
}

struct PaperTrade {
    asset: String,
    action: TradeAction,
    amount: Decimal,
    entry_price: Decimal,
    expires_at: Instant,
}

struct PaperState {
    rng: StdRng,
    prices: HashMap<String, Decimal>,
    history: HashMap<String, VecDeque<Candle>>,
    trades: HashMap<String, PaperTrade>,
    balance: Decimal,
    last_profit: Option<Decimal>,
    connected: bool,
}

impl PaperState {
    fn step_price(&mut self, asset: &str, start: Decimal, volatility: f64) -> Decimal {
        let current = *self.prices.get(asset).unwrap_or(&start);
        let change: f64 = self.rng.gen_range(-volatility..=volatility);
        let factor = Decimal::ONE + Decimal::try_from(change).unwrap_or(Decimal::ZERO);
        let next = (current * factor).round_dp(5).max(dec!(0.00001));
        self.prices.insert(asset.to_string(), next);
        next
    }

    fn next_candle(&mut self, asset: &str, ts: i64, config: &PaperConfig) -> Candle {
        let open = *self.prices.get(asset).unwrap_or(&config.start_price);
        let (mut high, mut low) = (open, open);
        let mut close = open;
        for _ in 0..4 {
            close = self.step_price(asset, config.start_price, config.volatility);
            high = high.max(close);
            low = low.min(close);
        }
        Candle::from_unix(ts, open, close, high, low)
    }
}

/// Simulated broker. Never touches the network.
pub struct PaperBroker {
    config: PaperConfig,
    state: Mutex<PaperState>,
}

impl PaperBroker {
    pub fn new(config: PaperConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic price path, for tests and reproducible runs.
    pub fn with_seed(config: PaperConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: PaperConfig, rng: StdRng) -> Self {
        let state = PaperState {
            rng,
            prices: HashMap::new(),
            history: HashMap::new(),
            trades: HashMap::new(),
            balance: config.initial_balance,
            last_profit: None,
            connected: false,
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PaperState>, BrokerError> {
        self.state
            .lock()
            .map_err(|_| BrokerError::Disconnected("paper broker state poisoned".into()))
    }

    fn is_open(&self, symbol: &str) -> bool {
        PAPER_ASSETS.contains(&symbol) && !self.config.closed_assets.contains(symbol)
    }
}

#[async_trait]
impl BrokerClient for PaperBroker {
    fn name(&self) -> &'static str {
        "paper"
    }

    async fn connect(&self) -> Result<bool, BrokerError> {
        self.lock()?.connected = true;
        Ok(true)
    }

    async fn change_account(&self, kind: AccountKind) -> Result<(), BrokerError> {
        debug!(account = %kind, "Paper broker ignores account kind");
        Ok(())
    }

    async fn get_balance(&self) -> Result<Decimal, BrokerError> {
        Ok(self.lock()?.balance)
    }

    async fn all_asset_names(&self) -> Result<Vec<String>, BrokerError> {
        Ok(PAPER_ASSETS.iter().map(|s| s.to_string()).collect())
    }

    async fn check_asset(&self, symbol: &str) -> Result<Option<AssetStatus>, BrokerError> {
        let Some(index) = PAPER_ASSETS.iter().position(|s| *s == symbol) else {
            return Ok(None);
        };
        Ok(Some(AssetStatus {
            id: index as u32 + 1,
            name: symbol.to_string(),
            is_open: self.is_open(symbol),
        }))
    }

    async fn get_candles(&self, asset: &str, period_secs: u32) -> Result<Vec<Candle>, BrokerError> {
        if !PAPER_ASSETS.contains(&asset) {
            return Err(BrokerError::Request(format!("unknown asset {}", asset)));
        }

        let period = i64::from(period_secs.max(1));
        let now = Utc::now().timestamp() / period * period;
        let mut state = self.lock()?;

        let mut history = state.history.remove(asset).unwrap_or_default();
        if history.is_empty() {
            let start = now - period * self.config.history_len as i64;
            for i in 0..self.config.history_len as i64 {
                history.push_back(state.next_candle(asset, start + i * period, &self.config));
            }
        } else {
            history.push_back(state.next_candle(asset, now, &self.config));
            while history.len() > self.config.history_len {
                history.pop_front();
            }
        }

        let candles = history.iter().cloned().collect();
        state.history.insert(asset.to_string(), history);
        Ok(candles)
    }

    async fn trade(
        &self,
        action: TradeAction,
        amount: Decimal,
        asset: &str,
        duration_secs: u32,
    ) -> Result<OrderReceipt, BrokerError> {
        if !self.is_open(asset) {
            return Ok(OrderReceipt::rejected(format!("{} is closed", asset)));
        }

        let mut state = self.lock()?;
        if !state.connected {
            return Err(BrokerError::Disconnected("paper session not connected".into()));
        }
        if amount <= Decimal::ZERO || amount > state.balance {
            return Ok(OrderReceipt::rejected("insufficient balance"));
        }

        let entry_price = state.step_price(asset, self.config.start_price, self.config.volatility);
        state.balance -= amount;

        let id = uuid::Uuid::new_v4().to_string();
        state.trades.insert(
            id.clone(),
            PaperTrade {
                asset: asset.to_string(),
                action,
                amount,
                entry_price,
                expires_at: Instant::now() + Duration::from_secs(u64::from(duration_secs)),
            },
        );

        debug!(id = %id, asset = %asset, action = %action, amount = %amount, entry = %entry_price, "Paper order opened");
        Ok(OrderReceipt::accepted(id))
    }

    async fn check_win(&self, trade_id: &str) -> Result<bool, BrokerError> {
        let expires_at = self
            .lock()?
            .trades
            .get(trade_id)
            .map(|t| t.expires_at)
            .ok_or_else(|| BrokerError::Request(format!("unknown trade {}", trade_id)))?;

        tokio::time::sleep_until(expires_at).await;

        let mut state = self.lock()?;
        let trade = state
            .trades
            .remove(trade_id)
            .ok_or_else(|| BrokerError::Request(format!("trade {} already settled", trade_id)))?;

        let exit_price = state.step_price(&trade.asset, self.config.start_price, self.config.volatility);
        let won = match trade.action {
            TradeAction::Call => exit_price > trade.entry_price,
            TradeAction::Put => exit_price < trade.entry_price,
        };

        let profit = if won {
            (trade.amount * self.config.payout).round_dp(2)
        } else if exit_price == trade.entry_price {
            Decimal::ZERO
        } else {
            -trade.amount
        };
        // Stake was debited at entry; a refund or a win returns it.
        if profit >= Decimal::ZERO {
            state.balance += trade.amount + profit;
        }
        state.last_profit = Some(profit);

        debug!(id = %trade_id, entry = %trade.entry_price, exit = %exit_price, profit = %profit, "Paper order settled");
        Ok(won)
    }

    async fn get_profit(&self) -> Result<Decimal, BrokerError> {
        self.lock()?
            .last_profit
            .take()
            .ok_or_else(|| BrokerError::InvalidResponse("no settled trade to read profit from".into()))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.lock()?.connected = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker() -> PaperBroker {
        let config = PaperConfig {
            closed_assets: ["EURUSD".to_string()].into_iter().collect(),
            ..Default::default()
        };
        PaperBroker::with_seed(config, 7)
    }

    #[tokio::test]
    async fn test_asset_status() {
        let broker = broker();
        let closed = broker.check_asset("EURUSD").await.unwrap().unwrap();
        assert!(!closed.is_open);
        let otc = broker.check_asset("EURUSD_otc").await.unwrap().unwrap();
        assert!(otc.is_open);
        assert!(broker.check_asset("DOGEUSD").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_candle_history_grows_to_window() {
        let broker = broker();
        let first = broker.get_candles("GBPUSD", 60).await.unwrap();
        assert_eq!(first.len(), 60);
        assert!(first.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

        let second = broker.get_candles("GBPUSD", 60).await.unwrap();
        assert_eq!(second.len(), 60);
        assert!(second.iter().all(|c| c.low <= c.close && c.close <= c.high));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trade_settles_and_adjusts_balance() {
        let broker = broker();
        assert!(broker.connect().await.unwrap());

        let receipt = broker
            .trade(TradeAction::Call, dec!(10), "GBPUSD", 60)
            .await
            .unwrap();
        assert!(receipt.success);
        assert_eq!(broker.get_balance().await.unwrap(), dec!(9990));

        let id = receipt.trade_id.unwrap();
        let won = broker.check_win(&id).await.unwrap();
        let profit = broker.get_profit().await.unwrap();
        let balance = broker.get_balance().await.unwrap();

        if won {
            assert_eq!(profit, dec!(8.50));
            assert_eq!(balance, dec!(10008.50));
        } else {
            assert!(profit <= Decimal::ZERO);
            assert!(balance == dec!(9990) || balance == dec!(10000));
        }
        // The profit is consumed by the read.
        assert!(broker.get_profit().await.is_err());
    }

    #[tokio::test]
    async fn test_closed_asset_order_rejected() {
        let broker = broker();
        broker.connect().await.unwrap();
        let receipt = broker
            .trade(TradeAction::Put, dec!(1), "EURUSD", 60)
            .await
            .unwrap();
        assert!(!receipt.success);
        assert_eq!(broker.get_balance().await.unwrap(), dec!(10000));
    }
}
