//! Scripted in-memory broker for unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{Candle, TradeAction};

use super::broker::BrokerClient;
use super::types::{AccountKind, AssetStatus, BrokerError, OrderReceipt};

/// Order as the fake broker received it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub action: TradeAction,
    pub amount: Decimal,
    pub asset: String,
    pub duration_secs: u32,
}

#[derive(Default)]
struct FakeState {
    connect_ok: bool,
    open_assets: HashSet<String>,
    known_assets: HashSet<String>,
    candles: VecDeque<Result<Vec<Candle>, BrokerError>>,
    fallback_candles: Vec<Candle>,
    settlements: VecDeque<Result<(bool, Decimal), BrokerError>>,
    rejections: VecDeque<String>,
    last_profit: Option<Decimal>,
    next_id: u32,
    account: Option<AccountKind>,

    checked_assets: Vec<String>,
    orders: Vec<PlacedOrder>,
    win_checks: Vec<String>,
    candle_assets: Vec<String>,
    connect_calls: u32,
}

/// Broker double. Every call is recorded; responses come from scripts.
pub struct FakeBroker {
    state: Mutex<FakeState>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                connect_ok: true,
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn refuse_connection(self) -> Self {
        self.with(|s| s.connect_ok = false);
        self
    }

    pub fn open(self, symbol: &str) -> Self {
        self.with(|s| {
            s.known_assets.insert(symbol.to_string());
            s.open_assets.insert(symbol.to_string());
        });
        self
    }

    pub fn closed(self, symbol: &str) -> Self {
        self.with(|s| {
            s.known_assets.insert(symbol.to_string());
        });
        self
    }

    /// Next `get_candles` responses, in order. Afterwards the fallback is served.
    pub fn candles(self, response: Result<Vec<Candle>, BrokerError>) -> Self {
        self.with(|s| s.candles.push_back(response));
        self
    }

    pub fn fallback_candles(self, candles: Vec<Candle>) -> Self {
        self.with(|s| s.fallback_candles = candles);
        self
    }

    pub fn settles(self, win: bool, profit: Decimal) -> Self {
        self.with(|s| s.settlements.push_back(Ok((win, profit))));
        self
    }

    pub fn settlement_fails(self, reason: &str) -> Self {
        self.with(|s| {
            s.settlements
                .push_back(Err(BrokerError::Request(reason.to_string())))
        });
        self
    }

    pub fn rejects_next_order(self, message: &str) -> Self {
        self.with(|s| s.rejections.push_back(message.to_string()));
        self
    }

    pub fn checked_assets(&self) -> Vec<String> {
        self.with(|s| s.checked_assets.clone())
    }

    pub fn orders(&self) -> Vec<PlacedOrder> {
        self.with(|s| s.orders.clone())
    }

    pub fn win_checks(&self) -> Vec<String> {
        self.with(|s| s.win_checks.clone())
    }

    pub fn candle_requests(&self) -> u32 {
        self.with(|s| s.candle_assets.len() as u32)
    }

    /// Symbol of every `get_candles` call, in order.
    pub fn candle_assets(&self) -> Vec<String> {
        self.with(|s| s.candle_assets.clone())
    }

    pub fn connect_calls(&self) -> u32 {
        self.with(|s| s.connect_calls)
    }

    pub fn account(&self) -> Option<AccountKind> {
        self.with(|s| s.account)
    }
}

#[async_trait]
impl BrokerClient for FakeBroker {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn connect(&self) -> Result<bool, BrokerError> {
        Ok(self.with(|s| {
            s.connect_calls += 1;
            s.connect_ok
        }))
    }

    async fn change_account(&self, kind: AccountKind) -> Result<(), BrokerError> {
        self.with(|s| s.account = Some(kind));
        Ok(())
    }

    async fn get_balance(&self) -> Result<Decimal, BrokerError> {
        Ok(Decimal::from(1000))
    }

    async fn all_asset_names(&self) -> Result<Vec<String>, BrokerError> {
        let mut names: Vec<String> = self.with(|s| s.known_assets.iter().cloned().collect());
        names.sort();
        Ok(names)
    }

    async fn check_asset(&self, symbol: &str) -> Result<Option<AssetStatus>, BrokerError> {
        Ok(self.with(|s| {
            s.checked_assets.push(symbol.to_string());
            s.known_assets.contains(symbol).then(|| AssetStatus {
                id: 1,
                name: symbol.to_string(),
                is_open: s.open_assets.contains(symbol),
            })
        }))
    }

    async fn get_candles(&self, asset: &str, _period_secs: u32) -> Result<Vec<Candle>, BrokerError> {
        self.with(|s| {
            s.candle_assets.push(asset.to_string());
            s.candles
                .pop_front()
                .unwrap_or_else(|| Ok(s.fallback_candles.clone()))
        })
    }

    async fn trade(
        &self,
        action: TradeAction,
        amount: Decimal,
        asset: &str,
        duration_secs: u32,
    ) -> Result<OrderReceipt, BrokerError> {
        Ok(self.with(|s| {
            s.orders.push(PlacedOrder {
                action,
                amount,
                asset: asset.to_string(),
                duration_secs,
            });
            if let Some(message) = s.rejections.pop_front() {
                return OrderReceipt::rejected(message);
            }
            let id = s.next_id;
            s.next_id += 1;
            OrderReceipt::accepted(id.to_string())
        }))
    }

    async fn check_win(&self, trade_id: &str) -> Result<bool, BrokerError> {
        self.with(|s| -> Result<bool, BrokerError> {
            s.win_checks.push(trade_id.to_string());
            let (win, profit) = s
                .settlements
                .pop_front()
                .unwrap_or_else(|| Err(BrokerError::Request("no settlement scripted".into())))?;
            s.last_profit = Some(profit);
            Ok(win)
        })
    }

    async fn get_profit(&self) -> Result<Decimal, BrokerError> {
        self.with(|s| {
            s.last_profit
                .take()
                .ok_or_else(|| BrokerError::InvalidResponse("no profit available".into()))
        })
    }

    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Candles whose closes are exactly `closes`, one minute apart.
pub fn candles_from_closes(closes: &[Decimal]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| Candle::from_unix(1_700_000_000 + i as i64 * 60, *close, *close, *close, *close))
        .collect()
}
