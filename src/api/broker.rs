//! Broker client seam and the shared session handle.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::models::{Candle, TradeAction};

use super::types::{AccountKind, AssetStatus, BrokerError, OrderReceipt};

/// Operations the trading core needs from a broker.
///
/// Every method is a round-trip and a suspension point. `get_profit` is only
/// meaningful immediately after `check_win` for the same trade; callers must
/// not let another settlement check run in between (see [`Session`]).
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Open the session. `Ok(false)` means the broker refused it.
    async fn connect(&self) -> Result<bool, BrokerError>;

    async fn change_account(&self, kind: AccountKind) -> Result<(), BrokerError>;

    async fn get_balance(&self) -> Result<Decimal, BrokerError>;

    /// Every symbol the broker knows, open or not
    async fn all_asset_names(&self) -> Result<Vec<String>, BrokerError>;

    /// `None` when the symbol is unknown.
    async fn check_asset(&self, symbol: &str) -> Result<Option<AssetStatus>, BrokerError>;

    /// Recent candles, oldest first.
    async fn get_candles(&self, asset: &str, period_secs: u32) -> Result<Vec<Candle>, BrokerError>;

    async fn trade(
        &self,
        action: TradeAction,
        amount: Decimal,
        asset: &str,
        duration_secs: u32,
    ) -> Result<OrderReceipt, BrokerError>;

    /// Suspends until the trade is settled; `true` on a win.
    async fn check_win(&self, trade_id: &str) -> Result<bool, BrokerError>;

    /// Profit of the trade last passed to `check_win`.
    async fn get_profit(&self) -> Result<Decimal, BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

/// One authenticated broker session, shared by reference between the
/// strategy engine and the signal handler.
///
/// The single-flight gate serializes order submission and settlement checks
/// so two entry points never interleave on one account.
#[derive(Clone)]
pub struct Session {
    broker: Arc<dyn BrokerClient>,
    gate: Arc<Mutex<()>>,
}

impl Session {
    pub fn new(broker: Arc<dyn BrokerClient>) -> Self {
        Self {
            broker,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn broker(&self) -> &dyn BrokerClient {
        self.broker.as_ref()
    }

    /// Connect and switch to the requested account. No retry on refusal.
    pub async fn connect(&self, kind: AccountKind) -> Result<(), BrokerError> {
        if !self.broker.connect().await? {
            warn!(broker = self.broker.name(), "Broker refused the session");
            return Err(BrokerError::ConnectionFailed);
        }
        self.broker.change_account(kind).await?;
        info!(broker = self.broker.name(), account = %kind, "Connected to broker");
        Ok(())
    }

    /// Wait for exclusive use of the order path.
    pub async fn single_flight(&self) -> OwnedMutexGuard<()> {
        self.gate.clone().lock_owned().await
    }

    pub async fn close(&self) {
        match self.broker.close().await {
            Ok(()) => info!(broker = self.broker.name(), "Connection closed"),
            Err(e) => warn!(error = %e, "Failed to close broker session cleanly"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::FakeBroker;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_refused_connection_fails_without_retry() {
        let broker = Arc::new(FakeBroker::new().refuse_connection());
        let session = Session::new(broker.clone());

        let err = assert_err!(session.connect(AccountKind::Real).await);
        assert!(matches!(err, BrokerError::ConnectionFailed));
        assert!(err.is_fatal());
        assert_eq!(broker.connect_calls(), 1);
        assert_eq!(broker.account(), None);
    }

    #[tokio::test]
    async fn test_connect_switches_account() {
        let broker = Arc::new(FakeBroker::new());
        let session = Session::new(broker.clone());

        assert_ok!(session.connect(AccountKind::Real).await);
        assert_eq!(broker.connect_calls(), 1);
        assert_eq!(broker.account(), Some(AccountKind::Real));
    }
}
