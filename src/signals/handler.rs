//! Inbound message handling: sender authorization, commands, signal trades.

use std::collections::HashSet;
use std::fmt;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::models::{Outcome, Signal};
use crate::trading::{ExecutionError, TradeExecutor};

use super::parser::{mentions_keyword, parse};

/// Environment variable with the comma separated sender allow-list.
pub const ALLOWED_SENDERS_ENV: &str = "ALLOWED_SENDER_IDS";

const FORMAT_HINT: &str = "EURUSD CALL 1 60\n(asset action amount duration)";

/// Senders whose messages are acted on.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    ids: HashSet<i64>,
}

impl AllowList {
    /// Parse a comma separated id list. Blank entries are ignored and
    /// malformed ones skipped with a warning.
    pub fn parse(list: &str) -> Self {
        let mut ids = HashSet::new();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.parse::<i64>() {
                Ok(id) => {
                    ids.insert(id);
                }
                Err(_) => warn!(entry = %entry, "Ignoring invalid sender id"),
            }
        }

        if ids.is_empty() {
            warn!("Sender allow-list is empty, no users will be able to use the bot");
        }
        Self { ids }
    }

    pub fn from_env() -> Self {
        Self::parse(&std::env::var(ALLOWED_SENDERS_ENV).unwrap_or_default())
    }

    pub fn contains(&self, sender: i64) -> bool {
        self.ids.contains(&sender)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Message sent back to an authorized sender.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalReply {
    Welcome,
    Help,
    Balance(Decimal),
    Assets(Vec<String>),
    /// Sent before the trade is placed
    Detected(Signal),
    Succeeded { profit: Decimal },
    /// `loss` is unknown when the result never arrived
    Unsuccessful { loss: Option<Decimal> },
    Error(String),
    /// Looked like a signal but did not parse
    Unrecognized,
}

impl fmt::Display for SignalReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalReply::Welcome => write!(
                f,
                "Welcome to the trade executor bot!\n\n\
                 I execute trades based on the signals you send.\n\n\
                 Format your signals like this:\n{}",
                FORMAT_HINT
            ),
            SignalReply::Help => write!(
                f,
                "How to use this bot:\n\n\
                 1. Send trade signals in this format:\n{}\n\n\
                 2. Available commands:\n\
                 /start - Start the bot\n\
                 /help - Show this help message\n\
                 /balance - Check current balance\n\
                 /assets - List available assets\n\n\
                 3. Signal format details:\n\
                 - Asset: Trading pair (e.g. EURUSD, GBPJPY)\n\
                 - Action: CALL/PUT (or BUY/SELL)\n\
                 - Amount: Trade amount in dollars\n\
                 - Duration: Trade duration in seconds",
                FORMAT_HINT
            ),
            SignalReply::Balance(balance) => write!(f, "Current balance: ${:.2}", balance),
            SignalReply::Assets(assets) if assets.is_empty() => write!(f, "No assets are open right now."),
            SignalReply::Assets(assets) => write!(f, "Available assets:\n{}", assets.join("\n")),
            SignalReply::Detected(signal) => {
                write!(f, "Signal detected!\n{}\n\nExecuting trade...", signal)
            }
            SignalReply::Succeeded { profit } => write!(f, "Trade successful!\nProfit: ${}", profit),
            SignalReply::Unsuccessful { loss: Some(loss) } => {
                write!(f, "Trade unsuccessful.\nLoss: ${}", loss)
            }
            SignalReply::Unsuccessful { loss: None } => write!(f, "Trade unsuccessful.\nLoss: Unknown"),
            SignalReply::Error(reason) => write!(f, "Error executing trade: {}", reason),
            SignalReply::Unrecognized => {
                write!(f, "Signal format not recognized. Please use format:\n{}", FORMAT_HINT)
            }
        }
    }
}

/// Turns authorized messages into commands or trades and reports back on
/// `replies`.
pub struct SignalHandler {
    allow: AllowList,
    executor: TradeExecutor,
    replies: mpsc::UnboundedSender<SignalReply>,
}

impl SignalHandler {
    pub fn new(
        allow: AllowList,
        executor: TradeExecutor,
        replies: mpsc::UnboundedSender<SignalReply>,
    ) -> Self {
        Self {
            allow,
            executor,
            replies,
        }
    }

    pub fn executor(&self) -> &TradeExecutor {
        &self.executor
    }

    /// Handle one message. Only fatal broker errors are returned; every
    /// other failure is reported to the sender.
    pub async fn handle(&mut self, sender: i64, text: &str) -> Result<(), ExecutionError> {
        if !self.allow.contains(sender) {
            info!(sender = sender, "Unauthorized access attempt");
            return Ok(());
        }

        let text = text.trim();
        info!(sender = sender, text = %text, "Received message");

        match text {
            "/start" => self.reply(SignalReply::Welcome),
            "/help" => self.reply(SignalReply::Help),
            "/balance" => match self.executor.balance().await {
                Ok(balance) => self.reply(SignalReply::Balance(balance)),
                Err(e) => return self.report_failure(e),
            },
            "/assets" => match self.executor.list_open_assets().await {
                Ok(assets) => self.reply(SignalReply::Assets(assets)),
                Err(e) => return self.report_failure(e),
            },
            _ => return self.handle_signal(text).await,
        }
        Ok(())
    }

    async fn handle_signal(&mut self, text: &str) -> Result<(), ExecutionError> {
        let Some(signal) = parse(text) else {
            if mentions_keyword(text) {
                self.reply(SignalReply::Unrecognized);
            }
            return Ok(());
        };

        self.reply(SignalReply::Detected(signal.clone()));

        let result = self
            .executor
            .execute(
                &signal.asset,
                signal.amount,
                signal.action,
                signal.duration_secs,
                None,
            )
            .await;

        match result {
            Ok(settlement) if settlement.outcome == Outcome::Win => {
                self.reply(SignalReply::Succeeded {
                    profit: settlement.profit,
                });
            }
            Ok(settlement) => self.reply(SignalReply::Unsuccessful {
                loss: Some(settlement.profit.abs()),
            }),
            Err(ExecutionError::SettlementCheckFailed { .. }) => {
                self.reply(SignalReply::Unsuccessful { loss: None })
            }
            Err(e) => return self.report_failure(e),
        }
        Ok(())
    }

    fn report_failure(&self, e: ExecutionError) -> Result<(), ExecutionError> {
        error!(error = %e, "Error executing signal");
        self.reply(SignalReply::Error(e.to_string()));
        if e.is_fatal() {
            Err(e)
        } else {
            Ok(())
        }
    }

    fn reply(&self, reply: SignalReply) {
        if self.replies.send(reply).is_err() {
            debug!("Reply channel closed, dropping reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::api::testing::FakeBroker;
    use crate::api::{BrokerError, Session};
    use crate::models::TradeAction;
    use crate::trading::ExecutorConfig;
    use rust_decimal_macros::dec;
    use tokio_test::{assert_err, assert_ok};

    const OWNER: i64 = 42;

    fn setup(broker: FakeBroker) -> (Arc<FakeBroker>, SignalHandler, mpsc::UnboundedReceiver<SignalReply>) {
        let broker = Arc::new(broker);
        let executor = TradeExecutor::new(Session::new(broker.clone()), ExecutorConfig::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = SignalHandler::new(AllowList::parse("42, 7"), executor, tx);
        (broker, handler, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SignalReply>) -> Vec<SignalReply> {
        let mut replies = Vec::new();
        while let Ok(reply) = rx.try_recv() {
            replies.push(reply);
        }
        replies
    }

    #[test]
    fn test_allow_list_parsing() {
        let allow = AllowList::parse(" 1, ,abc,-100,2,");
        assert_eq!(allow.len(), 3);
        assert!(allow.contains(1));
        assert!(allow.contains(-100));
        assert!(!allow.contains(3));

        assert!(AllowList::parse("").is_empty());
        assert!(AllowList::parse(" , x").is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_sender_gets_nothing() {
        let (broker, mut handler, mut rx) = setup(FakeBroker::new().open("EURUSD"));

        assert_ok!(handler.handle(99, "EURUSD CALL 5 60").await);
        assert!(drain(&mut rx).is_empty());
        assert!(broker.orders().is_empty());
        assert!(broker.checked_assets().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_winning_signal() {
        let (broker, mut handler, mut rx) =
            setup(FakeBroker::new().open("EURUSD").settles(true, dec!(4.25)));

        assert_ok!(handler.handle(OWNER, "eurusd buy 5 120").await);

        let replies = drain(&mut rx);
        assert_eq!(replies.len(), 2);
        match &replies[0] {
            SignalReply::Detected(signal) => {
                assert_eq!(signal.asset, "EURUSD");
                assert_eq!(signal.action, TradeAction::Call);
            }
            other => panic!("expected detection, got {:?}", other),
        }
        assert_eq!(replies[1], SignalReply::Succeeded { profit: dec!(4.25) });

        let orders = broker.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].amount, dec!(5));
        assert_eq!(orders[0].duration_secs, 120);
        assert_eq!(handler.executor().stats().wins, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_losing_signal_reports_absolute_loss() {
        let (_broker, mut handler, mut rx) =
            setup(FakeBroker::new().open("EURUSD").settles(false, dec!(-5)));

        assert_ok!(handler.handle(OWNER, "EURUSD PUT 5").await);
        let replies = drain(&mut rx);
        assert_eq!(replies.last(), Some(&SignalReply::Unsuccessful { loss: Some(dec!(5)) }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_result_is_unknown_loss() {
        let (_broker, mut handler, mut rx) =
            setup(FakeBroker::new().open("EURUSD").settlement_fails("timeout"));

        assert_ok!(handler.handle(OWNER, "CALL").await);
        let replies = drain(&mut rx);
        assert_eq!(replies.last(), Some(&SignalReply::Unsuccessful { loss: None }));
        assert_eq!(handler.executor().pending_trades().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_asset_is_reported() {
        let (broker, mut handler, mut rx) =
            setup(FakeBroker::new().closed("GBPJPY").closed("GBPJPY_otc"));

        assert_ok!(handler.handle(OWNER, "GBPJPY SELL 1 60").await);
        let replies = drain(&mut rx);
        assert_eq!(replies.len(), 2);
        assert!(matches!(&replies[1], SignalReply::Error(msg) if msg.contains("GBPJPY")));
        assert!(broker.orders().is_empty());
    }

    #[tokio::test]
    async fn test_keyword_substring_is_unrecognized() {
        let (_broker, mut handler, mut rx) = setup(FakeBroker::new());

        assert_ok!(handler.handle(OWNER, "RECALLING the signal").await);
        assert_eq!(drain(&mut rx), vec![SignalReply::Unrecognized]);

        assert_ok!(handler.handle(OWNER, "good morning").await);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_commands() {
        let (_broker, mut handler, mut rx) = setup(FakeBroker::new().open("EURUSD_otc").closed("EURUSD"));

        assert_ok!(handler.handle(7, "/balance").await);
        assert_ok!(handler.handle(7, "/assets").await);
        assert_eq!(
            drain(&mut rx),
            vec![
                SignalReply::Balance(dec!(1000)),
                SignalReply::Assets(vec!["EURUSD_otc".to_string()]),
            ]
        );
    }

    #[tokio::test]
    async fn test_fatal_error_is_returned() {
        let (_broker, mut handler, mut rx) = setup(FakeBroker::new().open("EURUSD"));
        let err = assert_err!(
            handler
                .report_failure(ExecutionError::Broker(BrokerError::Disconnected("gone".into())))
        );
        assert!(err.is_fatal());
        assert_eq!(drain(&mut rx).len(), 1);
        assert_ok!(handler.handle(OWNER, "/start").await);
        assert_eq!(drain(&mut rx), vec![SignalReply::Welcome]);
    }

    #[test]
    fn test_reply_texts() {
        assert_eq!(
            SignalReply::Unsuccessful { loss: None }.to_string(),
            "Trade unsuccessful.\nLoss: Unknown"
        );
        assert!(SignalReply::Unrecognized.to_string().contains("EURUSD CALL 1 60"));
        assert_eq!(SignalReply::Balance(dec!(12.5)).to_string(), "Current balance: $12.50");
    }
}
