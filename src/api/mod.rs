//! Broker clients: the core's seam, a gateway-backed client and a paper broker.

mod broker;
mod gateway_client;
mod paper_broker;
#[cfg(test)]
pub mod testing;
mod types;

pub use broker::{BrokerClient, Session};
pub use gateway_client::GatewayClient;
pub use paper_broker::{PaperBroker, PaperConfig};
pub use types::*;
