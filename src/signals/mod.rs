//! Signal entry point: text parsing and the inbound message handler.

mod handler;
pub mod parser;

pub use handler::{AllowList, SignalHandler};
pub use parser::parse;
