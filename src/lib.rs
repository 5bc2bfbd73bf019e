//! Alpha Wallet Tracker Library
//!
//! Maintains the canonical alpha-wallet list, enriches it with on-chain
//! trading statistics and turns open positions into alert signals.

pub mod cli;
pub mod config;
pub mod enrich;
pub mod error;
pub mod holders;
pub mod monitor;
pub mod price;
pub mod refresh;
pub mod rpc;
pub mod signals;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
