//! Position signals
//!
//! The scanner writes the signal file; the monitor reads it.

pub mod scanner;
pub mod types;

pub use scanner::{save_signals, scan_all, ScanCriteria, ScanReport};
pub use types::{PnlPoint, SignalRecord, SignalTier};
