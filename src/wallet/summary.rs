//! Fleet-wide statistics printed after each pass

use std::fmt;

use super::types::WalletRecord;

/// Aggregate view over the canonical list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetSummary {
    pub wallets: usize,
    pub with_trades: usize,
    pub avg_trades: f64,
    /// Mean profit rate over wallets with at least one trade
    pub avg_win_rate: f64,
    pub total_pnl: f64,
}

impl FleetSummary {
    /// Build from `(total_trades, profit_rate, total_pnl)` triples
    pub fn from_stats<I>(stats: I) -> Self
    where
        I: IntoIterator<Item = (u64, f64, f64)>,
    {
        let mut summary = FleetSummary::default();
        let mut trade_sum = 0u64;
        let mut rate_sum = 0.0;

        for (trades, rate, pnl) in stats {
            summary.wallets += 1;
            trade_sum += trades;
            summary.total_pnl += pnl;
            if trades > 0 {
                summary.with_trades += 1;
                rate_sum += rate;
            }
        }

        if summary.wallets > 0 {
            summary.avg_trades = trade_sum as f64 / summary.wallets as f64;
        }
        if summary.with_trades > 0 {
            summary.avg_win_rate = rate_sum / summary.with_trades as f64;
        }
        summary
    }

    pub fn from_records(records: &[WalletRecord]) -> Self {
        Self::from_stats(
            records
                .iter()
                .map(|r| (r.stats.total_trades, r.stats.profit_rate, r.stats.total_pnl)),
        )
    }
}

impl fmt::Display for FleetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "   Wallets: {}", self.wallets)?;
        writeln!(f, "   Wallets with trades: {}/{}", self.with_trades, self.wallets)?;
        writeln!(f, "   Avg trades per wallet: {:.1}", self.avg_trades)?;
        writeln!(f, "   Avg win rate: {:.1}%", self.avg_win_rate)?;
        write!(f, "   Total PnL: {:.2} SOL", self.total_pnl)
    }
}
