//! Enrichment passes over the canonical wallet list
//!
//! Two passes overwrite parts of each record's statistics bundle:
//! - `analyze`: activity counters from recent signatures
//! - `stats`: realized trading statistics from enhanced history
//!
//! Both walk the list one wallet at a time with a fixed delay after each
//! call, keep a record unchanged when its lookup fails, and leave
//! persistence to the caller.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::rpc::{ChainSource, EnhancedTransaction, SignatureInfo};
use crate::wallet::types::WalletRecord;

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Activity counters derived from a signature list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivitySummary {
    pub total_trades: u64,
    pub token_diversity: u64,
    /// Newest block time in ms
    pub last_activity: i64,
}

/// Count unique signatures; `last_activity` falls back to `now` when there are none
pub fn summarize_activity(signatures: &[SignatureInfo], now: i64) -> ActivitySummary {
    let unique: HashSet<&str> = signatures.iter().map(|s| s.signature.as_str()).collect();
    let last_activity = signatures
        .iter()
        .filter_map(|s| s.block_time)
        .max()
        .map(|t| t * 1000)
        .unwrap_or(now);

    ActivitySummary {
        total_trades: unique.len() as u64,
        // Each signature is treated as touching a distinct token
        token_diversity: unique.len() as u64,
        last_activity,
    }
}

/// Realized statistics from enhanced history
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeStats {
    pub total_trades: u64,
    pub profitable_trades: u64,
    pub profit_rate: f64,
    /// SOL
    pub total_pnl: f64,
    pub highest_trade: f64,
    /// Minutes
    pub avg_hold_time: f64,
    pub token_diversity: u64,
    /// ms, `None` when no transaction carried a timestamp
    pub last_activity: Option<i64>,
}

#[derive(Debug, Default)]
struct MintLedger {
    spent_sol: f64,
    received_sol: f64,
    first_buy: Option<i64>,
    last_sell: Option<i64>,
}

impl MintLedger {
    fn is_closed(&self) -> bool {
        self.spent_sol > 0.0 && self.received_sol > 0.0
    }

    fn realized(&self) -> f64 {
        self.received_sol - self.spent_sol
    }
}

/// Build per-mint round trips for `wallet` and summarize them
///
/// A mint counts as closed once the wallet both spent SOL buying it and
/// received SOL selling it.
pub fn compute_trade_stats(transactions: &[EnhancedTransaction], wallet: &str) -> TradeStats {
    let mut ledgers: HashMap<&str, MintLedger> = HashMap::new();
    let mut stats = TradeStats::default();

    for tx in transactions {
        let transfer = tx.token_transfers.iter().find(|t| {
            t.to_user_account.as_deref() == Some(wallet)
                || t.from_user_account.as_deref() == Some(wallet)
        });
        let transfer = match transfer {
            Some(t) if tx.is_swap() => t,
            _ => continue,
        };

        stats.total_trades += 1;
        let ts = tx.timestamp_ms();
        stats.last_activity = stats.last_activity.max(ts);

        let sol = tx.net_lamports(wallet) as f64 / LAMPORTS_PER_SOL;
        let ledger = ledgers.entry(transfer.mint.as_str()).or_default();

        if transfer.to_user_account.as_deref() == Some(wallet) {
            if sol < 0.0 {
                ledger.spent_sol += -sol;
            }
            if let Some(ts) = ts {
                ledger.first_buy = Some(ledger.first_buy.map_or(ts, |f| f.min(ts)));
            }
        } else {
            if sol > 0.0 {
                ledger.received_sol += sol;
            }
            if let Some(ts) = ts {
                ledger.last_sell = Some(ledger.last_sell.map_or(ts, |l| l.max(ts)));
            }
        }
    }

    stats.token_diversity = ledgers.len() as u64;

    let closed: Vec<&MintLedger> = ledgers.values().filter(|l| l.is_closed()).collect();
    if closed.is_empty() {
        return stats;
    }

    stats.profitable_trades = closed
        .iter()
        .filter(|l| l.realized() > 0.0)
        .count()
        .min(stats.total_trades as usize) as u64;
    stats.profit_rate = stats.profitable_trades as f64 / closed.len() as f64 * 100.0;
    stats.total_pnl = closed.iter().map(|l| l.realized()).sum();
    stats.highest_trade = closed.iter().map(|l| l.realized()).fold(0.0, f64::max);

    let holds: Vec<f64> = closed
        .iter()
        .filter_map(|l| match (l.first_buy, l.last_sell) {
            (Some(buy), Some(sell)) => Some(((sell - buy) as f64 / 60_000.0).max(0.0)),
            _ => None,
        })
        .collect();
    if !holds.is_empty() {
        stats.avg_hold_time = holds.iter().sum::<f64>() / holds.len() as f64;
    }

    stats
}

/// Overwrite activity counters, keeping every other statistic
pub fn apply_activity(record: &mut WalletRecord, summary: &ActivitySummary, now: i64) {
    let stats = &mut record.stats;
    stats.total_trades = summary.total_trades;
    stats.token_diversity = summary.token_diversity;
    stats.profitable_trades = stats.profitable_trades.min(stats.total_trades);
    stats.touch_activity(summary.last_activity, now);
    record.updated_at = now;
}

/// Overwrite the trading statistics bundle
pub fn apply_trade_stats(record: &mut WalletRecord, trade: &TradeStats, now: i64) {
    let stats = &mut record.stats;
    stats.total_trades = trade.total_trades;
    stats.profitable_trades = trade.profitable_trades;
    stats.profit_rate = trade.profit_rate;
    stats.total_pnl = trade.total_pnl;
    stats.highest_trade = trade.highest_trade;
    stats.avg_hold_time = trade.avg_hold_time;
    stats.token_diversity = trade.token_diversity;
    if let Some(last) = trade.last_activity {
        stats.touch_activity(last, now);
    }
    record.updated_at = now;
}

/// Counts from one enrichment pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub processed: usize,
    pub updated: usize,
    /// Lookups that returned nothing to apply
    pub unchanged: usize,
    pub failed: usize,
    /// Subset of `failed` that a retry will not fix
    pub permanent: usize,
}

impl PassReport {
    fn record_failure(&mut self, label: &str, what: &str, e: &Error) {
        self.failed += 1;
        if e.is_transient() {
            warn!("{} lookup for {} failed: {}", what, label, e);
        } else {
            self.permanent += 1;
            error!("{} lookup for {} failed permanently: {}", what, label, e);
        }
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} updated, {} unchanged, {} failed",
            self.processed, self.updated, self.unchanged, self.failed
        )?;
        if self.permanent > 0 {
            write!(f, " ({} permanent)", self.permanent)?;
        }
        Ok(())
    }
}

/// Activity pass: one signature lookup per wallet
pub async fn analyze_pass<S: ChainSource + ?Sized>(
    records: &mut [WalletRecord],
    source: &S,
    limit: u32,
    delay: Duration,
    now: i64,
) -> PassReport {
    let mut report = PassReport::default();
    let total = records.len();

    for (i, record) in records.iter_mut().enumerate() {
        report.processed += 1;
        info!("[{}/{}] Analyzing {} ({}...)", i + 1, total, record.label(), record.short_address());

        match source.signatures(&record.address, limit).await {
            Ok(signatures) => {
                debug!("{}: {} signatures", record.label(), signatures.len());
                let summary = summarize_activity(&signatures, now);
                apply_activity(record, &summary, now);
                report.updated += 1;
            }
            Err(e) => report.record_failure(record.label(), "Activity", &e),
        }

        pause(delay).await;
    }

    report
}

/// Trading statistics pass: one history lookup per wallet
///
/// An empty history leaves the record untouched.
pub async fn stats_pass<S: ChainSource + ?Sized>(
    records: &mut [WalletRecord],
    source: &S,
    limit: u32,
    delay: Duration,
    now: i64,
) -> PassReport {
    let mut report = PassReport::default();
    let total = records.len();

    for (i, record) in records.iter_mut().enumerate() {
        report.processed += 1;
        info!("[{}/{}] Scanning trades of {} ({}...)", i + 1, total, record.label(), record.short_address());

        match source.enhanced_history(&record.address, limit).await {
            Ok(history) if history.is_empty() => {
                debug!("{}: no history", record.label());
                report.unchanged += 1;
            }
            Ok(history) => {
                let trade = compute_trade_stats(&history, &record.address);
                debug!(
                    "{}: {} trades, {:.1}% win, {:.3} SOL",
                    record.label(),
                    trade.total_trades,
                    trade.profit_rate,
                    trade.total_pnl
                );
                apply_trade_stats(record, &trade, now);
                report.updated += 1;
            }
            Err(e) => report.record_failure(record.label(), "History", &e),
        }

        pause(delay).await;
    }

    report
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::rpc::{NativeTransfer, TokenTransfer};
    use async_trait::async_trait;

    const W: &str = "WalletAAA111";
    const DAY_MS: i64 = 86_400_000;

    fn sig(signature: &str, block_time: Option<i64>) -> SignatureInfo {
        SignatureInfo {
            signature: signature.to_string(),
            slot: 1,
            block_time,
            err: None,
        }
    }

    fn swap(signature: &str, ts: i64, mint: &str, buy: bool, lamports: u64) -> EnhancedTransaction {
        let (token_from, token_to, sol_from, sol_to) = if buy {
            ("Pool", W, W, "Pool")
        } else {
            (W, "Pool", "Pool", W)
        };
        EnhancedTransaction {
            signature: signature.to_string(),
            tx_type: Some("SWAP".to_string()),
            timestamp: Some(ts),
            fee_payer: Some(W.to_string()),
            native_transfers: vec![NativeTransfer {
                from_user_account: Some(sol_from.to_string()),
                to_user_account: Some(sol_to.to_string()),
                amount: lamports,
            }],
            token_transfers: vec![TokenTransfer {
                from_user_account: Some(token_from.to_string()),
                to_user_account: Some(token_to.to_string()),
                mint: mint.to_string(),
                token_amount: 1000.0,
            }],
        }
    }

    #[test]
    fn test_summarize_activity() {
        let sigs = vec![
            sig("a", Some(1_700_000_300)),
            sig("b", Some(1_700_000_100)),
            sig("a", Some(1_700_000_300)),
            sig("c", None),
        ];
        let summary = summarize_activity(&sigs, 42);
        assert_eq!(summary.total_trades, 3);
        assert_eq!(summary.token_diversity, 3);
        assert_eq!(summary.last_activity, 1_700_000_300_000);

        let empty = summarize_activity(&[], 42);
        assert_eq!(empty.total_trades, 0);
        assert_eq!(empty.last_activity, 42);
    }

    #[test]
    fn test_round_trips() {
        let history = vec![
            // mint A: buy 1 SOL, sell 1.5 SOL 30 minutes later
            swap("s1", 1_000, "MintA", true, 1_000_000_000),
            swap("s2", 1_000 + 1_800, "MintA", false, 1_500_000_000),
            // mint B: buy 2 SOL, sell 0.5 SOL 90 minutes later
            swap("s3", 2_000, "MintB", true, 2_000_000_000),
            swap("s4", 2_000 + 5_400, "MintB", false, 500_000_000),
            // mint C: still open
            swap("s5", 9_000, "MintC", true, 300_000_000),
        ];

        let stats = compute_trade_stats(&history, W);
        assert_eq!(stats.total_trades, 5);
        assert_eq!(stats.token_diversity, 3);
        assert_eq!(stats.profitable_trades, 1);
        assert!((stats.profit_rate - 50.0).abs() < 1e-9);
        assert!((stats.total_pnl - (0.5 - 1.5)).abs() < 1e-9);
        assert!((stats.highest_trade - 0.5).abs() < 1e-9);
        assert!((stats.avg_hold_time - 60.0).abs() < 1e-9);
        assert_eq!(stats.last_activity, Some(9_000_000));
        assert!(stats.profitable_trades <= stats.total_trades);
    }

    #[test]
    fn test_non_swaps_and_foreign_transfers_ignored() {
        let mut transfer = swap("s1", 1_000, "MintA", true, 1_000_000_000);
        transfer.tx_type = Some("TRANSFER".to_string());
        let foreign = swap("s2", 1_000, "MintA", true, 1_000_000_000);

        let stats = compute_trade_stats(&[transfer], W);
        assert_eq!(stats, TradeStats::default());

        let stats = compute_trade_stats(&[foreign], "SomeoneElse");
        assert_eq!(stats.total_trades, 0);
    }

    #[test]
    fn test_only_losing_trades() {
        let history = vec![
            swap("s1", 0, "MintA", true, 1_000_000_000),
            swap("s2", 60, "MintA", false, 400_000_000),
        ];
        let stats = compute_trade_stats(&history, W);
        assert_eq!(stats.profitable_trades, 0);
        assert_eq!(stats.profit_rate, 0.0);
        assert_eq!(stats.highest_trade, 0.0);
        assert!((stats.avg_hold_time - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_apply_activity_keeps_other_stats() {
        let mut record = WalletRecord::new(W, "alpha_discovery", 0);
        record.stats.total_pnl = 3.25;
        record.stats.profit_rate = 55.0;
        record.stats.profitable_trades = 40;
        record.first_seen = 7;

        let now = 10 * DAY_MS;
        let summary = ActivitySummary {
            total_trades: 12,
            token_diversity: 12,
            last_activity: 8 * DAY_MS,
        };
        apply_activity(&mut record, &summary, now);

        assert_eq!(record.stats.total_trades, 12);
        assert_eq!(record.stats.profitable_trades, 12);
        assert_eq!(record.stats.total_pnl, 3.25);
        assert_eq!(record.stats.profit_rate, 55.0);
        assert!((record.stats.days_since_active - 2.0).abs() < 1e-9);
        assert_eq!(record.first_seen, 7);
        assert_eq!(record.updated_at, now);
    }

    struct CannedChain {
        history: HashMap<String, Vec<EnhancedTransaction>>,
    }

    #[async_trait]
    impl ChainSource for CannedChain {
        async fn signatures(&self, address: &str, _limit: u32) -> Result<Vec<SignatureInfo>> {
            match address {
                "broken" => return Err(Error::RpcTimeout(10)),
                "garbled" => return Err(Error::Deserialization("unexpected body".into())),
                _ => {}
            }
            Ok(vec![sig("x", Some(100)), sig("y", Some(200))])
        }

        async fn enhanced_history(&self, address: &str, _limit: u32) -> Result<Vec<EnhancedTransaction>> {
            if address == "broken" {
                return Err(Error::Rpc("boom".into()));
            }
            Ok(self.history.get(address).cloned().unwrap_or_default())
        }
    }

    fn fleet() -> Vec<WalletRecord> {
        vec![
            WalletRecord::new(W, "alpha_discovery", 0),
            WalletRecord::new("broken", "alpha_discovery", 0),
            WalletRecord::new("quiet", "millionaire_scan", 0),
        ]
    }

    #[tokio::test]
    async fn test_analyze_pass_tolerates_failures() {
        let chain = CannedChain { history: HashMap::new() };
        let mut records = fleet();
        let before = records[1].clone();

        let report = analyze_pass(&mut records, &chain, 100, Duration::ZERO, 500_000).await;

        assert_eq!(report.processed, 3);
        assert_eq!(report.updated, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(records[0].stats.total_trades, 2);
        assert_eq!(records[0].stats.last_activity, 200_000);
        assert_eq!(records[1], before);
    }

    #[tokio::test]
    async fn test_malformed_responses_count_as_permanent() {
        let chain = CannedChain { history: HashMap::new() };
        let mut records = vec![
            WalletRecord::new("broken", "alpha_discovery", 0),
            WalletRecord::new("garbled", "alpha_discovery", 0),
            WalletRecord::new(W, "alpha_discovery", 0),
        ];

        let report = analyze_pass(&mut records, &chain, 100, Duration::ZERO, 500_000).await;

        assert_eq!(report.failed, 2);
        assert_eq!(report.permanent, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(
            report.to_string(),
            "3 processed, 1 updated, 0 unchanged, 2 failed (1 permanent)"
        );
    }

    #[test]
    fn test_stats_pass_skips_empty_history() {
        let mut history = HashMap::new();
        history.insert(
            W.to_string(),
            vec![
                swap("s1", 0, "MintA", true, 1_000_000_000),
                swap("s2", 600, "MintA", false, 3_000_000_000),
            ],
        );
        let chain = CannedChain { history };
        let mut records = fleet();
        let quiet_before = records[2].clone();

        let report = tokio_test::block_on(stats_pass(&mut records, &chain, 1000, Duration::ZERO, 1_000_000));

        assert_eq!(report, PassReport { processed: 3, updated: 1, unchanged: 1, failed: 1, permanent: 0 });
        assert_eq!(records[0].stats.profitable_trades, 1);
        assert!((records[0].stats.total_pnl - 2.0).abs() < 1e-9);
        assert_eq!(records[0].updated_at, 1_000_000);
        assert_eq!(records[2], quiet_before);
    }
}
