//! Position scanner
//!
//! For each tracked wallet: list current token balances, walk recent
//! history for buys of tokens still held, price each candidate and keep
//! the ones inside the PnL window.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::ScanConfig;
use crate::error::Result;
use crate::price::{PriceSource, TokenPrice};
use crate::rpc::{ChainSource, EnhancedTransaction, TokenBalance};
use crate::wallet::store::write_json_atomic;
use crate::wallet::types::WalletRecord;

use super::types::{PnlPoint, SignalRecord, SignalTier};

const MS_PER_DAY: f64 = 86_400_000.0;

/// Filters applied to positions
#[derive(Debug, Clone)]
pub struct ScanCriteria {
    pub max_days_old: f64,
    pub min_token_holding: f64,
    pub min_pnl_percent: f64,
    pub max_pnl_percent: Option<f64>,
    pub history_points_max: u32,
}

impl ScanCriteria {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            max_days_old: config.max_days_old,
            min_token_holding: config.min_token_holding,
            min_pnl_percent: config.min_pnl_percent,
            max_pnl_percent: config.max_pnl_percent,
            history_points_max: config.history_points_max,
        }
    }

    fn pnl_in_range(&self, pnl: f64) -> bool {
        pnl >= self.min_pnl_percent && self.max_pnl_percent.map_or(true, |max| pnl <= max)
    }
}

impl Default for ScanCriteria {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

/// A buy of a token the wallet still holds
#[derive(Debug, Clone, PartialEq)]
pub struct BuyCandidate {
    pub token_mint: String,
    /// ms
    pub buy_timestamp: i64,
    pub buy_amount: f64,
    pub current_balance: f64,
    pub tx_signature: String,
}

/// Buys into still-held tokens, one per mint (the most recent wins)
pub fn find_buys(
    transactions: &[EnhancedTransaction],
    balances: &[TokenBalance],
    wallet: &str,
    criteria: &ScanCriteria,
    now: i64,
) -> Vec<BuyCandidate> {
    let max_age_ms = criteria.max_days_old * MS_PER_DAY;
    let held: HashMap<&str, f64> = balances.iter().map(|b| (b.mint.as_str(), b.amount)).collect();

    let mut by_mint: HashMap<String, BuyCandidate> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for tx in transactions {
        let timestamp = match tx.timestamp_ms() {
            Some(ts) if (now - ts) as f64 <= max_age_ms => ts,
            _ => continue,
        };

        for transfer in tx
            .token_transfers
            .iter()
            .filter(|t| t.to_user_account.as_deref() == Some(wallet))
        {
            let balance = match held.get(transfer.mint.as_str()) {
                Some(&amount) if amount >= criteria.min_token_holding => amount,
                _ => continue,
            };

            let candidate = BuyCandidate {
                token_mint: transfer.mint.clone(),
                buy_timestamp: timestamp,
                buy_amount: transfer.token_amount,
                current_balance: balance,
                tx_signature: tx.signature.clone(),
            };

            match by_mint.get_mut(&transfer.mint) {
                Some(existing) if existing.buy_timestamp >= timestamp => {}
                Some(existing) => *existing = candidate,
                None => {
                    order.push(transfer.mint.clone());
                    by_mint.insert(transfer.mint.clone(), candidate);
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|mint| by_mint.remove(&mint))
        .collect()
}

/// Straight line from 0 to `current_pnl`, `min(ceil(days), max)+1` points
pub fn pnl_history(current_pnl: f64, days_held: f64, max_points: u32) -> Vec<PnlPoint> {
    let points = (days_held.max(0.0).ceil() as u32).min(max_points);
    let mut history: Vec<PnlPoint> = (0..=points)
        .map(|day| {
            let progress = if points == 0 { 1.0 } else { day as f64 / points as f64 };
            PnlPoint {
                day,
                pnl: (current_pnl * progress * 100.0).round() / 100.0,
            }
        })
        .collect();

    if let Some(last) = history.last_mut() {
        last.pnl = current_pnl;
    }
    history
}

/// Shape a priced buy into a signal; `None` when it falls outside the criteria
pub fn build_signal(
    buy: &BuyCandidate,
    price: &TokenPrice,
    wallet: &WalletRecord,
    criteria: &ScanCriteria,
    now: i64,
) -> Option<SignalRecord> {
    if price.price_usd <= 0.0 {
        return None;
    }

    // 24h change stands in for PnL since entry
    let pnl = price.price_change_24h;
    if !criteria.pnl_in_range(pnl) {
        return None;
    }
    // A total loss leaves no entry market cap to back out
    if 100.0 + pnl <= 0.0 {
        return None;
    }

    let days_held = ((now - buy.buy_timestamp) as f64 / MS_PER_DAY).max(0.0);
    let entry_market_cap = price.market_cap * 100.0 / (100.0 + pnl);
    let tier = SignalTier::from_entry_market_cap(entry_market_cap);

    Some(SignalRecord {
        id: SignalRecord::make_id(&wallet.address, &buy.token_mint),
        timestamp: buy.buy_timestamp,
        wallet_address: wallet.address.clone(),
        wallet_name: wallet.display_id.clone(),
        action: "BUY".to_string(),
        token_mint: buy.token_mint.clone(),
        token_symbol: price.symbol.clone(),
        amount: buy.buy_amount,
        current_balance: buy.current_balance,
        price_change_24h: Some(pnl),
        entry_market_cap,
        current_market_cap: price.market_cap,
        pair_address: price.pair_address.clone(),
        tx_signature: buy.tx_signature.clone(),
        axiom_link: format!("https://axiom.trade/meme/{}", price.pair_address),
        days_held: format!("{:.1}", days_held),
        pnl_history: pnl_history(pnl, days_held, criteria.history_points_max),
        tier: tier.id().to_string(),
        tier_name: tier.name().to_string(),
        tier_emoji: tier.glyph().to_string(),
    })
}

/// Best PnL first
pub fn sort_signals(signals: &mut [SignalRecord]) {
    signals.sort_by(|a, b| b.pnl().total_cmp(&a.pnl()));
}

/// Scan one wallet
pub async fn scan_wallet<C, P>(
    wallet: &WalletRecord,
    chain: &C,
    prices: &P,
    criteria: &ScanCriteria,
    transaction_limit: u32,
    price_delay: Duration,
    now: i64,
) -> Result<Vec<SignalRecord>>
where
    C: ChainSource + ?Sized,
    P: PriceSource + ?Sized,
{
    let balances = chain.token_balances(&wallet.address).await?;
    debug!("{}: {} token holdings", wallet.label(), balances.len());

    let history = chain.enhanced_history(&wallet.address, transaction_limit).await?;
    debug!("{}: {} recent transactions", wallet.label(), history.len());

    let buys = find_buys(&history, &balances, &wallet.address, criteria, now);
    debug!("{}: {} buys still held", wallet.label(), buys.len());

    let mut signals = Vec::new();
    for buy in &buys {
        if let Some(price) = prices.token_price(&buy.token_mint).await {
            if let Some(signal) = build_signal(buy, &price, wallet, criteria, now) {
                info!(
                    "{} {}: {:+.1}% | {}d old",
                    wallet.label(),
                    signal.token_symbol,
                    signal.pnl(),
                    signal.days_held
                );
                signals.push(signal);
            }
        }
        if !price_delay.is_zero() {
            tokio::time::sleep(price_delay).await;
        }
    }

    Ok(signals)
}

/// Result of scanning the whole list
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Sorted best PnL first
    pub signals: Vec<SignalRecord>,
    pub wallets_scanned: usize,
    pub wallets_failed: usize,
    /// Subset of `wallets_failed` that a retry will not fix
    pub permanent_failures: usize,
}

/// Scan every wallet, tolerating per-wallet failures
#[allow(clippy::too_many_arguments)]
pub async fn scan_all<C, P>(
    wallets: &[WalletRecord],
    chain: &C,
    prices: &P,
    criteria: &ScanCriteria,
    transaction_limit: u32,
    wallet_delay: Duration,
    price_delay: Duration,
    now: i64,
) -> ScanReport
where
    C: ChainSource + ?Sized,
    P: PriceSource + ?Sized,
{
    let mut report = ScanReport::default();

    for (i, wallet) in wallets.iter().enumerate() {
        info!("[{}/{}] Scanning {} ({}...)", i + 1, wallets.len(), wallet.label(), wallet.short_address());
        report.wallets_scanned += 1;

        match scan_wallet(wallet, chain, prices, criteria, transaction_limit, price_delay, now).await {
            Ok(signals) => report.signals.extend(signals),
            Err(e) if e.is_transient() => {
                warn!("Scan of {} failed: {}", wallet.label(), e);
                report.wallets_failed += 1;
            }
            Err(e) => {
                error!("Scan of {} failed permanently: {}", wallet.label(), e);
                report.wallets_failed += 1;
                report.permanent_failures += 1;
            }
        }

        if !wallet_delay.is_zero() {
            tokio::time::sleep(wallet_delay).await;
        }
    }

    sort_signals(&mut report.signals);
    report
}

/// Replace the signal file
pub fn save_signals(path: &Path, signals: &[SignalRecord]) -> Result<()> {
    write_json_atomic(path, signals)?;
    info!("Saved {} signals to {}", signals.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::rpc::{SignatureInfo, TokenTransfer};
    use async_trait::async_trait;

    const W: &str = "WalletAAA111";
    const NOW: i64 = 400 * 86_400_000;

    fn received(signature: &str, ts_secs: i64, mint: &str, amount: f64) -> EnhancedTransaction {
        EnhancedTransaction {
            signature: signature.to_string(),
            tx_type: Some("SWAP".to_string()),
            timestamp: Some(ts_secs),
            fee_payer: Some(W.to_string()),
            token_transfers: vec![TokenTransfer {
                from_user_account: Some("Pool".to_string()),
                to_user_account: Some(W.to_string()),
                mint: mint.to_string(),
                token_amount: amount,
            }],
            ..Default::default()
        }
    }

    fn balance(mint: &str, amount: f64) -> TokenBalance {
        TokenBalance {
            mint: mint.to_string(),
            amount,
            decimals: 6,
        }
    }

    fn price(change: f64, fdv: f64) -> TokenPrice {
        TokenPrice {
            price_usd: 0.0001,
            price_change_24h: change,
            market_cap: fdv,
            liquidity_usd: 10_000.0,
            pair_address: "Pair1".to_string(),
            symbol: "PUNCH".to_string(),
            name: "Punch".to_string(),
            volume_24h: 0.0,
        }
    }

    fn days_ago_secs(days: i64) -> i64 {
        (NOW - days * 86_400_000) / 1000
    }

    #[test]
    fn test_find_buys_filters_and_dedupes() {
        let history = vec![
            received("newer", days_ago_secs(2), "MintA", 3_000_000.0),
            received("older", days_ago_secs(5), "MintA", 4_000_000.0),
            received("too-old", days_ago_secs(366), "MintB", 9_000_000.0),
            received("sold-down", days_ago_secs(1), "MintC", 9_000_000.0),
            received("not-held", days_ago_secs(1), "MintD", 9_000_000.0),
        ];
        let balances = vec![
            balance("MintA", 7_000_000.0),
            balance("MintB", 9_000_000.0),
            balance("MintC", 1_000.0),
        ];

        let buys = find_buys(&history, &balances, W, &ScanCriteria::default(), NOW);
        assert_eq!(buys.len(), 1);
        assert_eq!(buys[0].token_mint, "MintA");
        assert_eq!(buys[0].tx_signature, "newer");
        assert_eq!(buys[0].current_balance, 7_000_000.0);
        assert_eq!(buys[0].buy_timestamp, days_ago_secs(2) * 1000);
    }

    #[test]
    fn test_pnl_history_is_linear() {
        let history = pnl_history(50.0, 3.2, 14);
        assert_eq!(history.len(), 5);
        assert_eq!(history[0], PnlPoint { day: 0, pnl: 0.0 });
        assert_eq!(history[2].pnl, 25.0);
        assert_eq!(history[4].pnl, 50.0);

        assert_eq!(pnl_history(10.0, 90.0, 14).len(), 15);
        assert_eq!(pnl_history(-7.5, 0.0, 14), vec![PnlPoint { day: 0, pnl: -7.5 }]);
    }

    #[test]
    fn test_build_signal() {
        let mut wallet = WalletRecord::new(W, "alpha_discovery", 0);
        wallet.display_id = "LEO-004".into();
        let buy = BuyCandidate {
            token_mint: "MintA".into(),
            buy_timestamp: NOW - 36 * 3_600_000,
            buy_amount: 3_000_000.0,
            current_balance: 7_000_000.0,
            tx_signature: "sig".into(),
        };
        let criteria = ScanCriteria::default();

        let signal = build_signal(&buy, &price(25.0, 25_000.0), &wallet, &criteria, NOW).unwrap();
        assert_eq!(signal.id, format!("{}-MintA", W));
        assert_eq!(signal.wallet_name, "LEO-004");
        assert_eq!(signal.action, "BUY");
        assert!((signal.entry_market_cap - 20_000.0).abs() < 1e-6);
        assert_eq!(signal.tier, "alpha");
        assert_eq!(signal.days_held, "1.5");
        assert_eq!(signal.axiom_link, "https://axiom.trade/meme/Pair1");
        assert_eq!(signal.pnl_history.len(), 3);

        assert!(build_signal(&buy, &price(-31.0, 25_000.0), &wallet, &criteria, NOW).is_none());

        let mut unpriced = price(5.0, 25_000.0);
        unpriced.price_usd = 0.0;
        assert!(build_signal(&buy, &unpriced, &wallet, &criteria, NOW).is_none());

        let capped = ScanCriteria { max_pnl_percent: Some(20.0), ..ScanCriteria::default() };
        assert!(build_signal(&buy, &price(25.0, 25_000.0), &wallet, &capped, NOW).is_none());

        let floorless = ScanCriteria { min_pnl_percent: -150.0, ..ScanCriteria::default() };
        assert!(build_signal(&buy, &price(-100.0, 25_000.0), &wallet, &floorless, NOW).is_none());
        assert!(build_signal(&buy, &price(-120.0, 25_000.0), &wallet, &floorless, NOW).is_none());
        let deep = build_signal(&buy, &price(-50.0, 25_000.0), &wallet, &floorless, NOW).unwrap();
        assert_eq!(deep.entry_market_cap, 50_000.0);

        let late = build_signal(&buy, &price(0.0, 500_000.0), &wallet, &criteria, NOW).unwrap();
        assert_eq!(late.tier, "late");
        assert_eq!(late.tier_name, "Early Entry");
    }

    struct Chain;

    #[async_trait]
    impl ChainSource for Chain {
        async fn signatures(&self, _address: &str, _limit: u32) -> Result<Vec<SignatureInfo>> {
            Ok(Vec::new())
        }

        async fn enhanced_history(&self, address: &str, _limit: u32) -> Result<Vec<EnhancedTransaction>> {
            match address {
                "broken" => Err(Error::Rpc("down".into())),
                "garbled" => Err(Error::Deserialization("unexpected body".into())),
                _ => Ok(vec![
                    received("s1", days_ago_secs(3), "Up", 6_000_000.0),
                    received("s2", days_ago_secs(1), "Flat", 6_000_000.0),
                    received("s3", days_ago_secs(1), "Unpriced", 6_000_000.0),
                ]),
            }
        }

        async fn token_balances(&self, _owner: &str) -> Result<Vec<TokenBalance>> {
            Ok(vec![
                balance("Up", 6_000_000.0),
                balance("Flat", 6_000_000.0),
                balance("Unpriced", 6_000_000.0),
            ])
        }
    }

    struct Prices;

    #[async_trait]
    impl PriceSource for Prices {
        async fn token_price(&self, mint: &str) -> Option<TokenPrice> {
            match mint {
                "Up" => Some(price(80.0, 90_000.0)),
                "Flat" => Some(price(1.0, 9_000.0)),
                _ => None,
            }
        }
    }

    #[tokio::test]
    async fn test_scan_all_sorts_and_tolerates_failures() {
        let mut good = WalletRecord::new(W, "alpha_discovery", 0);
        good.display_id = "LEO-001".into();
        let broken = WalletRecord::new("broken", "alpha_discovery", 0);

        let report = scan_all(
            &[broken, good],
            &Chain,
            &Prices,
            &ScanCriteria::default(),
            100,
            Duration::ZERO,
            Duration::ZERO,
            NOW,
        )
        .await;

        assert_eq!(report.wallets_scanned, 2);
        assert_eq!(report.wallets_failed, 1);
        assert_eq!(report.permanent_failures, 0);
        let mints: Vec<&str> = report.signals.iter().map(|s| s.token_mint.as_str()).collect();
        assert_eq!(mints, vec!["Up", "Flat"]);
        assert_eq!(report.signals[1].tier, "ultra");
    }

    #[tokio::test]
    async fn test_scan_all_separates_permanent_failures() {
        let wallets = [
            WalletRecord::new("broken", "alpha_discovery", 0),
            WalletRecord::new("garbled", "alpha_discovery", 0),
        ];

        let report = scan_all(
            &wallets,
            &Chain,
            &Prices,
            &ScanCriteria::default(),
            100,
            Duration::ZERO,
            Duration::ZERO,
            NOW,
        )
        .await;

        assert_eq!(report.wallets_failed, 2);
        assert_eq!(report.permanent_failures, 1);
        assert!(report.signals.is_empty());
    }

    #[test]
    fn test_save_signals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("public").join("signals.json");
        let signal = SignalRecord {
            id: "W-M".into(),
            price_change_24h: Some(3.0),
            ..Default::default()
        };
        save_signals(&path, &[signal.clone()]).unwrap();

        let loaded: Vec<SignalRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, vec![signal]);
    }
}
