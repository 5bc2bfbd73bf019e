//! Token holder and trader discovery
//!
//! Finds who holds and who actively trades a token, reports overlap with
//! the tracked list, and exports the most active untracked traders for
//! `import`.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::price::{PriceSource, TokenPrice};
use crate::rpc::ChainSource;
use crate::wallet::store::write_json_atomic;

#[derive(Debug, Clone, PartialEq)]
pub struct Holder {
    pub owner: String,
    pub balance: f64,
}

/// Wire shape of the trader export file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderActivity {
    pub address: String,
    pub trades: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Holder,
    Trader,
    Both,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchKind::Holder => write!(f, "HOLDER"),
            MatchKind::Trader => write!(f, "TRADER"),
            MatchKind::Both => write!(f, "HOLDER + TRADER"),
        }
    }
}

/// Limits for one discovery run
#[derive(Debug, Clone)]
pub struct DiscoveryLimits {
    pub max_holder_accounts: usize,
    pub signature_limit: u32,
    pub max_transactions: usize,
    pub top_traders: usize,
    pub export_count: usize,
    pub holder_delay: Duration,
    pub trader_delay: Duration,
}

impl DiscoveryLimits {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            max_holder_accounts: config.holders.max_holder_accounts,
            signature_limit: config.holders.signature_limit,
            max_transactions: config.holders.max_transactions,
            top_traders: config.holders.top_traders,
            export_count: config.holders.export_count,
            holder_delay: Duration::from_millis(config.rate_limit.holder_lookup_delay_ms),
            trader_delay: Duration::from_millis(config.rate_limit.trader_lookup_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HolderReport {
    pub token: Option<TokenPrice>,
    pub holders: Vec<Holder>,
    /// Most active first
    pub traders: Vec<TraderActivity>,
    /// Tracked wallets found among holders or traders
    pub matches: Vec<(String, MatchKind)>,
    /// Untracked traders to hand to `import`
    pub export: Vec<TraderActivity>,
}

/// Owners of the largest token accounts
pub async fn fetch_holders<C: ChainSource + ?Sized>(
    chain: &C,
    mint: &str,
    max_accounts: usize,
    delay: Duration,
) -> Vec<Holder> {
    let accounts = match chain.largest_accounts(mint).await {
        Ok(accounts) => accounts,
        Err(e) => {
            warn!("Failed to fetch holders: {}", e);
            return Vec::new();
        }
    };
    info!("Found {} holder accounts", accounts.len());

    let mut holders = Vec::new();
    for account in accounts.iter().take(max_accounts) {
        match chain.account_owner(&account.address).await {
            Ok(Some(owner)) => holders.push(Holder {
                owner,
                balance: account.ui_amount.unwrap_or(0.0),
            }),
            Ok(None) => debug!("No owner for {}", account.address),
            Err(e) => warn!("Failed to get owner for {}: {}", account.address, e),
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    holders
}

/// Count transaction signers over the token's recent signatures
pub async fn fetch_traders<C: ChainSource + ?Sized>(
    chain: &C,
    mint: &str,
    signature_limit: u32,
    max_transactions: usize,
    top: usize,
    delay: Duration,
) -> Vec<TraderActivity> {
    let signatures = match chain.signatures(mint, signature_limit).await {
        Ok(signatures) => signatures,
        Err(e) => {
            warn!("Failed to fetch traders: {}", e);
            return Vec::new();
        }
    };
    info!("Found {} recent transactions", signatures.len());

    let mut counts: HashMap<String, u64> = HashMap::new();
    for sig in signatures.iter().take(max_transactions) {
        match chain.transaction(&sig.signature).await {
            Ok(Some(tx)) => {
                if let Some(signer) = tx.signer() {
                    *counts.entry(signer.to_string()).or_default() += 1;
                }
            }
            Ok(None) => {}
            Err(e) => debug!("Skipping {}: {}", sig.signature, e),
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    rank_traders(counts, top)
}

/// Most active first; ties broken by address
pub fn rank_traders(counts: HashMap<String, u64>, top: usize) -> Vec<TraderActivity> {
    let mut traders: Vec<TraderActivity> = counts
        .into_iter()
        .map(|(address, trades)| TraderActivity { address, trades })
        .collect();
    traders.sort_by(|a, b| b.trades.cmp(&a.trades).then_with(|| a.address.cmp(&b.address)));
    traders.truncate(top);
    traders
}

/// Tracked addresses among holders and traders, holders first
pub fn match_tracked(
    holders: &[Holder],
    traders: &[TraderActivity],
    tracked: &HashSet<String>,
) -> Vec<(String, MatchKind)> {
    let holder_set: HashSet<&str> = holders.iter().map(|h| h.owner.as_str()).collect();
    let trader_set: HashSet<&str> = traders.iter().map(|t| t.address.as_str()).collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut matches = Vec::new();
    let candidates = holders
        .iter()
        .map(|h| h.owner.as_str())
        .chain(traders.iter().map(|t| t.address.as_str()));

    for address in candidates {
        if !seen.insert(address) || !tracked.contains(address) {
            continue;
        }
        let kind = match (holder_set.contains(address), trader_set.contains(address)) {
            (true, true) => MatchKind::Both,
            (true, false) => MatchKind::Holder,
            _ => MatchKind::Trader,
        };
        matches.push((address.to_string(), kind));
    }
    matches
}

/// Top `count` traders not already tracked
pub fn untracked_traders(
    traders: &[TraderActivity],
    tracked: &HashSet<String>,
    count: usize,
) -> Vec<TraderActivity> {
    traders
        .iter()
        .filter(|t| !tracked.contains(&t.address))
        .take(count)
        .cloned()
        .collect()
}

/// Full discovery run; stops early when the token cannot be priced
pub async fn discover<C, P>(
    chain: &C,
    prices: &P,
    mint: &str,
    tracked: &HashSet<String>,
    limits: &DiscoveryLimits,
) -> HolderReport
where
    C: ChainSource + ?Sized,
    P: PriceSource + ?Sized,
{
    let mut report = HolderReport {
        token: prices.token_price(mint).await,
        ..Default::default()
    };
    if report.token.is_none() {
        warn!("Failed to fetch token info for {}", mint);
        return report;
    }

    report.holders = fetch_holders(chain, mint, limits.max_holder_accounts, limits.holder_delay).await;
    info!("Retrieved {} top holders", report.holders.len());

    report.traders = fetch_traders(
        chain,
        mint,
        limits.signature_limit,
        limits.max_transactions,
        limits.top_traders,
        limits.trader_delay,
    )
    .await;
    info!("Retrieved {} top traders", report.traders.len());

    report.matches = match_tracked(&report.holders, &report.traders, tracked);
    report.export = untracked_traders(&report.traders, tracked, limits.export_count);
    report
}

/// Write the trader export consumed by `import`
pub fn export_traders(path: &Path, traders: &[TraderActivity]) -> Result<()> {
    write_json_atomic(path, traders)?;
    info!("Exported {} traders to {}", traders.len(), path.display());
    Ok(())
}
