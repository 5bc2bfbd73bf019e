//! Signal file types

use serde::{Deserialize, Serialize};

/// Classification by entry market cap (USD)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalTier {
    Ultra,
    Alpha,
    Early,
    Late,
}

impl SignalTier {
    pub fn from_entry_market_cap(entry_market_cap: f64) -> Self {
        if entry_market_cap < 10_000.0 {
            SignalTier::Ultra
        } else if entry_market_cap < 30_000.0 {
            SignalTier::Alpha
        } else if entry_market_cap < 100_000.0 {
            SignalTier::Early
        } else {
            SignalTier::Late
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            SignalTier::Ultra => "ultra",
            SignalTier::Alpha => "alpha",
            SignalTier::Early => "early",
            SignalTier::Late => "late",
        }
    }

    /// Late entries display with the early labels
    pub fn name(&self) -> &'static str {
        match self {
            SignalTier::Ultra => "Ultra Alpha",
            SignalTier::Alpha => "Alpha",
            SignalTier::Early | SignalTier::Late => "Early Entry",
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            SignalTier::Ultra => "🔥",
            SignalTier::Alpha => "⚡",
            SignalTier::Early | SignalTier::Late => "💎",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlPoint {
    pub day: u32,
    pub pnl: f64,
}

/// A wallet's open position in one token
///
/// Identified by `{walletAddress}-{tokenMint}`. Fields other than `id`
/// default so that hand-edited or older signal files still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRecord {
    pub id: String,
    /// Buy time, ms
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub wallet_address: String,
    #[serde(default)]
    pub wallet_name: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub token_mint: String,
    #[serde(default)]
    pub token_symbol: String,
    /// Tokens received by the buy
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub current_balance: f64,
    #[serde(default)]
    pub price_change_24h: Option<f64>,
    #[serde(default)]
    pub entry_market_cap: f64,
    #[serde(default)]
    pub current_market_cap: f64,
    #[serde(default)]
    pub pair_address: String,
    #[serde(default)]
    pub tx_signature: String,
    #[serde(default)]
    pub axiom_link: String,
    /// Days, one decimal
    #[serde(default)]
    pub days_held: String,
    #[serde(default)]
    pub pnl_history: Vec<PnlPoint>,
    #[serde(default)]
    pub tier: String,
    #[serde(default)]
    pub tier_name: String,
    #[serde(default)]
    pub tier_emoji: String,
}

impl SignalRecord {
    pub fn make_id(wallet: &str, mint: &str) -> String {
        format!("{}-{}", wallet, mint)
    }

    /// PnL used for ranking
    pub fn pnl(&self) -> f64 {
        self.price_change_24h.unwrap_or(0.0)
    }
}
