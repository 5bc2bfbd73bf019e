//! Core types for the canonical wallet list
//!
//! Field names on the wire follow the front-end's `wallets.json` layout:
//! camelCase statistics, `leoName` for the display id, and the snake_case
//! `first_seen` / `updated_at` timestamps (milliseconds since epoch).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Score given to candidates whose source carries none
pub const DEFAULT_SCORE: f64 = 50.0;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Display classification attached to a wallet record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierInfo {
    #[serde(rename = "tier", default = "default_tier_id")]
    pub id: String,
    #[serde(rename = "tierName", default = "default_tier_name")]
    pub name: String,
    #[serde(rename = "tierEmoji", default = "default_tier_glyph")]
    pub glyph: String,
}

fn default_tier_id() -> String {
    "unknown".to_string()
}

fn default_tier_name() -> String {
    "Unknown".to_string()
}

fn default_tier_glyph() -> String {
    "❓".to_string()
}

impl TierInfo {
    pub fn new(id: &str, name: &str, glyph: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            glyph: glyph.to_string(),
        }
    }

    /// Tier for records no source classified
    pub fn unknown() -> Self {
        Self::new("unknown", "Unknown", "❓")
    }

    /// Tier the discovery pipelines assign
    pub fn alpha() -> Self {
        Self::new("alpha", "Alpha", "⚡")
    }

    pub fn is_unknown(&self) -> bool {
        self.id == "unknown"
    }
}

impl Default for TierInfo {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Mutable trading statistics bundle
///
/// Only enrichment passes write these; reconciliation carries them forward.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletStats {
    #[serde(default)]
    pub total_trades: u64,
    #[serde(default)]
    pub profitable_trades: u64,
    /// Percentage, 0..=100
    #[serde(default)]
    pub profit_rate: f64,
    #[serde(default)]
    pub total_pnl: f64,
    /// Largest single realized gain
    #[serde(default)]
    pub highest_trade: f64,
    /// Minutes
    #[serde(default)]
    pub avg_hold_time: f64,
    #[serde(default)]
    pub token_diversity: u64,
    /// Milliseconds since epoch, 0 when never observed
    #[serde(default)]
    pub last_activity: i64,
    #[serde(default)]
    pub days_since_active: f64,
}

impl WalletStats {
    /// Recompute `days_since_active` from `last_activity`
    pub fn touch_activity(&mut self, last_activity: i64, now: i64) {
        self.last_activity = last_activity;
        self.days_since_active = days_since_active(last_activity, now);
    }
}

/// Days elapsed between `last_activity` and `now`, never negative
pub fn days_since_active(last_activity: i64, now: i64) -> f64 {
    ((now - last_activity) as f64 / MS_PER_DAY).max(0.0)
}

/// One entry of the canonical wallet list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletRecord {
    /// Unique key within the list
    pub address: String,

    /// `PREFIX-NNN`, assigned by list position
    #[serde(rename = "leoName", alias = "displayId", default)]
    pub display_id: String,

    #[serde(flatten)]
    pub tier: TierInfo,

    #[serde(default)]
    pub score: f64,

    #[serde(flatten)]
    pub stats: WalletStats,

    /// Set once when the record enters the list
    #[serde(default)]
    pub first_seen: i64,

    /// Advanced by every merge or enrichment touching the record
    #[serde(default)]
    pub updated_at: i64,

    /// Discovery pipeline that produced the record
    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub note: String,

    /// Fields this crate does not model, written back untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WalletRecord {
    /// Create a record with zeroed statistics
    pub fn new(address: impl Into<String>, source: impl Into<String>, now: i64) -> Self {
        Self {
            address: address.into(),
            display_id: String::new(),
            tier: TierInfo::unknown(),
            score: DEFAULT_SCORE,
            stats: WalletStats::default(),
            first_seen: now,
            updated_at: now,
            source: source.into(),
            note: String::new(),
            extra: Map::new(),
        }
    }

    /// First eight characters of the address, for log lines
    pub fn short_address(&self) -> &str {
        short(&self.address)
    }

    /// Display id, or the short address for records not yet numbered
    pub fn label(&self) -> &str {
        if self.display_id.is_empty() {
            self.short_address()
        } else {
            &self.display_id
        }
    }
}

/// Truncate an address for display
pub fn short(address: &str) -> &str {
    match address.char_indices().nth(8) {
        Some((idx, _)) => &address[..idx],
        None => address,
    }
}

/// A not-yet-merged wallet observation from one discovery source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    /// `None` when the source entry carried no usable address
    pub address: Option<String>,
    pub score: Option<f64>,
    pub note: String,
    pub source_tag: String,
    pub tier: Option<TierInfo>,
    /// Overrides `now` as the record's first-seen time when present
    pub first_seen: Option<i64>,
    /// Statistics the source already knows; seed new records only
    pub total_trades: Option<u64>,
    pub token_diversity: Option<u64>,
}

impl Candidate {
    pub fn new(address: impl Into<String>, source_tag: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            source_tag: source_tag.into(),
            ..Default::default()
        }
    }

    /// Trimmed address, `None` when missing or blank
    pub fn valid_address(&self) -> Option<&str> {
        self.address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }

    /// Build the record this candidate creates when its address is new
    pub fn to_record(&self, address: &str, now: i64) -> WalletRecord {
        let mut record = WalletRecord::new(address, self.source_tag.clone(), now);
        record.tier = self.tier.clone().unwrap_or_default();
        record.score = self.score.unwrap_or(DEFAULT_SCORE);
        record.note = self.note.clone();
        record.first_seen = self.first_seen.unwrap_or(now);
        if let Some(trades) = self.total_trades {
            record.stats.total_trades = trades;
        }
        if let Some(diversity) = self.token_diversity {
            record.stats.token_diversity = diversity;
        }
        record
    }
}
