//! Discovery source loading
//!
//! Each discovery pipeline writes its own JSON layout. A [`SourceSpec`] names
//! the file, its layout and the value to fall back to; loading never fails,
//! it warns and uses the fallback instead.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::types::{Candidate, TierInfo, DEFAULT_SCORE};

pub const ALPHA_DISCOVERY: &str = "alpha_discovery";
pub const MILLIONAIRE_SCAN: &str = "millionaire_scan";
pub const TOP_TRADER: &str = "punch_top_trader";
pub const IMPORTED: &str = "imported";

/// Layout of a discovery file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceShape {
    /// `{ "alphaWallets": [{ wallet, alphaScore, tokenHits }] }`
    AlphaDiscovery,
    /// `{ "qualified_wallets": [{ wallet, tokenDiversity, totalTrades }] }`
    MillionaireScan,
    /// `{ "wallets": [{ address, source, note, imported_at }] }`
    ImportedWallets,
    /// `[{ address, trades, score? }]`
    TraderList,
}

impl SourceShape {
    /// Empty document of this layout
    pub fn empty_value(&self) -> Value {
        match self {
            SourceShape::AlphaDiscovery => json!({ "alphaWallets": [] }),
            SourceShape::MillionaireScan => json!({ "qualified_wallets": [] }),
            SourceShape::ImportedWallets => json!({ "wallets": [] }),
            SourceShape::TraderList => json!([]),
        }
    }

    fn entries<'a>(&self, value: &'a Value) -> &'a [Value] {
        let list = match self {
            SourceShape::AlphaDiscovery => value.get("alphaWallets"),
            SourceShape::MillionaireScan => value.get("qualified_wallets"),
            SourceShape::ImportedWallets => value.get("wallets"),
            SourceShape::TraderList => Some(value),
        };
        list.and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// One discovery input: where it lives, how it looks, what to use if absent
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub path: PathBuf,
    pub shape: SourceShape,
    pub source_tag: String,
    pub fallback: Value,
}

impl SourceSpec {
    pub fn new(path: impl Into<PathBuf>, shape: SourceShape, source_tag: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            shape,
            source_tag: source_tag.into(),
            fallback: shape.empty_value(),
        }
    }

    /// Read and normalize this source
    pub fn load(&self) -> Vec<Candidate> {
        let value = load_json_or(&self.path, self.fallback.clone());
        let candidates = normalize(self.shape, &self.source_tag, &value);
        info!(
            "Loaded {} candidate(s) from {} ({})",
            candidates.len(),
            self.path.display(),
            self.source_tag
        );
        candidates
    }
}

/// Load every source in order, one candidate list per source
pub fn load_sources(specs: &[SourceSpec]) -> Vec<Vec<Candidate>> {
    specs.iter().map(SourceSpec::load).collect()
}

/// Parse a JSON file, returning `fallback` on a missing file or any error
pub fn load_json_or<T: DeserializeOwned>(path: &Path, fallback: T) -> T {
    if !path.exists() {
        warn!("{} not found, using empty fallback", path.display());
        return fallback;
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            return fallback;
        }
    };

    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to parse {}: {}", path.display(), e);
            fallback
        }
    }
}

/// Convert a source document into candidates
///
/// Entries without an address are kept (with `address: None`) so the
/// reconciler can count them as skipped.
pub fn normalize(shape: SourceShape, source_tag: &str, value: &Value) -> Vec<Candidate> {
    let entries = shape.entries(value);
    if entries.is_empty() {
        debug!("Source {} has no entries", source_tag);
    }

    entries
        .iter()
        .map(|entry| match shape {
            SourceShape::AlphaDiscovery => alpha_candidate(entry, source_tag),
            SourceShape::MillionaireScan => millionaire_candidate(entry, source_tag),
            SourceShape::ImportedWallets => imported_candidate(entry, source_tag),
            SourceShape::TraderList => trader_candidate(entry, source_tag),
        })
        .collect()
}

/// Sources disagree on the address field name
fn address_of(entry: &Value) -> Option<String> {
    entry
        .get("wallet")
        .or_else(|| entry.get("address"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn number(entry: &Value, field: &str) -> Option<f64> {
    entry.get(field).and_then(Value::as_f64)
}

fn count(entry: &Value, field: &str) -> Option<u64> {
    number(entry, field).map(|n| n.max(0.0) as u64)
}

fn alpha_candidate(entry: &Value, source_tag: &str) -> Candidate {
    let score = number(entry, "alphaScore").unwrap_or(DEFAULT_SCORE);
    let hits = count(entry, "tokenHits").unwrap_or(0);

    Candidate {
        address: address_of(entry),
        score: Some(score),
        note: format!("Alpha score: {:.1}, {} token hits", score, hits),
        source_tag: source_tag.to_string(),
        tier: Some(TierInfo::alpha()),
        ..Default::default()
    }
}

fn millionaire_candidate(entry: &Value, source_tag: &str) -> Candidate {
    let diversity = count(entry, "tokenDiversity");
    let trades = count(entry, "totalTrades");

    Candidate {
        address: address_of(entry),
        score: Some(DEFAULT_SCORE),
        note: format!(
            "{} token diversity, {} trades",
            diversity.unwrap_or(0),
            trades.unwrap_or(0)
        ),
        source_tag: source_tag.to_string(),
        tier: Some(TierInfo::alpha()),
        total_trades: trades,
        token_diversity: diversity,
        ..Default::default()
    }
}

fn imported_candidate(entry: &Value, source_tag: &str) -> Candidate {
    let first_seen = entry
        .get("imported_at")
        .and_then(Value::as_str)
        .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.timestamp_millis());

    Candidate {
        address: address_of(entry),
        score: Some(DEFAULT_SCORE),
        note: entry
            .get("note")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        source_tag: entry
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or(source_tag)
            .to_string(),
        first_seen,
        ..Default::default()
    }
}

fn trader_candidate(entry: &Value, source_tag: &str) -> Candidate {
    let trades = count(entry, "trades").unwrap_or(0);
    // Activity-based score when the export carries none
    let score = number(entry, "score")
        .unwrap_or_else(|| (60.0 + trades as f64 / 2.0).min(100.0).round());

    Candidate {
        address: address_of(entry),
        score: Some(score),
        note: format!("Top trader ({} trades)", trades),
        source_tag: source_tag.to_string(),
        tier: Some(TierInfo::alpha()),
        ..Default::default()
    }
}

/// Address → tier lookup from `{ "wallets_found": [{ wallet, tier, tierName, tierEmoji }] }`
pub fn load_tier_lookup(path: &Path) -> HashMap<String, TierInfo> {
    let value = load_json_or(path, json!({ "wallets_found": [] }));
    let entries = value
        .get("wallets_found")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    entries
        .into_iter()
        .filter_map(|entry| {
            let address = address_of(&entry)?;
            let tier: TierInfo = serde_json::from_value(entry).ok()?;
            Some((address, tier))
        })
        .collect()
}

/// Fill in tiers from a lookup for candidates that carry none
pub fn apply_tier_lookup(candidates: &mut [Candidate], lookup: &HashMap<String, TierInfo>) {
    for candidate in candidates.iter_mut().filter(|c| c.tier.is_none()) {
        if let Some(tier) = candidate.valid_address().and_then(|a| lookup.get(a)) {
            candidate.tier = Some(tier.clone());
        }
    }
}
