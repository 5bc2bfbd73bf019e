// Price-discovery client for token pricing and market cap
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::PriceConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct PriceChange {
    pub h1: Option<f64>,
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Volume {
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BaseToken {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexPair {
    #[serde(rename = "chainId", default)]
    pub chain_id: String,
    #[serde(rename = "dexId", default)]
    pub dex_id: String,
    #[serde(rename = "pairAddress")]
    pub pair_address: String,
    #[serde(rename = "baseToken")]
    pub base_token: BaseToken,
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    #[serde(rename = "priceChange")]
    pub price_change: Option<PriceChange>,
    pub volume: Option<Volume>,
    pub liquidity: Option<Liquidity>,
    pub fdv: Option<f64>,
}

impl DexPair {
    fn liquidity_usd(&self) -> f64 {
        self.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenPairsResponse {
    pub pairs: Option<Vec<DexPair>>,
}

/// Current market view of a token, taken from its deepest pair
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPrice {
    pub price_usd: f64,
    pub price_change_24h: f64,
    /// Fully diluted valuation of the pair
    pub market_cap: f64,
    pub liquidity_usd: f64,
    pub pair_address: String,
    pub symbol: String,
    pub name: String,
    pub volume_24h: f64,
}

pub struct PriceClient {
    client: reqwest::Client,
    base_url: String,
}

impl PriceClient {
    pub fn new(config: &PriceConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(config.timeout_ms))
                .build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch all pairs trading `mint`
    pub async fn get_token_pairs(&self, mint: &str) -> Result<Vec<DexPair>> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, mint);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Price(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::Price(format!("{} returned {}", url, resp.status())));
        }

        let data: TokenPairsResponse = resp
            .json()
            .await
            .map_err(|e| Error::Price(format!("bad pairs response: {}", e)))?;
        Ok(data.pairs.unwrap_or_default())
    }

    /// Price of `mint` from its highest-liquidity pair; `None` on any failure
    pub async fn get_token_price(&self, mint: &str) -> Option<TokenPrice> {
        match self.get_token_pairs(mint).await {
            Ok(pairs) => {
                let price = best_pair(&pairs).map(to_token_price);
                if price.is_none() {
                    debug!("No pairs for {}", mint);
                }
                price
            }
            Err(e) => {
                debug!("Price lookup for {} failed: {}", mint, e);
                None
            }
        }
    }
}

/// Anything that can price a token
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn token_price(&self, mint: &str) -> Option<TokenPrice>;
}

#[async_trait]
impl PriceSource for PriceClient {
    async fn token_price(&self, mint: &str) -> Option<TokenPrice> {
        self.get_token_price(mint).await
    }
}

/// Pair with the deepest USD liquidity; missing liquidity counts as zero
pub fn best_pair(pairs: &[DexPair]) -> Option<&DexPair> {
    pairs.iter().fold(None, |best: Option<&DexPair>, pair| match best {
        Some(b) if b.liquidity_usd() >= pair.liquidity_usd() => Some(b),
        _ => Some(pair),
    })
}

fn to_token_price(pair: &DexPair) -> TokenPrice {
    TokenPrice {
        price_usd: pair
            .price_usd
            .as_ref()
            .and_then(|p| p.parse::<f64>().ok())
            .unwrap_or(0.0),
        price_change_24h: pair
            .price_change
            .as_ref()
            .and_then(|pc| pc.h24)
            .unwrap_or(0.0),
        market_cap: pair.fdv.unwrap_or(0.0),
        liquidity_usd: pair.liquidity_usd(),
        pair_address: pair.pair_address.clone(),
        symbol: pair
            .base_token
            .symbol
            .clone()
            .unwrap_or_else(|| "UNKNOWN".to_string()),
        name: pair
            .base_token
            .name
            .clone()
            .unwrap_or_else(|| "Unknown".to_string()),
        volume_24h: pair.volume.as_ref().and_then(|v| v.h24).unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs() -> Vec<DexPair> {
        let body = serde_json::json!({
            "pairs": [
                {
                    "chainId": "solana", "dexId": "raydium", "pairAddress": "P1",
                    "baseToken": { "address": "M", "symbol": "PUNCH", "name": "Punch" },
                    "priceUsd": "0.00012", "priceChange": { "h24": 12.5 },
                    "liquidity": { "usd": 8000.0 }, "fdv": 120000.0, "volume": { "h24": 5000.0 }
                },
                {
                    "chainId": "solana", "dexId": "pumpswap", "pairAddress": "P2",
                    "baseToken": { "address": "M", "symbol": "PUNCH" },
                    "priceUsd": "0.00013", "priceChange": { "h24": 20.0 },
                    "liquidity": { "usd": 25000.0 }, "fdv": 130000.0
                },
                {
                    "chainId": "solana", "dexId": "meteora", "pairAddress": "P3",
                    "baseToken": { "address": "M" }
                }
            ]
        });
        serde_json::from_value::<TokenPairsResponse>(body)
            .unwrap()
            .pairs
            .unwrap()
    }

    #[test]
    fn test_best_pair_by_liquidity() {
        let pairs = pairs();
        assert_eq!(best_pair(&pairs).unwrap().pair_address, "P2");
        assert!(best_pair(&[]).is_none());
    }

    #[test]
    fn test_token_price_fields() {
        let pairs = pairs();
        let price = to_token_price(best_pair(&pairs).unwrap());
        assert_eq!(price.market_cap, 130000.0);
        assert_eq!(price.price_change_24h, 20.0);
        assert_eq!(price.symbol, "PUNCH");
        assert_eq!(price.name, "Unknown");
        assert_eq!(price.volume_24h, 0.0);

        let bare = to_token_price(&pairs[2]);
        assert_eq!(bare.symbol, "UNKNOWN");
        assert_eq!(bare.price_usd, 0.0);
    }

    #[test]
    fn test_no_pairs_response() {
        let data: TokenPairsResponse = serde_json::from_str(r#"{"schemaVersion":"1.0.0","pairs":null}"#).unwrap();
        assert!(data.pairs.is_none());
    }
}
