//! Upstream RPC client
//!
//! Wraps the JSON-RPC endpoint and the enhanced-history REST API:
//! - recent signatures and parsed transactions for a wallet
//! - token balances held by a wallet
//! - largest holders of a mint and their owners
//! - enhanced (typed) transaction history
//!
//! Every call is one request. Batch loops never abort on a failed call;
//! they use [`Error::is_transient`] to tell retryable failures from
//! permanent ones when counting and logging them.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::RpcConfig;
use crate::error::{Error, Result};

/// SPL token program, used to list a wallet's token accounts
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Largest page the enhanced-history API returns
const ENHANCED_PAGE_SIZE: u32 = 100;

/// JSON-RPC and REST client for the chain data provider
pub struct RpcClient {
    client: Client,
    rpc_url: String,
    rest_base_url: String,
    api_key: String,
    timeout_ms: u64,
}

impl RpcClient {
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            rpc_url: build_rpc_url(&config.endpoint, &config.api_key)?,
            rest_base_url: config.rest_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_ms: config.timeout_ms,
        })
    }

    /// Recent signatures for `address`, newest first
    pub async fn get_signatures_for_address(
        &self,
        address: &str,
        limit: u32,
    ) -> Result<Vec<SignatureInfo>> {
        debug!("getSignaturesForAddress {} (limit {})", address, limit);
        let result: Option<Vec<SignatureInfo>> = self
            .call(
                "getSignaturesForAddress",
                json!([address, { "limit": limit }]),
            )
            .await?;
        Ok(result.unwrap_or_default())
    }

    /// Parsed transaction, `None` when the node does not know it
    pub async fn get_transaction(&self, signature: &str) -> Result<Option<ParsedTransaction>> {
        debug!("getTransaction {}", signature);
        self.call(
            "getTransaction",
            json!([
                signature,
                { "encoding": "jsonParsed", "maxSupportedTransactionVersion": 0 }
            ]),
        )
        .await
    }

    /// Non-zero token balances owned by `owner`
    pub async fn get_token_accounts_by_owner(&self, owner: &str) -> Result<Vec<TokenBalance>> {
        debug!("getTokenAccountsByOwner {}", owner);
        let result: Option<RpcValue<Vec<KeyedTokenAccount>>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner,
                    { "programId": TOKEN_PROGRAM_ID },
                    { "encoding": "jsonParsed" }
                ]),
            )
            .await?;
        Ok(result.map(|r| token_balances(r.value)).unwrap_or_default())
    }

    /// Largest token accounts of `mint`
    pub async fn get_token_largest_accounts(&self, mint: &str) -> Result<Vec<LargestAccount>> {
        debug!("getTokenLargestAccounts {}", mint);
        let result: Option<RpcValue<Vec<LargestAccount>>> = self
            .call("getTokenLargestAccounts", json!([mint]))
            .await?;
        Ok(result.map(|r| r.value).unwrap_or_default())
    }

    /// Wallet that owns a token account
    pub async fn get_account_owner(&self, token_account: &str) -> Result<Option<String>> {
        debug!("getAccountInfo {}", token_account);
        let result: Option<RpcValue<Option<Value>>> = self
            .call(
                "getAccountInfo",
                json!([token_account, { "encoding": "jsonParsed" }]),
            )
            .await?;
        Ok(result.and_then(|r| r.value).and_then(|v| parsed_owner(&v)))
    }

    /// Enhanced history for `address`, newest first, paging until `limit`
    pub async fn get_enhanced_transactions(
        &self,
        address: &str,
        limit: u32,
    ) -> Result<Vec<EnhancedTransaction>> {
        let mut collected: Vec<EnhancedTransaction> = Vec::new();
        let mut before: Option<String> = None;

        while (collected.len() as u32) < limit {
            let page_size = (limit - collected.len() as u32).min(ENHANCED_PAGE_SIZE);
            let url = self.enhanced_url(address, page_size, before.as_deref())?;
            debug!("Fetching enhanced history for {} ({} tx)", address, page_size);

            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Rpc(format!("History API error {}: {}", status, body)));
            }

            let page: Vec<EnhancedTransaction> = response
                .json()
                .await
                .map_err(|e| Error::Deserialization(format!("History response: {}", e)))?;

            let last_page = (page.len() as u32) < page_size;
            before = page.last().map(|tx| tx.signature.clone());
            collected.extend(page);

            if last_page || before.is_none() {
                break;
            }
        }

        Ok(collected)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Rpc(format!("{} returned {}: {}", method, status, body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("{} response: {}", method, e)))?;

        parse_rpc_response(method, body)
    }

    fn enhanced_url(&self, address: &str, limit: u32, before: Option<&str>) -> Result<Url> {
        let base = format!("{}/v0/addresses/{}/transactions", self.rest_base_url, address);
        let mut url = Url::parse(&base).map_err(|e| Error::Config(format!("{}: {}", base, e)))?;
        {
            let mut query = url.query_pairs_mut();
            if !self.api_key.is_empty() {
                query.append_pair("api-key", &self.api_key);
            }
            query.append_pair("limit", &limit.to_string());
            if let Some(before) = before {
                query.append_pair("before", before);
            }
        }
        Ok(url)
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::RpcTimeout(self.timeout_ms)
        } else {
            Error::from(e)
        }
    }
}

/// Read access to chain data
///
/// Passes are written against this trait so they can run on canned data.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn signatures(&self, address: &str, limit: u32) -> Result<Vec<SignatureInfo>>;

    async fn enhanced_history(&self, address: &str, limit: u32) -> Result<Vec<EnhancedTransaction>>;

    async fn token_balances(&self, _owner: &str) -> Result<Vec<TokenBalance>> {
        Ok(Vec::new())
    }

    async fn largest_accounts(&self, _mint: &str) -> Result<Vec<LargestAccount>> {
        Ok(Vec::new())
    }

    async fn account_owner(&self, _token_account: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn transaction(&self, _signature: &str) -> Result<Option<ParsedTransaction>> {
        Ok(None)
    }
}

#[async_trait]
impl ChainSource for RpcClient {
    async fn signatures(&self, address: &str, limit: u32) -> Result<Vec<SignatureInfo>> {
        self.get_signatures_for_address(address, limit).await
    }

    async fn enhanced_history(&self, address: &str, limit: u32) -> Result<Vec<EnhancedTransaction>> {
        self.get_enhanced_transactions(address, limit).await
    }

    async fn token_balances(&self, owner: &str) -> Result<Vec<TokenBalance>> {
        self.get_token_accounts_by_owner(owner).await
    }

    async fn largest_accounts(&self, mint: &str) -> Result<Vec<LargestAccount>> {
        self.get_token_largest_accounts(mint).await
    }

    async fn account_owner(&self, token_account: &str) -> Result<Option<String>> {
        self.get_account_owner(token_account).await
    }

    async fn transaction(&self, signature: &str) -> Result<Option<ParsedTransaction>> {
        self.get_transaction(signature).await
    }
}

/// Append the API key to the JSON-RPC endpoint
fn build_rpc_url(endpoint: &str, api_key: &str) -> Result<String> {
    let mut url =
        Url::parse(endpoint).map_err(|e| Error::Config(format!("rpc endpoint {}: {}", endpoint, e)))?;
    if !api_key.is_empty() && !url.query_pairs().any(|(k, _)| k == "api-key") {
        url.query_pairs_mut().append_pair("api-key", api_key);
    }
    Ok(url.to_string())
}

/// Unwrap a JSON-RPC envelope; a `null` result is `None`
fn parse_rpc_response<T: DeserializeOwned>(method: &str, body: Value) -> Result<Option<T>> {
    let envelope: RpcResponse<T> = serde_json::from_value(body)
        .map_err(|e| Error::Deserialization(format!("{} response: {}", method, e)))?;

    if let Some(error) = envelope.error {
        return Err(Error::Rpc(format!(
            "{} failed ({}): {}",
            method, error.code, error.message
        )));
    }

    Ok(envelope.result)
}

fn token_balances(accounts: Vec<KeyedTokenAccount>) -> Vec<TokenBalance> {
    accounts
        .into_iter()
        .filter_map(|keyed| {
            let info = keyed.account.data.parsed?.info;
            let amount = info.token_amount.ui_amount.unwrap_or(0.0);
            if amount <= 0.0 {
                return None;
            }
            Some(TokenBalance {
                mint: info.mint,
                amount,
                decimals: info.token_amount.decimals,
            })
        })
        .collect()
}

fn parsed_owner(account: &Value) -> Option<String> {
    account
        .pointer("/data/parsed/info/owner")
        .and_then(Value::as_str)
        .map(str::to_string)
}

// ============ Public response types ============

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    #[serde(default)]
    pub slot: u64,
    /// Unix seconds
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub err: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTransaction {
    #[serde(default)]
    pub block_time: Option<i64>,
    pub transaction: TransactionBody,
}

impl ParsedTransaction {
    /// Fee payer, the first account key
    pub fn signer(&self) -> Option<&str> {
        self.transaction.message.account_keys.first().map(AccountKey::pubkey)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionBody {
    pub message: TransactionMessage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMessage {
    #[serde(default)]
    pub account_keys: Vec<AccountKey>,
}

/// Account key as returned by `json` (plain) or `jsonParsed` (object) encodings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AccountKey {
    Parsed { pubkey: String },
    Plain(String),
}

impl AccountKey {
    pub fn pubkey(&self) -> &str {
        match self {
            AccountKey::Parsed { pubkey } => pubkey,
            AccountKey::Plain(key) => key,
        }
    }
}

/// A token the wallet currently holds
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBalance {
    pub mint: String,
    /// UI amount (decimals applied)
    pub amount: f64,
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LargestAccount {
    /// Token account address, not the owner wallet
    pub address: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub ui_amount: Option<f64>,
    #[serde(default)]
    pub decimals: u8,
}

/// One entry of the enhanced-history API
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedTransaction {
    pub signature: String,
    #[serde(rename = "type", default)]
    pub tx_type: Option<String>,
    /// Unix seconds
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub fee_payer: Option<String>,
    #[serde(default)]
    pub native_transfers: Vec<NativeTransfer>,
    #[serde(default)]
    pub token_transfers: Vec<TokenTransfer>,
}

impl EnhancedTransaction {
    pub fn is_swap(&self) -> bool {
        self.tx_type
            .as_deref()
            .map(|t| t.contains("SWAP") || t.contains("BUY") || t.contains("SELL"))
            .unwrap_or(false)
    }

    /// Block time in ms
    pub fn timestamp_ms(&self) -> Option<i64> {
        self.timestamp.map(|ts| ts * 1000)
    }

    /// Net lamports moved into (positive) or out of (negative) `wallet`
    pub fn net_lamports(&self, wallet: &str) -> i128 {
        self.native_transfers.iter().fold(0i128, |acc, t| {
            let mut delta = 0i128;
            if t.to_user_account.as_deref() == Some(wallet) {
                delta += t.amount as i128;
            }
            if t.from_user_account.as_deref() == Some(wallet) {
                delta -= t.amount as i128;
            }
            acc + delta
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeTransfer {
    #[serde(default)]
    pub from_user_account: Option<String>,
    #[serde(default)]
    pub to_user_account: Option<String>,
    #[serde(default)]
    pub amount: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    #[serde(default)]
    pub from_user_account: Option<String>,
    #[serde(default)]
    pub to_user_account: Option<String>,
    pub mint: String,
    #[serde(default)]
    pub token_amount: f64,
}

// ============ Wire envelopes ============

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcValue<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct KeyedTokenAccount {
    account: TokenAccountBody,
}

#[derive(Debug, Deserialize)]
struct TokenAccountBody {
    data: TokenAccountData,
}

#[derive(Debug, Deserialize)]
struct TokenAccountData {
    #[serde(default)]
    parsed: Option<ParsedTokenAccount>,
}

#[derive(Debug, Deserialize)]
struct ParsedTokenAccount {
    info: TokenAccountInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAccountInfo {
    mint: String,
    token_amount: UiTokenAmount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiTokenAmount {
    #[serde(default)]
    ui_amount: Option<f64>,
    #[serde(default)]
    decimals: u8,
}
