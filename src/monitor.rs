//! Signal monitor
//!
//! Tails the signal file and posts every signal not yet delivered. The set
//! of delivered ids is persisted so restarts do not repost.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::signals::SignalRecord;
use crate::wallet::store::{read_json, write_json_atomic};

/// Ids already delivered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostedState {
    #[serde(default)]
    pub posted_ids: Vec<String>,
}

impl PostedState {
    /// Missing or unreadable state is empty
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match read_json(path) {
            Ok(state) => state,
            Err(e) => {
                warn!("Error loading posted state: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}

/// Render the alert text for one signal
pub fn format_signal(signal: &SignalRecord, now: i64) -> String {
    let symbol = if !signal.token_symbol.is_empty() {
        signal.token_symbol.clone()
    } else if !signal.token_mint.is_empty() {
        signal.token_mint.chars().take(6).collect()
    } else {
        "UNKNOWN".to_string()
    };

    let entry = signal.entry_market_cap;
    let entry_display = if entry <= 0.0 {
        "N/A".to_string()
    } else if entry > 1000.0 {
        format!("${:.1}k", entry / 1000.0)
    } else {
        format!("${}", entry.round())
    };

    let pnl = if entry > 0.0 && signal.current_market_cap > 0.0 {
        Some((signal.current_market_cap - entry) / entry * 100.0)
    } else {
        signal.price_change_24h
    };
    let pnl_display = match pnl {
        Some(p) => format!("{:+.1}%", p),
        None => "N/A".to_string(),
    };

    let wallet = if signal.wallet_name.is_empty() {
        "LEO-???"
    } else {
        signal.wallet_name.as_str()
    };

    let link = if !signal.axiom_link.is_empty() {
        signal.axiom_link.clone()
    } else if !signal.pair_address.is_empty() {
        format!("https://axiom.trade/meme/{}", signal.pair_address)
    } else {
        format!("https://axiom.trade/meme/{}", signal.token_mint)
    };

    let age_hours = (now - signal.timestamp) as f64 / 3_600_000.0;

    format!(
        "🚨 ALPHA SIGNAL\n\nWallet: {}\nToken: {}\nEntry Mcap: {}\nPNL: {}\nTime: {:.1}h ago\n\nTrade: {}",
        wallet, symbol, entry_display, pnl_display, age_hours, link
    )
}

/// Delivery channel for alert text
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, message: &str) -> Result<()>;
}

/// Prints messages instead of posting them
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn send(&self, message: &str) -> Result<()> {
        println!("\n--- MESSAGE TO SEND ---");
        println!("{}", message);
        println!("--- END MESSAGE ---\n");
        Ok(())
    }
}

/// Telegram Bot API `sendMessage`
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(config: &MonitorConfig, bot_token: String) -> Result<Self> {
        if config.chat_id.is_empty() {
            return Err(Error::Config("monitor.chat_id is required for Telegram".into()));
        }
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
            api_url: config.telegram_api_url.trim_end_matches('/').to_string(),
            bot_token,
            chat_id: config.chat_id.clone(),
        })
    }

    /// Bot token from `TELEGRAM_BOT_TOKEN`
    pub fn from_env(config: &MonitorConfig) -> Result<Self> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| Error::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?;
        Self::new(config, token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, message: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": message,
            "disable_web_page_preview": true,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Notify(e.without_url().to_string()))?;

        let status = response.status();
        let parsed: TelegramResponse = response
            .json()
            .await
            .map_err(|e| Error::Notify(format!("bad response ({}): {}", status, e)))?;

        if !parsed.ok {
            return Err(Error::Notify(
                parsed.description.unwrap_or_else(|| status.to_string()),
            ));
        }
        Ok(())
    }
}

/// Counts from one check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    pub new_signals: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Post every unposted signal; only delivered ids are marked
pub async fn check_signals<N: Notifier + ?Sized>(
    signals_path: &Path,
    state_path: &Path,
    notifier: &N,
    now: i64,
) -> Result<CheckOutcome> {
    let mut outcome = CheckOutcome::default();

    if !signals_path.exists() {
        info!("No signals file yet");
        return Ok(outcome);
    }

    let signals: Vec<SignalRecord> = read_json(signals_path)?;
    let mut state = PostedState::load(state_path);
    let posted: HashSet<String> = state.posted_ids.iter().cloned().collect();

    let fresh: Vec<&SignalRecord> = signals.iter().filter(|s| !posted.contains(&s.id)).collect();
    outcome.new_signals = fresh.len();

    if fresh.is_empty() {
        info!("No new signals");
        return Ok(outcome);
    }

    info!("Found {} new signal(s)", fresh.len());

    for signal in fresh {
        let message = format_signal(signal, now);
        debug!("Posting signal {} via {}", signal.id, notifier.name());
        match notifier.send(&message).await {
            Ok(()) => {
                state.posted_ids.push(signal.id.clone());
                outcome.delivered += 1;
            }
            Err(e) => {
                warn!("Failed to post signal {}: {}", signal.id, e);
                outcome.failed += 1;
            }
        }
    }

    if let Err(e) = state.save(state_path) {
        warn!("Error saving posted state: {}", e);
    }

    Ok(outcome)
}

/// Check now, then on every interval until Ctrl-C; `once` stops after the first check
pub async fn run_monitor<N: Notifier + ?Sized>(
    signals_path: &Path,
    state_path: &Path,
    notifier: &N,
    interval_secs: u64,
    once: bool,
) -> Result<()> {
    if once {
        let outcome = check_signals(signals_path, state_path, notifier, now_ms()).await?;
        info!(
            "Check complete: {} new, {} delivered, {} failed",
            outcome.new_signals, outcome.delivered, outcome.failed
        );
        return Ok(());
    }

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = check_signals(signals_path, state_path, notifier, now_ms()).await {
                    error!("Error checking signals: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    Ok(())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
