//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// Re-export merge policies
pub use crate::wallet::reconcile::{NotePolicy, ScorePolicy};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub price: PriceConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub holders: HoldersConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// File locations, relative to the invocation directory
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Canonical wallet list
    #[serde(default = "default_wallets_file")]
    pub wallets_file: PathBuf,
    /// Detected position signals
    #[serde(default = "default_signals_file")]
    pub signals_file: PathBuf,
    /// Ids of signals already sent to the channel
    #[serde(default = "default_posted_state_file")]
    pub posted_state_file: PathBuf,
    #[serde(default = "default_refresh_state_file")]
    pub refresh_state_file: PathBuf,
    /// Untracked traders exported by `holders`, consumed by `import`
    #[serde(default = "default_trader_export_file")]
    pub trader_export_file: PathBuf,
    #[serde(default = "default_alpha_source")]
    pub alpha_source: PathBuf,
    #[serde(default = "default_millionaire_source")]
    pub millionaire_source: PathBuf,
    #[serde(default = "default_imported_source")]
    pub imported_source: PathBuf,
    #[serde(default = "default_tiered_source")]
    pub tiered_source: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            wallets_file: default_wallets_file(),
            signals_file: default_signals_file(),
            posted_state_file: default_posted_state_file(),
            refresh_state_file: default_refresh_state_file(),
            trader_export_file: default_trader_export_file(),
            alpha_source: default_alpha_source(),
            millionaire_source: default_millionaire_source(),
            imported_source: default_imported_source(),
            tiered_source: default_tiered_source(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            rest_base_url: default_rest_base_url(),
            api_key: default_api_key(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceConfig {
    #[serde(default = "default_price_base_url")]
    pub base_url: String,
    #[serde(default = "default_price_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            base_url: default_price_base_url(),
            timeout_ms: default_price_timeout_ms(),
        }
    }
}

/// Fixed delays inserted after each external call
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_analyze_delay")]
    pub analyze_delay_ms: u64,
    #[serde(default = "default_stats_delay")]
    pub stats_delay_ms: u64,
    #[serde(default = "default_scan_wallet_delay")]
    pub scan_wallet_delay_ms: u64,
    #[serde(default = "default_scan_position_delay")]
    pub scan_position_delay_ms: u64,
    #[serde(default = "default_holder_lookup_delay")]
    pub holder_lookup_delay_ms: u64,
    #[serde(default = "default_trader_lookup_delay")]
    pub trader_lookup_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            analyze_delay_ms: default_analyze_delay(),
            stats_delay_ms: default_stats_delay(),
            scan_wallet_delay_ms: default_scan_wallet_delay(),
            scan_position_delay_ms: default_scan_position_delay(),
            holder_lookup_delay_ms: default_holder_lookup_delay(),
            trader_lookup_delay_ms: default_trader_lookup_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// Display id prefix (`LEO` gives `LEO-001`)
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,
    /// Source tags in display order; unlisted tags sort after these
    #[serde(default = "default_source_order")]
    pub source_order: Vec<String>,
    #[serde(default)]
    pub score_policy: ScorePolicy,
    #[serde(default)]
    pub note_policy: NotePolicy,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            id_prefix: default_id_prefix(),
            source_order: default_source_order(),
            score_policy: ScorePolicy::default(),
            note_policy: NotePolicy::default(),
        }
    }
}

/// Position scanner criteria
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Ignore buys older than this
    #[serde(default = "default_max_days_old")]
    pub max_days_old: f64,
    /// Minimum tokens still held for a buy to count
    #[serde(default = "default_min_token_holding")]
    pub min_token_holding: f64,
    #[serde(default = "default_min_pnl_percent")]
    pub min_pnl_percent: f64,
    /// Unset means any positive PnL qualifies
    #[serde(default)]
    pub max_pnl_percent: Option<f64>,
    #[serde(default = "default_scan_transaction_limit")]
    pub transaction_limit: u32,
    #[serde(default = "default_history_points_max")]
    pub history_points_max: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_days_old: default_max_days_old(),
            min_token_holding: default_min_token_holding(),
            min_pnl_percent: default_min_pnl_percent(),
            max_pnl_percent: None,
            transaction_limit: default_scan_transaction_limit(),
            history_points_max: default_history_points_max(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    /// Signatures fetched per wallet by `analyze`
    #[serde(default = "default_activity_limit")]
    pub activity_limit: u32,
    /// Enhanced transactions fetched per wallet by `stats`
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            activity_limit: default_activity_limit(),
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HoldersConfig {
    #[serde(default = "default_max_holder_accounts")]
    pub max_holder_accounts: usize,
    #[serde(default = "default_holder_signature_limit")]
    pub signature_limit: u32,
    #[serde(default = "default_max_transactions")]
    pub max_transactions: usize,
    #[serde(default = "default_top_traders")]
    pub top_traders: usize,
    #[serde(default = "default_export_count")]
    pub export_count: usize,
}

impl Default for HoldersConfig {
    fn default() -> Self {
        Self {
            max_holder_accounts: default_max_holder_accounts(),
            signature_limit: default_holder_signature_limit(),
            max_transactions: default_max_transactions(),
            top_traders: default_top_traders(),
            export_count: default_export_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_chat_id")]
    pub chat_id: String,
    /// When false, alerts are printed instead of posted
    #[serde(default)]
    pub telegram_enabled: bool,
    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval(),
            chat_id: default_chat_id(),
            telegram_enabled: false,
            telegram_api_url: default_telegram_api_url(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshConfig {
    /// Shell command run after a refresh that changed the wallet list
    #[serde(default)]
    pub deploy_command: Option<String>,
}

// Default value functions
fn default_wallets_file() -> PathBuf {
    PathBuf::from("public/wallets.json")
}

fn default_signals_file() -> PathBuf {
    PathBuf::from("public/signals.json")
}

fn default_posted_state_file() -> PathBuf {
    PathBuf::from("posted-signals-state.json")
}

fn default_refresh_state_file() -> PathBuf {
    PathBuf::from(".last-stats-refresh.json")
}

fn default_trader_export_file() -> PathBuf {
    PathBuf::from("punch-new-wallets.json")
}

fn default_alpha_source() -> PathBuf {
    PathBuf::from("data/alpha-wallets.json")
}

fn default_millionaire_source() -> PathBuf {
    PathBuf::from("data/millionaire-token-traders.json")
}

fn default_imported_source() -> PathBuf {
    PathBuf::from("data/imported-wallets.json")
}

fn default_tiered_source() -> PathBuf {
    PathBuf::from("data/tiered-wallets.json")
}

fn default_rpc_endpoint() -> String {
    std::env::var("RPC_ENDPOINT").unwrap_or_else(|_| "https://mainnet.helius-rpc.com".into())
}

fn default_rest_base_url() -> String {
    "https://api.helius.xyz".into()
}

fn default_api_key() -> String {
    std::env::var("HELIUS_API_KEY").unwrap_or_default()
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_price_base_url() -> String {
    "https://api.dexscreener.com".into()
}

fn default_price_timeout_ms() -> u64 {
    5000
}

fn default_analyze_delay() -> u64 {
    1000
}

fn default_stats_delay() -> u64 {
    1200
}

fn default_scan_wallet_delay() -> u64 {
    1000
}

fn default_scan_position_delay() -> u64 {
    300
}

fn default_holder_lookup_delay() -> u64 {
    100
}

fn default_trader_lookup_delay() -> u64 {
    50
}

fn default_id_prefix() -> String {
    "LEO".into()
}

fn default_source_order() -> Vec<String> {
    vec!["alpha_discovery".into(), "millionaire_scan".into()]
}

fn default_max_days_old() -> f64 {
    365.0
}

fn default_min_token_holding() -> f64 {
    5_000_000.0
}

fn default_min_pnl_percent() -> f64 {
    -30.0
}

fn default_scan_transaction_limit() -> u32 {
    100
}

fn default_history_points_max() -> u32 {
    14
}

fn default_activity_limit() -> u32 {
    100
}

fn default_history_limit() -> u32 {
    1000
}

fn default_max_holder_accounts() -> usize {
    30
}

fn default_holder_signature_limit() -> u32 {
    1000
}

fn default_max_transactions() -> usize {
    500
}

fn default_top_traders() -> usize {
    20
}

fn default_export_count() -> usize {
    5
}

fn default_monitor_interval() -> u64 {
    30
}

fn default_chat_id() -> String {
    std::env::var("TELEGRAM_CHAT_ID").unwrap_or_default()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".into()
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix ALPHA__)
            .add_source(
                config::Environment::with_prefix("ALPHA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.reconcile.id_prefix.trim().is_empty() {
            anyhow::bail!("reconcile.id_prefix must not be empty");
        }

        if self.reconcile.source_order.is_empty() {
            anyhow::bail!("reconcile.source_order must list at least one source tag");
        }

        if self.monitor.interval_secs == 0 {
            anyhow::bail!("monitor.interval_secs must be positive");
        }

        if self.scan.min_pnl_percent <= -100.0 {
            anyhow::bail!(
                "scan.min_pnl_percent ({}) must be above -100",
                self.scan.min_pnl_percent
            );
        }

        if let Some(max) = self.scan.max_pnl_percent {
            if self.scan.min_pnl_percent >= max {
                anyhow::bail!(
                    "scan.min_pnl_percent ({}) must be below scan.max_pnl_percent ({})",
                    self.scan.min_pnl_percent,
                    max
                );
            }
        }

        if self.scan.max_days_old <= 0.0 {
            anyhow::bail!("scan.max_days_old must be positive");
        }

        if self.rpc.api_key.is_empty() {
            tracing::warn!("HELIUS_API_KEY is not set - RPC calls will be rejected upstream");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Paths:
    wallets: {}
    signals: {}
    posted_state: {}
    alpha_source: {}
    millionaire_source: {}
  RPC:
    endpoint: {}
    rest_base_url: {}
    api_key: {}
    timeout: {}ms
  Price:
    base_url: {}
  Reconcile:
    id_prefix: {}
    source_order: {:?}
    score_policy: {:?}
    note_policy: {:?}
  Scan:
    max_days_old: {}
    min_token_holding: {}
    pnl_range: {}% .. {}
  Monitor:
    interval: {}s
    chat_id: {}
    telegram: {}
  Refresh:
    deploy_command: {}
"#,
            self.paths.wallets_file.display(),
            self.paths.signals_file.display(),
            self.paths.posted_state_file.display(),
            self.paths.alpha_source.display(),
            self.paths.millionaire_source.display(),
            mask_url(&self.rpc.endpoint),
            mask_url(&self.rpc.rest_base_url),
            if self.rpc.api_key.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            self.rpc.timeout_ms,
            self.price.base_url,
            self.reconcile.id_prefix,
            self.reconcile.source_order,
            self.reconcile.score_policy,
            self.reconcile.note_policy,
            self.scan.max_days_old,
            self.scan.min_token_holding,
            self.scan.min_pnl_percent,
            self.scan
                .max_pnl_percent
                .map(|m| format!("{}%", m))
                .unwrap_or_else(|| "unbounded".to_string()),
            self.monitor.interval_secs,
            if self.monitor.chat_id.is_empty() {
                "(not set)"
            } else {
                self.monitor.chat_id.as_str()
            },
            if self.monitor.telegram_enabled {
                "enabled"
            } else {
                "disabled (console output)"
            },
            self.refresh.deploy_command.as_deref().unwrap_or("(none)"),
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            rpc: RpcConfig::default(),
            price: PriceConfig::default(),
            rate_limit: RateLimitConfig::default(),
            reconcile: ReconcileConfig::default(),
            scan: ScanConfig::default(),
            stats: StatsConfig::default(),
            holders: HoldersConfig::default(),
            monitor: MonitorConfig::default(),
            refresh: RefreshConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.reconcile.id_prefix, "LEO");
        assert_eq!(
            config.reconcile.source_order,
            vec!["alpha_discovery".to_string(), "millionaire_scan".to_string()]
        );
        assert_eq!(config.reconcile.score_policy, ScorePolicy::RaiseOnly);
        assert_eq!(config.scan.min_pnl_percent, -30.0);
        assert!(config.scan.max_pnl_percent.is_none());
        assert_eq!(config.rate_limit.analyze_delay_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_score_policy_deserialize() {
        let policy: ScorePolicy = serde_json::from_str(r#""overwrite""#).unwrap();
        assert_eq!(policy, ScorePolicy::Overwrite);
        let policy: NotePolicy = serde_json::from_str(r#""fill_empty""#).unwrap();
        assert_eq!(policy, NotePolicy::FillEmpty);
    }

    #[test]
    fn test_validate_rejects_inverted_pnl_range() {
        let mut config = Config::default();
        config.scan.max_pnl_percent = Some(-50.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_total_loss_floor() {
        let mut config = Config::default();
        config.scan.min_pnl_percent = -100.0;
        assert!(config.validate().is_err());
        config.scan.min_pnl_percent = -99.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_prefix() {
        let mut config = Config::default();
        config.reconcile.id_prefix = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alpha.toml");
        std::fs::write(
            &path,
            r#"
[reconcile]
id_prefix = "ALF"
score_policy = "keep"

[scan]
min_pnl_percent = -10.0
max_pnl_percent = 500.0
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.reconcile.id_prefix, "ALF");
        assert_eq!(config.reconcile.score_policy, ScorePolicy::Keep);
        assert_eq!(config.scan.max_pnl_percent, Some(500.0));
        assert_eq!(config.paths.wallets_file, PathBuf::from("public/wallets.json"));
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://mainnet.helius-rpc.com/?api-key=secret"),
            "https://mainnet.helius-rpc.com/?***"
        );
        assert_eq!(
            mask_url("https://api.helius.xyz"),
            "https://api.helius.xyz"
        );
    }
}
