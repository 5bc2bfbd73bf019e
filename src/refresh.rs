//! Scheduled statistics refresh
//!
//! Runs the trade statistics pass, fingerprints the wallet list before and
//! after, and fires the deploy hook only when the content changed.
//!
//! Fingerprints cover the list as this crate writes it, not the raw file
//! bytes, so a file last written by another tool with different number
//! formatting does not count as a change.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::enrich::{stats_pass, PassReport};
use crate::error::{Error, Result};
use crate::rpc::ChainSource;
use crate::wallet::store::{read_json, write_json_atomic, WalletStore};
use crate::wallet::summary::FleetSummary;
use crate::wallet::types::WalletRecord;

/// Persisted between refresh runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshState {
    /// ms, 0 before the first run
    #[serde(default)]
    pub last_run: i64,
    #[serde(default)]
    pub last_checksum: String,
}

impl RefreshState {
    /// Missing or unreadable state starts from zero
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match read_json(path) {
            Ok(state) => state,
            Err(e) => {
                warn!("Failed to load refresh state: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    /// Hours since `last_run`
    pub fn hours_since(&self, now: i64) -> f64 {
        (now - self.last_run) as f64 / 3_600_000.0
    }
}

/// Hex SHA-256 of `data`
pub fn checksum(data: &[u8]) -> String {
    Sha256::digest(data).iter().map(|b| format!("{:02x}", b)).collect()
}

/// Checksum of `records` in the exact form [`WalletStore::save`] writes
pub fn records_checksum(records: &[WalletRecord]) -> Result<String> {
    let data = serde_json::to_string_pretty(records)?;
    Ok(checksum(data.as_bytes()))
}

/// Run `command` through the shell; a non-zero exit is an error
pub async fn run_deploy(command: &str) -> Result<()> {
    info!("Running deploy command: {}", command);
    let status = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .status()
        .await
        .map_err(|e| Error::Deploy(format!("{}: {}", command, e)))?;

    if !status.success() {
        return Err(Error::Deploy(format!("{} exited with {}", command, status)));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub hours_since_last: f64,
    pub changed: bool,
    pub deployed: bool,
    pub pass: PassReport,
    pub summary: FleetSummary,
}

/// Stats pass plus change detection and deploy
pub async fn run_refresh<S: ChainSource + ?Sized>(
    config: &Config,
    source: &S,
    now: i64,
) -> Result<RefreshOutcome> {
    let state_path = &config.paths.refresh_state_file;
    let state = RefreshState::load(state_path);
    let hours_since_last = state.hours_since(now);
    info!("Last refresh: {:.1}h ago", hours_since_last);

    let store = WalletStore::new(&config.paths.wallets_file);
    let mut records = store.load()?;
    let old_checksum = records_checksum(&records)?;

    let pass = stats_pass(
        &mut records,
        source,
        config.stats.history_limit,
        Duration::from_millis(config.rate_limit.stats_delay_ms),
        now,
    )
    .await;
    store.save(&records)?;

    let new_checksum = records_checksum(&records)?;
    let changed = old_checksum != new_checksum;

    let mut deployed = false;
    if changed {
        info!("Wallet stats changed");
        if let Some(command) = &config.refresh.deploy_command {
            run_deploy(command).await?;
            deployed = true;
        }
    } else {
        info!("No changes detected, skipping deployment");
    }

    RefreshState {
        last_run: now,
        last_checksum: new_checksum,
    }
    .save(state_path)?;

    Ok(RefreshOutcome {
        hours_since_last,
        changed,
        deployed,
        pass,
        summary: FleetSummary::from_records(&records),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{EnhancedTransaction, SignatureInfo};
    use crate::wallet::types::WalletRecord;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct Silent;

    #[async_trait]
    impl ChainSource for Silent {
        async fn signatures(&self, _address: &str, _limit: u32) -> Result<Vec<SignatureInfo>> {
            Ok(Vec::new())
        }

        async fn enhanced_history(&self, _address: &str, _limit: u32) -> Result<Vec<EnhancedTransaction>> {
            Ok(Vec::new())
        }
    }

    struct Active;

    #[async_trait]
    impl ChainSource for Active {
        async fn signatures(&self, _address: &str, _limit: u32) -> Result<Vec<SignatureInfo>> {
            Ok(Vec::new())
        }

        async fn enhanced_history(&self, _address: &str, _limit: u32) -> Result<Vec<EnhancedTransaction>> {
            Ok(vec![EnhancedTransaction {
                signature: "s1".into(),
                tx_type: Some("TRANSFER".into()),
                timestamp: Some(3_000),
                fee_payer: None,
                native_transfers: Vec::new(),
                token_transfers: Vec::new(),
            }])
        }
    }

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.paths.wallets_file = dir.join("wallets.json");
        config.paths.refresh_state_file = dir.join(".last-stats-refresh.json");
        config.rate_limit.stats_delay_ms = 0;
        config
    }

    #[test]
    fn test_checksum() {
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_state_defaults_and_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        assert_eq!(RefreshState::load(&path), RefreshState::default());

        std::fs::write(&path, "garbage").unwrap();
        assert_eq!(RefreshState::load(&path), RefreshState::default());

        let state = RefreshState { last_run: 7_200_000, last_checksum: "ff".into() };
        state.save(&path).unwrap();
        assert_eq!(RefreshState::load(&path), state);
        assert!((state.hours_since(14_400_000) - 2.0).abs() < 1e-9);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("lastChecksum"));
    }

    #[tokio::test]
    async fn test_deploy_exit_status() {
        assert!(run_deploy("true").await.is_ok());
        assert!(matches!(run_deploy("exit 3").await, Err(Error::Deploy(_))));
    }

    #[tokio::test]
    async fn test_unchanged_refresh_skips_deploy() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path());
        let marker = dir.path().join("deployed");
        config.refresh.deploy_command = Some(format!("touch {}", marker.display()));

        let store = WalletStore::new(&config.paths.wallets_file);
        store.save(&[WalletRecord::new("A", "alpha_discovery", 1)]).unwrap();

        let outcome = run_refresh(&config, &Silent, 3_600_000).await.unwrap();
        assert!(!outcome.changed);
        assert!(!outcome.deployed);
        assert!(!marker.exists());
        assert_eq!(outcome.pass.unchanged, 1);
        assert_eq!(outcome.summary.wallets, 1);

        let state = RefreshState::load(&config.paths.refresh_state_file);
        assert_eq!(state.last_run, 3_600_000);
        let written = std::fs::read(store.path()).unwrap();
        assert_eq!(state.last_checksum, checksum(&written));
    }

    #[tokio::test]
    async fn test_foreign_formatting_is_not_a_change() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path());
        let marker = dir.path().join("deployed");
        config.refresh.deploy_command = Some(format!("touch {}", marker.display()));

        std::fs::write(
            &config.paths.wallets_file,
            r#"[
  {
    "address": "A1",
    "leoName": "LEO-001",
    "tier": "alpha",
    "score": 50,
    "totalTrades": 0,
    "profitRate": 0,
    "totalPnl": 0,
    "twitter": "@keep_me"
  }
]"#,
        )
        .unwrap();

        let outcome = run_refresh(&config, &Silent, 3_600_000).await.unwrap();
        assert!(!outcome.changed);
        assert!(!outcome.deployed);
        assert!(!marker.exists());

        let rewritten = std::fs::read_to_string(&config.paths.wallets_file).unwrap();
        assert!(rewritten.contains("@keep_me"));
    }

    #[tokio::test]
    async fn test_changed_stats_trigger_deploy() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path());
        let marker = dir.path().join("deployed");
        config.refresh.deploy_command = Some(format!("touch {}", marker.display()));

        let store = WalletStore::new(&config.paths.wallets_file);
        store.save(&[WalletRecord::new("A", "alpha_discovery", 1)]).unwrap();

        let outcome = run_refresh(&config, &Active, 3_600_000).await.unwrap();
        assert!(outcome.changed);
        assert!(outcome.deployed);
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_missing_wallet_file_is_fatal() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        assert!(matches!(
            run_refresh(&config, &Silent, 0).await,
            Err(Error::Persistence(_))
        ));
    }
}
