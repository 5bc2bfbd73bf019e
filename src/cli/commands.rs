//! CLI command implementations

use anyhow::{Context, Result};
use dialoguer::Confirm;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::enrich::{analyze_pass, stats_pass, PassReport};
use crate::error::Error;
use crate::holders::{discover, export_traders, DiscoveryLimits};
use crate::monitor::{run_monitor, ConsoleNotifier, Notifier, TelegramNotifier};
use crate::price::PriceClient;
use crate::refresh::run_refresh;
use crate::rpc::RpcClient;
use crate::signals::{save_signals, scan_all, ScanCriteria};
use crate::wallet::sources::{
    apply_tier_lookup, load_tier_lookup, ALPHA_DISCOVERY, IMPORTED, MILLIONAIRE_SCAN,
};
use crate::wallet::{
    load_sources, read_json, reconcile, validate_records, FleetSummary, MergePolicy,
    ReconcileOutcome, Severity, SourceShape, SourceSpec, WalletStore,
};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn discovery_sources(config: &Config) -> Vec<SourceSpec> {
    vec![
        SourceSpec::new(&config.paths.alpha_source, SourceShape::AlphaDiscovery, ALPHA_DISCOVERY),
        SourceSpec::new(
            &config.paths.millionaire_source,
            SourceShape::MillionaireScan,
            MILLIONAIRE_SCAN,
        ),
    ]
}

fn confirm_replace(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }
    let confirmed = Confirm::new()
        .with_prompt(format!(
            "Replace {}? All collected statistics will be lost.",
            path.display()
        ))
        .default(false)
        .interact()?;
    Ok(confirmed)
}

fn print_merge(title: &str, outcome: &ReconcileOutcome) {
    println!("\n=== {} ===\n", title);
    println!("Total wallets: {}", outcome.records.len());
    println!("New wallets: {}", outcome.added.len());
    println!("Already tracked: {}", outcome.refreshed);
    if outcome.duplicates > 0 {
        println!("Duplicates skipped: {}", outcome.duplicates);
    }
    if outcome.skipped_invalid > 0 {
        println!("Entries without address: {}", outcome.skipped_invalid);
    }

    println!("\nBy source:");
    for (source, count) in outcome.count_by_source() {
        println!("  {}: {}", source, count);
    }

    if let (Some(first), Some(last)) = (outcome.records.first(), outcome.records.last()) {
        println!("\nIds: {} .. {}", first.label(), last.label());
    }
}

fn print_pass(title: &str, report: &PassReport, summary: &FleetSummary) {
    println!("\n=== {} ===\n", title);
    println!("Wallets: {}", report);
    println!("\nFleet:");
    println!("{}", summary);
}

/// Merge the discovery sources into the list, keeping collected statistics
pub async fn sync(config: &Config) -> Result<()> {
    info!("Syncing wallet list from discovery sources...");
    let store = WalletStore::new(&config.paths.wallets_file);
    let existing = store.load_or_empty();
    info!("Current list: {} wallets", existing.len());

    let batches = load_sources(&discovery_sources(config));
    let policy = MergePolicy::from_config(&config.reconcile);
    let outcome = reconcile(existing, &batches, &policy, now_ms());

    store
        .save(&outcome.records)
        .context("Failed to save wallet list")?;

    print_merge("SYNC COMPLETE", &outcome);
    for address in &outcome.added {
        info!("Added {}", address);
    }
    Ok(())
}

/// Replace the list with the discovery sources; statistics are discarded
pub async fn rebuild(config: &Config, force: bool) -> Result<()> {
    let store = WalletStore::new(&config.paths.wallets_file);
    if !force && !confirm_replace(store.path())? {
        info!("Rebuild cancelled by user");
        return Ok(());
    }

    info!("Rebuilding wallet list from discovery sources...");
    let batches = load_sources(&discovery_sources(config));
    let policy = MergePolicy::from_config(&config.reconcile);
    let outcome = reconcile(Vec::new(), &batches, &policy, now_ms());

    store
        .save(&outcome.records)
        .context("Failed to save wallet list")?;

    print_merge("REBUILD COMPLETE", &outcome);
    Ok(())
}

/// Replace the list with the imported-wallets file, tiers from the tiered file
pub async fn restore(config: &Config, force: bool) -> Result<()> {
    let store = WalletStore::new(&config.paths.wallets_file);
    if !force && !confirm_replace(store.path())? {
        info!("Restore cancelled by user");
        return Ok(());
    }

    info!("Restoring wallet list from {}", config.paths.imported_source.display());
    let mut candidates =
        SourceSpec::new(&config.paths.imported_source, SourceShape::ImportedWallets, IMPORTED).load();
    if candidates.is_empty() {
        anyhow::bail!(
            "No wallets found in {}",
            config.paths.imported_source.display()
        );
    }

    let tiers = load_tier_lookup(&config.paths.tiered_source);
    apply_tier_lookup(&mut candidates, &tiers);

    // File order is the restore order
    let policy = MergePolicy {
        source_order: Vec::new(),
        ..MergePolicy::from_config(&config.reconcile)
    };
    let outcome = reconcile(Vec::new(), &[candidates], &policy, now_ms());

    store
        .save(&outcome.records)
        .context("Failed to save wallet list")?;

    print_merge("RESTORE COMPLETE", &outcome);
    println!("Tier lookup entries: {}", tiers.len());
    Ok(())
}

/// Append trader candidates from a `[{address, trades}]` file
pub async fn import(config: &Config, file: &Path, source_tag: &str) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("Import file not found: {}", file.display());
    }

    let candidates = SourceSpec::new(file, SourceShape::TraderList, source_tag).load();
    info!("Importing {} candidates tagged {}", candidates.len(), source_tag);

    let store = WalletStore::new(&config.paths.wallets_file);
    let existing = store.load_or_empty();
    let policy = MergePolicy::from_config(&config.reconcile);
    let outcome = reconcile(existing, &[candidates], &policy, now_ms());

    store
        .save(&outcome.records)
        .context("Failed to save wallet list")?;

    print_merge("IMPORT COMPLETE", &outcome);
    for record in outcome
        .records
        .iter()
        .filter(|r| outcome.added.contains(&r.address))
    {
        println!("  + {} {}", record.label(), record.address);
    }
    Ok(())
}

/// Holder and trader discovery for one token
pub async fn holders(config: &Config, mint: &str, export: Option<PathBuf>) -> Result<()> {
    let rpc = RpcClient::new(&config.rpc)?;
    let prices = PriceClient::new(&config.price)?;

    let tracked: HashSet<String> = WalletStore::new(&config.paths.wallets_file)
        .load_or_empty()
        .into_iter()
        .map(|r| r.address)
        .collect();
    info!("Loaded {} tracked wallets", tracked.len());

    let limits = DiscoveryLimits::from_config(config);
    let report = discover(&rpc, &prices, mint, &tracked, &limits).await;

    let token = match &report.token {
        Some(token) => token,
        None => {
            println!("\nCould not fetch token info for {}", mint);
            return Ok(());
        }
    };

    println!("\n=== TOKEN ===\n");
    println!("Symbol: {} ({})", token.symbol, token.name);
    println!("Price: ${:.10}", token.price_usd);
    println!("Market Cap: ${:.0}", token.market_cap);
    println!("Liquidity: ${:.0}", token.liquidity_usd);
    println!("24h Volume: ${:.0}", token.volume_24h);
    println!("24h Change: {:.2}%", token.price_change_24h);

    println!("\n=== TOP HOLDERS ({}) ===\n", report.holders.len());
    for (i, holder) in report.holders.iter().enumerate() {
        println!("{:>3}. {} {:.2}", i + 1, holder.owner, holder.balance);
    }

    println!("\n=== TOP TRADERS ({}) ===\n", report.traders.len());
    for (i, trader) in report.traders.iter().enumerate() {
        let marker = if tracked.contains(&trader.address) { " *" } else { "" };
        println!("{:>3}. {} {} trades{}", i + 1, trader.address, trader.trades, marker);
    }

    println!("\n=== TRACKED WALLETS ===\n");
    if report.matches.is_empty() {
        println!("None of the tracked wallets hold or trade this token.");
    }
    for (address, kind) in &report.matches {
        println!("  {} [{}]", address, kind);
    }

    let path = export.unwrap_or_else(|| config.paths.trader_export_file.clone());
    if report.export.is_empty() {
        println!("\nNo untracked traders to export.");
    } else {
        export_traders(&path, &report.export)?;
        println!(
            "\nExported {} untracked traders to {}",
            report.export.len(),
            path.display()
        );
        println!("Run `alpha import {}` to add them.", path.display());
    }
    Ok(())
}

/// Activity enrichment over the whole list
pub async fn analyze(config: &Config) -> Result<()> {
    let rpc = RpcClient::new(&config.rpc)?;
    let store = WalletStore::new(&config.paths.wallets_file);
    let mut records = store.load().context("Failed to load wallet list")?;
    info!("Analyzing {} wallets", records.len());

    let report = analyze_pass(
        &mut records,
        &rpc,
        config.stats.activity_limit,
        Duration::from_millis(config.rate_limit.analyze_delay_ms),
        now_ms(),
    )
    .await;

    store
        .save(&records)
        .context("Failed to save wallet list")?;

    print_pass("ANALYSIS COMPLETE", &report, &FleetSummary::from_records(&records));
    Ok(())
}

/// Trade statistics over the whole list
pub async fn stats(config: &Config) -> Result<()> {
    let rpc = RpcClient::new(&config.rpc)?;
    let store = WalletStore::new(&config.paths.wallets_file);
    let mut records = store.load().context("Failed to load wallet list")?;
    info!("Calculating trade stats for {} wallets", records.len());

    let report = stats_pass(
        &mut records,
        &rpc,
        config.stats.history_limit,
        Duration::from_millis(config.rate_limit.stats_delay_ms),
        now_ms(),
    )
    .await;

    store
        .save(&records)
        .context("Failed to save wallet list")?;

    print_pass("STATS COMPLETE", &report, &FleetSummary::from_records(&records));
    Ok(())
}

/// Stats pass with change detection and deploy hook
pub async fn refresh(config: &Config) -> Result<()> {
    let rpc = RpcClient::new(&config.rpc)?;
    let outcome = run_refresh(config, &rpc, now_ms()).await?;

    print_pass("REFRESH COMPLETE", &outcome.pass, &outcome.summary);
    println!("\nHours since last refresh: {:.1}", outcome.hours_since_last);
    println!("Changed: {}", if outcome.changed { "yes" } else { "no" });
    if outcome.changed {
        if outcome.deployed {
            println!("Deploy: done");
        } else {
            println!("Deploy: no command configured");
        }
    }
    Ok(())
}

/// Scan tracked wallets for open positions and write the signal file
pub async fn scan(config: &Config) -> Result<()> {
    let rpc = RpcClient::new(&config.rpc)?;
    let prices = PriceClient::new(&config.price)?;
    let wallets = WalletStore::new(&config.paths.wallets_file)
        .load()
        .context("Failed to load wallet list")?;

    let criteria = ScanCriteria::from_config(&config.scan);
    println!("\n=== POSITION SCAN ===\n");
    println!("Wallets: {}", wallets.len());
    println!("Max age: {} days", criteria.max_days_old);
    println!("Min holding: {} tokens", criteria.min_token_holding);
    match criteria.max_pnl_percent {
        Some(max) => println!("PnL range: {}% .. {}%", criteria.min_pnl_percent, max),
        None => println!("PnL range: >= {}%", criteria.min_pnl_percent),
    }

    let report = scan_all(
        &wallets,
        &rpc,
        &prices,
        &criteria,
        config.scan.transaction_limit,
        Duration::from_millis(config.rate_limit.scan_wallet_delay_ms),
        Duration::from_millis(config.rate_limit.scan_position_delay_ms),
        now_ms(),
    )
    .await;

    save_signals(&config.paths.signals_file, &report.signals)?;

    println!("\n=== SCAN COMPLETE ===\n");
    println!("Wallets scanned: {}", report.wallets_scanned);
    println!(
        "Wallets failed: {} ({} permanent)",
        report.wallets_failed, report.permanent_failures
    );
    println!("Signals: {}", report.signals.len());

    if !report.signals.is_empty() {
        println!("\nTop signals:");
        for signal in report.signals.iter().take(10) {
            println!(
                "  {} {} {:+.1}% {} ({} days)",
                signal.tier_emoji,
                signal.token_symbol,
                signal.pnl(),
                signal.wallet_name,
                signal.days_held
            );
        }
    }
    Ok(())
}

/// Post new signals, once or until Ctrl-C
pub async fn monitor(config: &Config, once: bool) -> Result<()> {
    let notifier: Box<dyn Notifier> = if config.monitor.telegram_enabled {
        Box::new(TelegramNotifier::from_env(&config.monitor)?)
    } else {
        warn!("Telegram disabled - messages will be printed");
        Box::new(ConsoleNotifier)
    };

    info!(
        "Monitoring {} every {}s via {}",
        config.paths.signals_file.display(),
        config.monitor.interval_secs,
        notifier.name()
    );

    run_monitor(
        &config.paths.signals_file,
        &config.paths.posted_state_file,
        notifier.as_ref(),
        config.monitor.interval_secs,
        once,
    )
    .await?;
    Ok(())
}

/// Check the wallet file; fails when any error is found
pub fn validate(config: &Config) -> Result<()> {
    let path = &config.paths.wallets_file;
    let records: Vec<serde_json::Value> =
        read_json(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let report = validate_records(&records, &config.reconcile.id_prefix);

    println!("\n=== WALLET VALIDATION ===\n");
    println!("File: {}", path.display());
    println!("Records: {}\n", records.len());

    for finding in report
        .findings
        .iter()
        .filter(|f| f.severity == Severity::Error)
    {
        println!("{}", finding);
    }
    for finding in report
        .findings
        .iter()
        .filter(|f| f.severity == Severity::Warning)
    {
        println!("{}", finding);
    }

    println!("\nFleet:");
    println!("{}", report.summary);
    println!("\nErrors: {}", report.errors());
    println!("Warnings: {}", report.warnings());

    if !report.is_ok() {
        return Err(Error::Validation {
            errors: report.errors(),
            warnings: report.warnings(),
        }
        .into());
    }

    println!("\nAll records valid.");
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}
