//! Alpha wallet tracker - maintains the tracked wallet list, enriches it with
//! trading statistics and turns open positions into alerts.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use alpha_tracker::cli::commands;
use alpha_tracker::config::Config;
use alpha_tracker::wallet::sources::TOP_TRADER;

/// Alpha wallet tracker
#[derive(Parser)]
#[command(name = "alpha")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "alpha.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge discovery sources into the wallet list, keeping statistics
    Sync,

    /// Rebuild the wallet list from discovery sources (statistics are lost)
    Rebuild {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Restore the wallet list from the imported-wallets file
    Restore {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Add traders from a `[{address, trades}]` file
    Import {
        /// Trader file, e.g. the `holders` export
        file: PathBuf,

        /// Source tag recorded on new wallets
        #[arg(long = "source", default_value = TOP_TRADER)]
        source_tag: String,
    },

    /// Find holders and active traders of a token
    Holders {
        /// Token mint address
        mint: String,

        /// Where to write untracked traders (default: paths.trader_export_file)
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Refresh activity (trade count, last activity) for every wallet
    Analyze,

    /// Compute trading statistics for every wallet
    Stats,

    /// Stats pass that deploys only when the wallet file changed
    Refresh,

    /// Scan wallets for open positions and write signals
    Scan,

    /// Post new signals
    Monitor {
        /// Check once and exit
        #[arg(long)]
        once: bool,
    },

    /// Validate the wallet file
    Validate,

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("alpha_tracker=info".parse()?),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Wallet list: {}", config.paths.wallets_file.display());

    // Execute command
    let result = match cli.command {
        Commands::Sync => commands::sync(&config).await,
        Commands::Rebuild { force } => commands::rebuild(&config, force).await,
        Commands::Restore { force } => commands::restore(&config, force).await,
        Commands::Import { file, source_tag } => {
            commands::import(&config, &file, &source_tag).await
        }
        Commands::Holders { mint, export } => commands::holders(&config, &mint, export).await,
        Commands::Analyze => commands::analyze(&config).await,
        Commands::Stats => commands::stats(&config).await,
        Commands::Refresh => commands::refresh(&config).await,
        Commands::Scan => commands::scan(&config).await,
        Commands::Monitor { once } => commands::monitor(&config, once).await,
        Commands::Validate => commands::validate(&config),
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
