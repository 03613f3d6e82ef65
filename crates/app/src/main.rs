use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use siphon_client::ApiClient;
use siphon_engine::{EngineConfig, SyncEngine, SyncError};

const DEFAULT_API_BASE: &str = "https://api.up.com.au/api/v1";

/// Pull accounts and transactions from the Up API into a local SQLite
/// ledger. Accounts are refreshed in full; transactions incrementally from
/// each account's stored watermark.
#[derive(Parser)]
#[command(name = "siphon", version)]
struct Cli {
    /// Days of history to fetch, overriding the stored watermark
    /// (0 means "from now on").
    #[arg(long)]
    lookback: Option<i64>,

    /// Sync only this account id (repeatable). Defaults to every account
    /// known to the store after the account refresh.
    #[arg(long = "account")]
    accounts: Vec<String>,

    /// Ledger database path. Defaults to the platform data directory.
    #[arg(long)]
    db: Option<PathBuf>,

    /// API base URL. Defaults to $UP_API_BASE, then the production API.
    /// Point this at a mock server for offline runs.
    #[arg(long)]
    base_url: Option<String>,
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("dev", "siphon", "Siphon")
        .context("could not determine a data directory for the ledger")?;
    Ok(dirs.data_dir().join("ledger.db"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let token = std::env::var("UP_TOKEN").context("UP_TOKEN is not set")?;
    let base_url = cli
        .base_url
        .or_else(|| std::env::var("UP_API_BASE").ok())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("could not create {}", parent.display()))?;
    }

    let db = siphon_storage::create_db(&db_path)
        .await
        .with_context(|| format!("could not open ledger at {}", db_path.display()))?;

    let client = ApiClient::new(&base_url, &token).context("could not build API client")?;
    let engine = SyncEngine::new(
        client,
        db,
        EngineConfig {
            lookback_days: cli.lookback,
            ..EngineConfig::default()
        },
    );

    let account_filter = (!cli.accounts.is_empty()).then_some(cli.accounts.as_slice());

    tracing::info!(%base_url, db = %db_path.display(), "starting sync");
    let summary = match engine.sync(account_filter).await {
        Ok(summary) => summary,
        Err(SyncError::Auth(err)) => {
            tracing::error!(error = %err, "authentication failed");
            std::process::exit(1);
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(
        accounts = summary.accounts.processed,
        transactions = summary.transactions_processed(),
        "sync complete"
    );
    for report in &summary.transactions {
        match &report.error {
            None => tracing::info!(
                account = %report.display_name,
                processed = report.counts.processed,
                failed = report.counts.failed,
                "account synced"
            ),
            Some(err) => tracing::error!(
                account = %report.display_name,
                processed = report.counts.processed,
                error = %err,
                "account sync failed"
            ),
        }
    }
    let failed = summary.failures().count();
    if failed > 0 {
        tracing::error!(failed, "sync finished with account failures");
    }

    Ok(())
}
