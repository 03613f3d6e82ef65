use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;

use siphon_client::{parse_account, parse_transaction, ApiClient, AuthError, FetchError};
use siphon_core::{watermark, AccountRef};
use siphon_storage::{DbPool, StoreError};

use crate::report::{AccountSyncReport, RecordCounts, SyncSummary};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("account sync did not finish within {0}s and was aborted")]
    TimedOut(u64),
    #[error("account sync task aborted abnormally")]
    TaskFailed,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Explicit watermark override in days; `None` means resolve per
    /// account from stored history.
    pub lookback_days: Option<i64>,
    /// Upper bound on waiting for the per-account fan-out to join.
    /// Stragglers past this are aborted and reported, not left running.
    pub join_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookback_days: None,
            join_timeout: Duration::from_secs(600),
        }
    }
}

/// Drives a sync run: auth probe, full account refresh, then one concurrent
/// transaction sync task per account.
///
/// Accounts are always refetched in full; the stored balance snapshot must
/// be current on every run. Transactions are incremental by watermark.
pub struct SyncEngine {
    client: ApiClient,
    db: DbPool,
    config: EngineConfig,
}

impl SyncEngine {
    pub fn new(client: ApiClient, db: DbPool, config: EngineConfig) -> Self {
        Self { client, db, config }
    }

    /// Verify the token against `util/ping` before any listing is touched.
    pub async fn authenticate(&self) -> Result<(), SyncError> {
        self.client.ping().await?;
        Ok(())
    }

    /// Full run: authenticate, refresh accounts, sync transactions.
    pub async fn sync(&self, account_ids: Option<&[String]>) -> Result<SyncSummary, SyncError> {
        self.authenticate().await?;
        let accounts = self.sync_accounts().await?;
        let transactions = self.sync_transactions(account_ids).await?;
        Ok(SyncSummary {
            accounts,
            transactions,
        })
    }

    /// Fetch every account page and upsert each record.
    ///
    /// Record-level parse/upsert failures are logged and tallied but do not
    /// stop the listing; a fetch failure aborts it and propagates.
    pub async fn sync_accounts(&self) -> Result<RecordCounts, SyncError> {
        tracing::info!("syncing accounts");
        let mut cursor = self.client.accounts();
        let mut counts = RecordCounts::default();

        while let Some(page) = cursor.next_page().await? {
            let page_records = page.data.len();
            for record in &page.data {
                match parse_account(record) {
                    Ok(account) => {
                        match siphon_storage::upsert_account(&self.db, &account).await {
                            Ok(()) => counts.record_ok(),
                            Err(err) => {
                                counts.record_failed();
                                tracing::warn!(
                                    account_id = %account.id,
                                    error = %err,
                                    "account upsert failed"
                                );
                            }
                        }
                    }
                    Err(err) => {
                        counts.record_failed();
                        tracing::warn!(error = %err, "skipping malformed account record");
                    }
                }
            }
            tracing::info!(records = page_records, "account page applied");
        }

        tracing::info!(
            processed = counts.processed,
            upserted = counts.upserted,
            failed = counts.failed,
            "account sync complete"
        );
        Ok(counts)
    }

    /// Sync transactions for the given accounts, or for every stored
    /// account when `account_ids` is `None`. One task per account, all
    /// outcomes surfaced; the join is bounded by the configured timeout.
    pub async fn sync_transactions(
        &self,
        account_ids: Option<&[String]>,
    ) -> Result<Vec<AccountSyncReport>, SyncError> {
        let known = siphon_storage::list_account_refs(&self.db).await?;
        let targets: Vec<AccountRef> = match account_ids {
            Some(ids) => {
                for id in ids {
                    if !known.iter().any(|r| &r.id == id) {
                        tracing::warn!(account_id = %id, "requested account is not in the store; skipping");
                    }
                }
                known
                    .into_iter()
                    .filter(|r| ids.contains(&r.id))
                    .collect()
            }
            None => known,
        };

        tracing::info!(accounts = targets.len(), "syncing transactions");

        let mut handles = Vec::with_capacity(targets.len());
        for account in targets {
            let client = self.client.clone();
            let db = self.db.clone();
            let lookback = self.config.lookback_days;
            let handle = tokio::spawn(sync_account_transactions(
                client,
                db,
                account.clone(),
                lookback,
            ));
            handles.push((account, handle));
        }

        let deadline = Instant::now() + self.config.join_timeout;
        let mut reports = Vec::with_capacity(handles.len());
        for (account, handle) in handles {
            let abort = handle.abort_handle();
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, handle).await {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(join_err)) => {
                    tracing::error!(
                        account_id = %account.id,
                        error = %join_err,
                        "transaction sync task aborted abnormally"
                    );
                    reports.push(AccountSyncReport::failed(
                        account,
                        RecordCounts::default(),
                        SyncError::TaskFailed,
                    ));
                }
                Err(_) => {
                    abort.abort();
                    tracing::error!(
                        account_id = %account.id,
                        timeout_secs = self.config.join_timeout.as_secs(),
                        "transaction sync timed out; aborting task"
                    );
                    reports.push(AccountSyncReport::failed(
                        account,
                        RecordCounts::default(),
                        SyncError::TimedOut(self.config.join_timeout.as_secs()),
                    ));
                }
            }
        }

        for report in &reports {
            if let Some(err) = &report.error {
                tracing::error!(
                    account = %report.display_name,
                    error = %err,
                    "account transaction sync failed"
                );
            }
        }

        Ok(reports)
    }
}

/// Compute the `since` filter for one account: explicit lookback if given,
/// else the newest stored `created_at`, else the default window.
async fn since_for_account(
    db: &DbPool,
    account_id: &str,
    lookback_days: Option<i64>,
) -> Result<String, StoreError> {
    let latest = siphon_storage::max_transaction_created_at(db, account_id).await?;
    Ok(watermark::resolve(lookback_days, latest, Utc::now()))
}

/// One account's transaction sync, run as its own task.
///
/// Never panics its way out: every exit path produces a report so the
/// orchestrator has an outcome for each account it fanned out to.
async fn sync_account_transactions(
    client: ApiClient,
    db: DbPool,
    account: AccountRef,
    lookback_days: Option<i64>,
) -> AccountSyncReport {
    let mut counts = RecordCounts::default();

    let since = match since_for_account(&db, &account.id, lookback_days).await {
        Ok(since) => since,
        Err(err) => return AccountSyncReport::failed(account, counts, err.into()),
    };

    tracing::info!(account = %account.display_name, %since, "syncing transactions for account");

    let mut cursor = client.transactions(&account.id, &since);
    loop {
        match cursor.next_page().await {
            Ok(Some(page)) => {
                for record in &page.data {
                    match parse_transaction(record, &account.id) {
                        Ok(tx) => {
                            match siphon_storage::upsert_transaction(&db, &tx).await {
                                Ok(()) => counts.record_ok(),
                                Err(err) => {
                                    counts.record_failed();
                                    tracing::warn!(
                                        transaction_id = %tx.id,
                                        account_id = %account.id,
                                        error = %err,
                                        "transaction upsert failed"
                                    );
                                }
                            }
                        }
                        Err(err) => {
                            counts.record_failed();
                            tracing::warn!(
                                account_id = %account.id,
                                error = %err,
                                "skipping malformed transaction record"
                            );
                        }
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                // Pages already applied stay applied; the next run's
                // watermark picks up from whatever landed.
                return AccountSyncReport::failed(account, counts, err.into());
            }
        }
    }

    tracing::info!(
        account = %account.display_name,
        processed = counts.processed,
        upserted = counts.upserted,
        failed = counts.failed,
        "account transactions synced"
    );
    AccountSyncReport::completed(account, counts)
}
