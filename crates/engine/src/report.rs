use siphon_core::AccountRef;

use crate::engine::SyncError;

/// Structured outcome tally for one sync path.
///
/// `processed` counts every record seen, whether or not it made it into the
/// store; `upserted` and `failed` break that down. Parse and upsert
/// failures are contained per record, so `failed > 0` with no path-level
/// error means a partial sync, visible here instead of only in the logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub processed: u64,
    pub upserted: u64,
    pub failed: u64,
}

impl RecordCounts {
    pub(crate) fn record_ok(&mut self) {
        self.processed += 1;
        self.upserted += 1;
    }

    pub(crate) fn record_failed(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }
}

/// The surfaced outcome of one account's transaction sync task.
///
/// `error` is the path-fatal failure (fetch abort, watermark query failure,
/// timeout), if any; `counts` still reflects whatever was applied before it
/// hit. The orchestrator returns one report per target account, always.
#[derive(Debug)]
pub struct AccountSyncReport {
    pub account_id: String,
    pub display_name: String,
    pub counts: RecordCounts,
    pub error: Option<SyncError>,
}

impl AccountSyncReport {
    pub(crate) fn completed(account: AccountRef, counts: RecordCounts) -> Self {
        Self {
            account_id: account.id,
            display_name: account.display_name,
            counts,
            error: None,
        }
    }

    pub(crate) fn failed(account: AccountRef, counts: RecordCounts, error: SyncError) -> Self {
        Self {
            account_id: account.id,
            display_name: account.display_name,
            counts,
            error: Some(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Overall result of a full sync run.
#[derive(Debug)]
pub struct SyncSummary {
    pub accounts: RecordCounts,
    pub transactions: Vec<AccountSyncReport>,
}

impl SyncSummary {
    pub fn transactions_processed(&self) -> u64 {
        self.transactions.iter().map(|r| r.counts.processed).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &AccountSyncReport> {
        self.transactions.iter().filter(|r| !r.succeeded())
    }

    /// True when every account task finished and every record landed.
    pub fn is_clean(&self) -> bool {
        self.accounts.failed == 0
            && self
                .transactions
                .iter()
                .all(|r| r.succeeded() && r.counts.failed == 0)
    }
}
