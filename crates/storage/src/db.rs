use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use siphon_core::{Account, AccountRef, Transaction};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("stored timestamp {0:?} is not RFC 3339")]
    Timestamp(String),
    #[error("stored balance {0:?} is not a decimal")]
    Balance(String),
}

/// Open (creating if needed) the ledger database and run migrations.
///
/// The connect options apply per pooled connection, so every checkout sees
/// WAL mode and enforced foreign keys. Concurrent sync tasks each check out
/// their own connection; the pool serializes nothing beyond that.
pub async fn create_db(path: &Path) -> Result<DbPool, StoreError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5))
        .pragma("cache_size", "-32000");

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            display_name TEXT NOT NULL,
            account_type TEXT NOT NULL,
            ownership_type TEXT NOT NULL,
            balance TEXT NOT NULL,
            currency TEXT NOT NULL,
            value_str TEXT NOT NULL,
            value_base INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES accounts(id),
            status TEXT NOT NULL,
            raw_text TEXT,
            description TEXT NOT NULL,
            message TEXT,
            categorizable INTEGER NOT NULL,
            currency TEXT NOT NULL,
            value_str TEXT NOT NULL,
            value_base INTEGER NOT NULL,
            card_purchase_suffix TEXT,
            settled_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_transactions_account_created
        ON transactions(account_id, created_at)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

// Timestamps are stored as RFC 3339 UTC text with a fixed `+00:00` offset,
// so lexicographic MAX on the column equals chronological max.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn parse_ts(raw: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Timestamp(raw))
}

/// Insert or fully replace an account by primary key.
///
/// Every column is overwritten on conflict: replaying the same payload is
/// a no-op and a changed payload leaves no stale fields behind.
pub async fn upsert_account(pool: &DbPool, account: &Account) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO accounts
            (id, kind, display_name, account_type, ownership_type,
             balance, currency, value_str, value_base, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            kind = excluded.kind,
            display_name = excluded.display_name,
            account_type = excluded.account_type,
            ownership_type = excluded.ownership_type,
            balance = excluded.balance,
            currency = excluded.currency,
            value_str = excluded.value_str,
            value_base = excluded.value_base,
            created_at = excluded.created_at
        "#,
    )
    .bind(&account.id)
    .bind(&account.kind)
    .bind(&account.display_name)
    .bind(&account.account_type)
    .bind(&account.ownership_type)
    .bind(account.balance.to_string())
    .bind(&account.currency)
    .bind(&account.value_str)
    .bind(account.value_base)
    .bind(format_ts(account.created_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert or fully replace a transaction by primary key. A missing parent
/// account surfaces as a foreign-key `StoreError`; callers treat that as a
/// per-record failure.
pub async fn upsert_transaction(pool: &DbPool, tx: &Transaction) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO transactions
            (id, account_id, status, raw_text, description, message,
             categorizable, currency, value_str, value_base,
             card_purchase_suffix, settled_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            account_id = excluded.account_id,
            status = excluded.status,
            raw_text = excluded.raw_text,
            description = excluded.description,
            message = excluded.message,
            categorizable = excluded.categorizable,
            currency = excluded.currency,
            value_str = excluded.value_str,
            value_base = excluded.value_base,
            card_purchase_suffix = excluded.card_purchase_suffix,
            settled_at = excluded.settled_at,
            created_at = excluded.created_at
        "#,
    )
    .bind(&tx.id)
    .bind(&tx.account_id)
    .bind(&tx.status)
    .bind(&tx.raw_text)
    .bind(&tx.description)
    .bind(&tx.message)
    .bind(tx.categorizable)
    .bind(&tx.currency)
    .bind(&tx.value_str)
    .bind(tx.value_base)
    .bind(&tx.card_purchase_suffix)
    .bind(tx.settled_at.map(format_ts))
    .bind(format_ts(tx.created_at))
    .execute(pool)
    .await?;

    Ok(())
}

type AccountRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
);

fn account_from_row(row: AccountRow) -> Result<Account, StoreError> {
    let balance = Decimal::from_str(&row.5).map_err(|_| StoreError::Balance(row.5.clone()))?;
    Ok(Account {
        id: row.0,
        kind: row.1,
        display_name: row.2,
        account_type: row.3,
        ownership_type: row.4,
        balance,
        currency: row.6,
        value_str: row.7,
        value_base: row.8,
        created_at: parse_ts(row.9)?,
    })
}

pub async fn get_account_by_id(
    pool: &DbPool,
    account_id: &str,
) -> Result<Option<Account>, StoreError> {
    let row = sqlx::query_as::<_, AccountRow>(
        r#"
        SELECT id, kind, display_name, account_type, ownership_type,
               balance, currency, value_str, value_base, created_at
        FROM accounts WHERE id = ?
        "#,
    )
    .bind(account_id)
    .fetch_optional(pool)
    .await?;

    row.map(account_from_row).transpose()
}

/// Identity and display name of every stored account, the inputs the
/// transaction orchestrator fans out over.
pub async fn list_account_refs(pool: &DbPool) -> Result<Vec<AccountRef>, StoreError> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT id, display_name FROM accounts ORDER BY display_name, id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, display_name)| AccountRef { id, display_name })
        .collect())
}

/// The newest `created_at` stored for one account, or `None` when the
/// account has no transactions yet.
pub async fn max_transaction_created_at(
    pool: &DbPool,
    account_id: &str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    let (raw,): (Option<String>,) =
        sqlx::query_as("SELECT MAX(created_at) FROM transactions WHERE account_id = ?")
            .bind(account_id)
            .fetch_one(pool)
            .await?;

    raw.map(parse_ts).transpose()
}

type TransactionRow = (
    String,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    bool,
    String,
    String,
    i64,
    Option<String>,
    Option<String>,
    String,
);

fn transaction_from_row(row: TransactionRow) -> Result<Transaction, StoreError> {
    Ok(Transaction {
        id: row.0,
        account_id: row.1,
        status: row.2,
        raw_text: row.3,
        description: row.4,
        message: row.5,
        categorizable: row.6,
        currency: row.7,
        value_str: row.8,
        value_base: row.9,
        card_purchase_suffix: row.10,
        settled_at: row.11.map(parse_ts).transpose()?,
        created_at: parse_ts(row.12)?,
    })
}

const TRANSACTION_COLUMNS: &str = "id, account_id, status, raw_text, description, message, \
     categorizable, currency, value_str, value_base, \
     card_purchase_suffix, settled_at, created_at";

pub async fn get_transaction_by_id(
    pool: &DbPool,
    transaction_id: &str,
) -> Result<Option<Transaction>, StoreError> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?"
    ))
    .bind(transaction_id)
    .fetch_optional(pool)
    .await?;

    row.map(transaction_from_row).transpose()
}

pub async fn transactions_for_account(
    pool: &DbPool,
    account_id: &str,
) -> Result<Vec<Transaction>, StoreError> {
    let rows = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE account_id = ? ORDER BY created_at"
    ))
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(transaction_from_row).collect()
}

pub async fn count_accounts(pool: &DbPool) -> Result<i64, StoreError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn count_transactions(pool: &DbPool) -> Result<i64, StoreError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM transactions")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn test_db() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("ledger.db")).await.unwrap();
        (dir, pool)
    }

    fn ts(y: i32, mo: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, 0, 0, 0).unwrap()
    }

    fn spending_account() -> Account {
        Account {
            id: "acc-1".into(),
            kind: "accounts".into(),
            display_name: "Spending".into(),
            account_type: "TRANSACTIONAL".into(),
            ownership_type: "INDIVIDUAL".into(),
            balance: Decimal::from_str("127.50").unwrap(),
            currency: "AUD".into(),
            value_str: "127.50".into(),
            value_base: 12750,
            created_at: ts(2024, 1, 1),
        }
    }

    fn pizza_transaction(id: &str, account_id: &str, created_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id: id.into(),
            account_id: account_id.into(),
            status: "SETTLED".into(),
            raw_text: None,
            description: "David Taylor".into(),
            message: Some("Money for the pizzas last night.".into()),
            categorizable: true,
            currency: "AUD".into(),
            value_str: "-59.98".into(),
            value_base: -5998,
            card_purchase_suffix: Some("1234".into()),
            settled_at: Some(created_at),
            created_at,
        }
    }

    #[tokio::test]
    async fn upsert_account_is_idempotent() {
        let (_dir, pool) = test_db().await;
        let account = spending_account();

        upsert_account(&pool, &account).await.unwrap();
        upsert_account(&pool, &account).await.unwrap();

        assert_eq!(count_accounts(&pool).await.unwrap(), 1);
        let stored = get_account_by_id(&pool, "acc-1").await.unwrap().unwrap();
        assert_eq!(stored, account);
    }

    #[tokio::test]
    async fn upsert_account_replaces_every_field() {
        let (_dir, pool) = test_db().await;
        upsert_account(&pool, &spending_account()).await.unwrap();

        let mut changed = spending_account();
        changed.display_name = "Everyday".into();
        changed.balance = Decimal::from_str("0.01").unwrap();
        changed.value_str = "0.01".into();
        changed.value_base = 1;
        upsert_account(&pool, &changed).await.unwrap();

        assert_eq!(count_accounts(&pool).await.unwrap(), 1);
        let stored = get_account_by_id(&pool, "acc-1").await.unwrap().unwrap();
        assert_eq!(stored, changed);
    }

    #[tokio::test]
    async fn upsert_transaction_is_idempotent_and_convergent() {
        let (_dir, pool) = test_db().await;
        upsert_account(&pool, &spending_account()).await.unwrap();

        let tx = pizza_transaction("txn-1", "acc-1", ts(2024, 6, 6));
        upsert_transaction(&pool, &tx).await.unwrap();
        upsert_transaction(&pool, &tx).await.unwrap();
        assert_eq!(count_transactions(&pool).await.unwrap(), 1);

        let mut changed = tx.clone();
        changed.status = "HELD".into();
        changed.settled_at = None;
        changed.message = None;
        upsert_transaction(&pool, &changed).await.unwrap();

        let stored = get_transaction_by_id(&pool, "txn-1").await.unwrap().unwrap();
        assert_eq!(stored, changed);
        assert_eq!(count_transactions(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn transaction_without_account_is_rejected() {
        let (_dir, pool) = test_db().await;
        let orphan = pizza_transaction("txn-1", "no-such-account", ts(2024, 6, 6));

        assert!(matches!(
            upsert_transaction(&pool, &orphan).await,
            Err(StoreError::Db(_))
        ));
        assert_eq!(count_transactions(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn max_created_at_reflects_stored_history() {
        let (_dir, pool) = test_db().await;
        upsert_account(&pool, &spending_account()).await.unwrap();

        assert_eq!(
            max_transaction_created_at(&pool, "acc-1").await.unwrap(),
            None
        );

        for (id, day) in [("txn-1", 3), ("txn-2", 9), ("txn-3", 6)] {
            upsert_transaction(&pool, &pizza_transaction(id, "acc-1", ts(2024, 6, day)))
                .await
                .unwrap();
        }

        assert_eq!(
            max_transaction_created_at(&pool, "acc-1").await.unwrap(),
            Some(ts(2024, 6, 9))
        );
        // Scoped per account, not global.
        assert_eq!(
            max_transaction_created_at(&pool, "acc-2").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn account_refs_list_identity_and_name() {
        let (_dir, pool) = test_db().await;
        let mut second = spending_account();
        second.id = "acc-2".into();
        second.display_name = "Savings".into();

        upsert_account(&pool, &spending_account()).await.unwrap();
        upsert_account(&pool, &second).await.unwrap();

        let refs = list_account_refs(&pool).await.unwrap();
        assert_eq!(
            refs,
            vec![
                AccountRef {
                    id: "acc-2".into(),
                    display_name: "Savings".into()
                },
                AccountRef {
                    id: "acc-1".into(),
                    display_name: "Spending".into()
                },
            ]
        );
    }
}
