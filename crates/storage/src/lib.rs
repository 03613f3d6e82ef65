pub mod db;

pub use db::{
    count_accounts, count_transactions, create_db, get_account_by_id, get_transaction_by_id,
    list_account_refs, max_transaction_created_at, transactions_for_account, upsert_account,
    upsert_transaction, DbPool, StoreError,
};
