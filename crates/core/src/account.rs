use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A bank account as the remote API describes it.
///
/// `id` is the remote service's identifier and is stable across syncs, so
/// it doubles as the primary key in the store. The balance is carried three
/// ways, matching the source payload: `balance` as a parsed decimal,
/// `value_str` exactly as the API sent it, and `value_base` in minor units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// The resource type tag (`"accounts"`).
    pub kind: String,
    pub display_name: String,
    pub account_type: String,
    pub ownership_type: String,
    pub balance: Decimal,
    pub currency: String,
    pub value_str: String,
    pub value_base: i64,
    pub created_at: DateTime<Utc>,
}

/// The slice of an account the transaction orchestrator needs: identity
/// plus a human-readable name for logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    pub id: String,
    pub display_name: String,
}
