use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single transaction belonging to one account.
///
/// `created_at` drives incremental sync: it is the field the watermark
/// resolver reads back out of the store to compute the next `since` filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    pub status: String,
    pub raw_text: Option<String>,
    pub description: String,
    pub message: Option<String>,
    pub categorizable: bool,
    pub currency: String,
    pub value_str: String,
    pub value_base: i64,
    /// Last four digits of the card, when this was a card purchase.
    pub card_purchase_suffix: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
