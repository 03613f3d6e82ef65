//! Decoding of raw API records into domain models.
//!
//! Pages arrive as `Vec<serde_json::Value>` (see [`crate::cursor::Page`]);
//! each record is decoded here on its own, so one malformed record is one
//! [`ParseError`] and not a lost page.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

use siphon_core::{Account, Transaction};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("record does not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
    #[error("amount {0:?} is not a decimal")]
    Amount(String),
}

/// The JSON:API-style envelope every record uses: identity and type tag at
/// the top, everything else under `attributes`.
#[derive(Debug, Deserialize)]
struct Resource<A> {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    attributes: A,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoneyObject {
    currency_code: String,
    value: String,
    value_in_base_units: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountAttributes {
    display_name: String,
    account_type: String,
    ownership_type: String,
    balance: MoneyObject,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionAttributes {
    status: String,
    raw_text: Option<String>,
    description: String,
    message: Option<String>,
    is_categorizable: bool,
    amount: MoneyObject,
    card_purchase_method: Option<CardPurchaseMethod>,
    settled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardPurchaseMethod {
    card_number_suffix: Option<String>,
}

fn decode<A: DeserializeOwned>(record: &Value) -> Result<Resource<A>, ParseError> {
    Ok(serde_json::from_value(record.clone())?)
}

pub fn parse_account(record: &Value) -> Result<Account, ParseError> {
    let resource: Resource<AccountAttributes> = decode(record)?;
    let attrs = resource.attributes;
    let balance = Decimal::from_str(&attrs.balance.value)
        .map_err(|_| ParseError::Amount(attrs.balance.value.clone()))?;

    Ok(Account {
        id: resource.id,
        kind: resource.kind,
        display_name: attrs.display_name,
        account_type: attrs.account_type,
        ownership_type: attrs.ownership_type,
        balance,
        currency: attrs.balance.currency_code,
        value_str: attrs.balance.value,
        value_base: attrs.balance.value_in_base_units,
        created_at: attrs.created_at,
    })
}

/// `account_id` comes from the cursor context, not the payload: the listing
/// endpoint is already scoped to one account.
pub fn parse_transaction(record: &Value, account_id: &str) -> Result<Transaction, ParseError> {
    let resource: Resource<TransactionAttributes> = decode(record)?;
    let attrs = resource.attributes;

    Ok(Transaction {
        id: resource.id,
        account_id: account_id.to_string(),
        status: attrs.status,
        raw_text: attrs.raw_text,
        description: attrs.description,
        message: attrs.message,
        categorizable: attrs.is_categorizable,
        currency: attrs.amount.currency_code,
        value_str: attrs.amount.value,
        value_base: attrs.amount.value_in_base_units,
        card_purchase_suffix: attrs
            .card_purchase_method
            .and_then(|m| m.card_number_suffix),
        settled_at: attrs.settled_at,
        created_at: attrs.created_at,
    })
}
