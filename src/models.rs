// src/models.rs
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One observed ERC20 transfer, keyed by transaction hash.
///
/// Append-only: a row is written once by the store and never mutated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub transaction_hash: String,
    pub contract_address: String, // lower-cased
    pub symbol: String,
    pub decimals: u8,
    pub sender: String,   // lower-cased
    pub receiver: String, // lower-cased
    pub amount: String,   // exact decimal string (safe for DB + API)
    pub timestamp: DateTime<Utc>,
}

/// One page of transfer history.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub transfers: Vec<TransferRecord>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

/// Token metadata: stored symbol/decimals plus live total supply.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    pub contract_address: String,
    pub token_symbol: String,
    pub token_decimals: u8,
    pub total_supply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Body returned to the webhook caller. Always paired with HTTP 200 so the
/// upstream notifier never retries; detail lives in the logs.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
}
