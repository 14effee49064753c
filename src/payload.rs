// src/payload.rs
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// One log entry lifted out of the webhook envelope, in delivery order.
///
/// `data` and `topics` stay raw here; the event decoder validates them
/// per entry so one corrupt log cannot sink its siblings.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub contract_address: String, // lower-cased
    pub topics: Vec<String>,
    pub data: Option<String>,
    pub tx_hash: String,
    pub tx_status: Option<u64>,
}

/// A decoded webhook delivery: creation timestamp plus ordered log entries.
#[derive(Debug)]
pub struct Delivery {
    pub created_at: DateTime<Utc>,
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed webhook payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

// Wire shape: { createdAt, event: { data: { block: { logs: [...] } } } }.
// Only the envelope spine is structurally required; per-log fields are
// optional here and policed downstream.

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    event: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    data: EventInner,
}

#[derive(Debug, Deserialize)]
struct EventInner {
    block: BlockData,
}

#[derive(Debug, Deserialize)]
struct BlockData {
    logs: Vec<RawLog>,
}

#[derive(Debug, Deserialize)]
struct RawLog {
    #[serde(default)]
    account: Option<AddressRef>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    transaction: Option<TransactionRef>,
}

#[derive(Debug, Deserialize)]
struct AddressRef {
    address: String,
}

#[derive(Debug, Deserialize)]
struct TransactionRef {
    hash: String,
    #[serde(default)]
    status: Option<serde_json::Value>,
}

/// Decode one webhook delivery into an ordered sequence of log entries.
///
/// A payload missing the envelope spine fails the whole batch. A log
/// missing its contract address or transaction hash cannot be resolved or
/// deduplicated and is dropped with a warning; everything else is carried
/// forward for per-entry decoding.
pub fn decode_envelope(payload: serde_json::Value) -> Result<Delivery, PayloadError> {
    let envelope: WebhookEnvelope = serde_json::from_value(payload)?;

    let entries = envelope
        .event
        .data
        .block
        .logs
        .into_iter()
        .filter_map(|log| {
            let contract_address = match &log.account {
                Some(account) => account.address.to_lowercase(),
                None => {
                    warn!("Skipping log without contract address");
                    return None;
                }
            };
            let transaction = match log.transaction {
                Some(tx) => tx,
                None => {
                    warn!("Skipping log without transaction hash (contract {contract_address})");
                    return None;
                }
            };
            let tx_status = transaction.status.as_ref().and_then(status_as_u64);
            Some(LogEntry {
                contract_address,
                topics: log.topics,
                data: log.data,
                tx_hash: transaction.hash,
                tx_status,
            })
        })
        .collect();

    Ok(Delivery {
        created_at: envelope.created_at,
        entries,
    })
}

// Upstream sends status as either a number or a numeric string.
fn status_as_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
