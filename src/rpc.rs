// src/rpc.rs
use alloy::primitives::U256;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("invalid rpc response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
    #[error("rpc response had neither result nor error")]
    MissingResult,
    #[error("invalid hex quantity: {0}")]
    InvalidHex(String),
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: serde_json::Value,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Minimal transaction receipt: we only care whether it exists and whether
/// the transaction reverted.
#[derive(Debug, Clone, Deserialize)]
pub struct Receipt {
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
    pub status: Option<String>, // "0x1" success, "0x0" reverted
}

pub fn http_client() -> Result<Client, RpcError> {
    Ok(Client::builder().timeout(Duration::from_secs(15)).build()?)
}

async fn rpc_call_raw(
    client: &Client,
    rpc_url: &str,
    method: &str,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let payload = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });

    debug!("📡 {} → {}", method, rpc_url);

    let text = client
        .post(rpc_url)
        .json(&payload)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    debug!("📩 {} response: {}", method, text);

    let parsed: RpcResponse = serde_json::from_str(&text)?;
    if let Some(err) = parsed.error {
        return Err(RpcError::Api {
            code: err.code,
            message: err.message,
        });
    }
    Ok(parsed.result)
}

/// Single JSON-RPC call with a typed, non-null result.
pub async fn rpc_call<T: DeserializeOwned>(
    client: &Client,
    rpc_url: &str,
    method: &str,
    params: serde_json::Value,
) -> Result<T, RpcError> {
    let result = rpc_call_raw(client, rpc_url, method, params).await?;
    if result.is_null() {
        return Err(RpcError::MissingResult);
    }
    Ok(serde_json::from_value(result)?)
}

/// Like [`rpc_call`] for methods where a null result is meaningful
/// (eth_getTransactionReceipt before the transaction is mined).
pub async fn rpc_call_nullable<T: DeserializeOwned>(
    client: &Client,
    rpc_url: &str,
    method: &str,
    params: serde_json::Value,
) -> Result<Option<T>, RpcError> {
    let result = rpc_call_raw(client, rpc_url, method, params).await?;
    if result.is_null() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(result)?))
}

/// ERC20 totalSupply() selector.
const TOTAL_SUPPLY_SELECTOR: &str = "0x18160ddd";

/// Live total supply of a token contract via eth_call.
pub async fn get_total_supply(rpc_url: &str, token_address: &str) -> Result<U256, RpcError> {
    let client = http_client()?;
    let result: String = rpc_call(
        &client,
        rpc_url,
        "eth_call",
        json!([{ "to": token_address, "data": TOTAL_SUPPLY_SELECTOR }, "latest"]),
    )
    .await?;
    parse_quantity(&result)
}

/// Fetch a transaction receipt; None while the transaction is unmined.
pub async fn get_transaction_receipt(
    client: &Client,
    rpc_url: &str,
    tx_hash: &str,
) -> Result<Option<Receipt>, RpcError> {
    rpc_call_nullable(client, rpc_url, "eth_getTransactionReceipt", json!([tx_hash])).await
}

/// Parse a 0x-prefixed hex quantity into a U256.
pub fn parse_quantity(raw: &str) -> Result<U256, RpcError> {
    let hex = raw.trim_start_matches("0x");
    if hex.is_empty() {
        return Err(RpcError::InvalidHex(raw.to_string()));
    }
    U256::from_str_radix(hex, 16).map_err(|_| RpcError::InvalidHex(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_padded_quantity() {
        let raw = format!("0x{:064x}", 1_000_000u64);
        assert_eq!(parse_quantity(&raw).unwrap(), U256::from(1_000_000u64));
    }

    #[test]
    fn rejects_bad_quantities() {
        assert!(matches!(parse_quantity("0x"), Err(RpcError::InvalidHex(_))));
        assert!(matches!(
            parse_quantity("0xzz"),
            Err(RpcError::InvalidHex(_))
        ));
    }

    #[test]
    fn rpc_error_body_deserializes() {
        let parsed: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"nonce too low"}}"#,
        )
        .unwrap();
        let err = parsed.error.unwrap();
        assert_eq!(err.code, -32000);
        assert_eq!(err.message, "nonce too low");
    }

    #[test]
    fn null_result_deserializes_as_null() {
        let parsed: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert!(parsed.result.is_null());
        assert!(parsed.error.is_none());
    }

    #[test]
    fn receipt_status_deserializes() {
        let receipt: Receipt = serde_json::from_str(
            r#"{"transactionHash":"0xabc","status":"0x1","blockNumber":"0x10"}"#,
        )
        .unwrap();
        assert_eq!(receipt.status.as_deref(), Some("0x1"));
    }
}
