// src/chain.rs
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::decoder::address_lc;
use crate::rpc::{self, RpcError};

/// Handle for a submitted transaction (its hash).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxHandle(pub String);

#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("transaction {0} reverted")]
    Reverted(String),
    #[error("no receipt for {0} after {1} polls")]
    ConfirmationTimeout(String, u32),
}

/// On-chain collaborator of the settlement engine.
///
/// Connection management, signing and transient-failure retries live behind
/// this boundary; the engine only sequences calls against it.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Mint `amount` of the configured token to `to`.
    async fn submit_mint(&self, to: Address, amount: U256) -> Result<TxHandle, ChainError>;

    /// Transfer `amount` of the configured token to `to`.
    async fn submit_forward(&self, to: Address, amount: U256) -> Result<TxHandle, ChainError>;

    /// Block until the transaction is mined; error on revert or timeout.
    async fn await_confirmation(&self, tx: &TxHandle) -> Result<(), ChainError>;
}

// ERC20 function selectors
const MINT_SELECTOR: &str = "40c10f19"; // mint(address,uint256)
const TRANSFER_SELECTOR: &str = "a9059cbb"; // transfer(address,uint256)

/// JSON-RPC implementation: submission goes to a wallet-backed RPC
/// (eth_sendTransaction, key custody on that side), receipts are polled on
/// the public RPC.
pub struct HttpChainClient {
    client: Client,
    tx_rpc_url: String,
    receipt_rpc_url: String,
    service_wallet: Address,
    minted_token: Address,
    poll_interval: Duration,
    max_polls: u32,
}

impl HttpChainClient {
    pub fn new(
        tx_rpc_url: String,
        receipt_rpc_url: String,
        service_wallet: Address,
        minted_token: Address,
    ) -> Result<Self, ChainError> {
        Ok(Self {
            client: rpc::http_client()?,
            tx_rpc_url,
            receipt_rpc_url,
            service_wallet,
            minted_token,
            poll_interval: Duration::from_secs(3),
            max_polls: 40, // ~2 minutes; Sepolia block time is 12s
        })
    }

    async fn send_contract_call(&self, calldata: String) -> Result<TxHandle, ChainError> {
        let hash: String = rpc::rpc_call(
            &self.client,
            &self.tx_rpc_url,
            "eth_sendTransaction",
            json!([{
                "from": address_lc(&self.service_wallet),
                "to": address_lc(&self.minted_token),
                "data": calldata,
            }]),
        )
        .await?;
        Ok(TxHandle(hash))
    }
}

/// ABI-encode a `selector(address,uint256)` call.
fn encode_call(selector: &str, to: Address, amount: U256) -> String {
    let addr_word = format!("{:0>64}", hex::encode(to.as_slice()));
    let amount_word = format!("{:0>64}", format!("{amount:x}"));
    format!("0x{selector}{addr_word}{amount_word}")
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn submit_mint(&self, to: Address, amount: U256) -> Result<TxHandle, ChainError> {
        self.send_contract_call(encode_call(MINT_SELECTOR, to, amount))
            .await
    }

    async fn submit_forward(&self, to: Address, amount: U256) -> Result<TxHandle, ChainError> {
        self.send_contract_call(encode_call(TRANSFER_SELECTOR, to, amount))
            .await
    }

    async fn await_confirmation(&self, tx: &TxHandle) -> Result<(), ChainError> {
        for _ in 0..self.max_polls {
            let receipt =
                rpc::get_transaction_receipt(&self.client, &self.receipt_rpc_url, &tx.0).await?;
            match receipt {
                Some(r) => {
                    if r.status.as_deref() == Some("0x0") {
                        return Err(ChainError::Reverted(tx.0.clone()));
                    }
                    debug!("Receipt confirmed for {}", r.transaction_hash);
                    return Ok(());
                }
                None => tokio::time::sleep(self.poll_interval).await,
            }
        }
        Err(ChainError::ConfirmationTimeout(tx.0.clone(), self.max_polls))
    }
}

#[cfg(test)]
pub mod mock {
    //! Recording chain client for settlement tests.

    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ChainCall {
        Mint { to: Address, amount: U256 },
        Forward { to: Address, amount: U256 },
        Confirm { tx: String },
    }

    /// Clones share the call log, so a handle kept outside the engine
    /// observes everything the engine did.
    #[derive(Default, Clone)]
    pub struct MockChainClient {
        pub calls: Arc<Mutex<Vec<ChainCall>>>,
        pub fail_mint: bool,
        pub fail_confirmation: bool,
        pub fail_forward: bool,
    }

    impl MockChainClient {
        pub fn recorded(&self) -> Vec<ChainCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChainClient for MockChainClient {
        async fn submit_mint(&self, to: Address, amount: U256) -> Result<TxHandle, ChainError> {
            if self.fail_mint {
                return Err(ChainError::Rpc(RpcError::MissingResult));
            }
            self.calls
                .lock()
                .unwrap()
                .push(ChainCall::Mint { to, amount });
            Ok(TxHandle("0xmint".to_string()))
        }

        async fn submit_forward(&self, to: Address, amount: U256) -> Result<TxHandle, ChainError> {
            if self.fail_forward {
                return Err(ChainError::Rpc(RpcError::MissingResult));
            }
            self.calls
                .lock()
                .unwrap()
                .push(ChainCall::Forward { to, amount });
            Ok(TxHandle("0xforward".to_string()))
        }

        async fn await_confirmation(&self, tx: &TxHandle) -> Result<(), ChainError> {
            if self.fail_confirmation {
                return Err(ChainError::ConfirmationTimeout(tx.0.clone(), 0));
            }
            self.calls
                .lock()
                .unwrap()
                .push(ChainCall::Confirm { tx: tx.0.clone() });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn encodes_mint_calldata() {
        let to = Address::from_str("0x1111111111111111111111111111111111111111").unwrap();
        let data = encode_call(MINT_SELECTOR, to, U256::from(5u64));
        assert_eq!(data.len(), 2 + 8 + 64 + 64);
        assert!(data.starts_with("0x40c10f19"));
        assert!(data.contains("0000000000000000000000001111111111111111111111111111111111111111"));
        assert!(data.ends_with(&format!("{:064x}", 5)));
    }

    #[test]
    fn encodes_full_width_amount() {
        let to = Address::from_str("0x2222222222222222222222222222222222222222").unwrap();
        let data = encode_call(TRANSFER_SELECTOR, to, U256::MAX);
        assert_eq!(data.len(), 2 + 8 + 64 + 64);
        assert!(data.starts_with("0xa9059cbb"));
        assert!(data.ends_with(&"f".repeat(64)));
    }
}
