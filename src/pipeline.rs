// src/pipeline.rs
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::amount;
use crate::chain::ChainClient;
use crate::db::{self, InsertOutcome};
use crate::decoder::{self, address_lc};
use crate::models::TransferRecord;
use crate::payload::{Delivery, LogEntry};
use crate::registry::TokenRegistry;
use crate::settlement::{SettlementEngine, SettlementState};

/// What happened to a single log entry. Everything except a recorded entry
/// is invisible to the webhook caller; this is the operational record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Recorded(SettlementState),
    UnknownToken,
    Duplicate,
    DecodeSkipped,
    StoreFailed,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DeliverySummary {
    pub recorded: usize,
    pub settled: usize,
    pub settlement_failures: usize,
    pub duplicates: usize,
    pub unknown: usize,
    pub skipped: usize,
    pub store_failures: usize,
}

impl DeliverySummary {
    fn tally(&mut self, outcome: EntryOutcome) {
        match outcome {
            EntryOutcome::Recorded(state) => {
                self.recorded += 1;
                match state {
                    SettlementState::Settled => self.settled += 1,
                    SettlementState::Failed => self.settlement_failures += 1,
                    _ => {}
                }
            }
            EntryOutcome::Duplicate => self.duplicates += 1,
            EntryOutcome::UnknownToken => self.unknown += 1,
            EntryOutcome::DecodeSkipped => self.skipped += 1,
            EntryOutcome::StoreFailed => self.store_failures += 1,
        }
    }
}

/// Per-delivery processing: registry filter → dedup gate → event decode →
/// normalize → store → settlement, strictly in delivery order.
pub struct Pipeline<C> {
    conn: Arc<Mutex<Connection>>,
    registry: TokenRegistry,
    engine: SettlementEngine<C>,
}

impl<C: ChainClient> Pipeline<C> {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        registry: TokenRegistry,
        engine: SettlementEngine<C>,
    ) -> Self {
        Self {
            conn,
            registry,
            engine,
        }
    }

    pub async fn process_delivery(&self, delivery: Delivery) -> DeliverySummary {
        info!("Received {} logs", delivery.entries.len());

        let mut summary = DeliverySummary::default();
        for entry in &delivery.entries {
            let outcome = self.process_entry(entry, delivery.created_at).await;
            summary.tally(outcome);
        }

        info!(
            "Delivery processed: {} recorded ({} settled, {} settlement failures), {} duplicates, {} unknown, {} skipped, {} store failures",
            summary.recorded,
            summary.settled,
            summary.settlement_failures,
            summary.duplicates,
            summary.unknown,
            summary.skipped,
            summary.store_failures,
        );
        summary
    }

    async fn process_entry(
        &self,
        entry: &LogEntry,
        created_at: DateTime<Utc>,
    ) -> EntryOutcome {
        debug!(
            "Processing log from {} (tx {}, status {:?})",
            entry.contract_address, entry.tx_hash, entry.tx_status
        );

        // Unknown contracts are the common case, not an error.
        let token = match self.registry.resolve(&entry.contract_address) {
            Some(token) => token,
            None => {
                debug!("Ignoring log from untracked contract {}", entry.contract_address);
                return EntryOutcome::UnknownToken;
            }
        };

        // Cheap gate before decode work; the primary key below is the
        // authoritative check.
        let exists = {
            let conn = self.conn.lock().unwrap();
            db::exists_by_hash(&conn, &entry.tx_hash)
        };
        match exists {
            Ok(true) => {
                debug!("Transfer {} already recorded", entry.tx_hash);
                return EntryOutcome::Duplicate;
            }
            Ok(false) => {}
            Err(e) => {
                error!("Dedup check failed for {}: {e:?}", entry.tx_hash);
                return EntryOutcome::StoreFailed;
            }
        }

        let decoded = match decoder::decode_transfer(&entry.topics, entry.data.as_deref()) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Skipping undecodable log in tx {}: {e}", entry.tx_hash);
                return EntryOutcome::DecodeSkipped;
            }
        };

        let amount = amount::normalize(decoded.raw_value, token.decimals);
        let record = TransferRecord {
            transaction_hash: entry.tx_hash.clone(),
            contract_address: entry.contract_address.clone(),
            symbol: token.symbol.clone(),
            decimals: token.decimals,
            sender: address_lc(&decoded.sender),
            receiver: address_lc(&decoded.receiver),
            amount: amount.clone(),
            timestamp: created_at,
        };

        let inserted = {
            let conn = self.conn.lock().unwrap();
            db::insert_if_absent(&conn, &record)
        };
        match inserted {
            Ok(InsertOutcome::Inserted) => {
                info!("Saved {} {} ({})", amount, token.symbol, entry.tx_hash);
            }
            Ok(InsertOutcome::AlreadyPresent) => {
                // A concurrent delivery won the race; same as the gate firing.
                debug!("Insert for {} lost a duplicate race", entry.tx_hash);
                return EntryOutcome::Duplicate;
            }
            Err(e) => {
                error!("Failed to store transfer {}: {e:?}", entry.tx_hash);
                return EntryOutcome::StoreFailed;
            }
        }

        let state = self
            .engine
            .settle(&entry.contract_address, &decoded, token.decimals)
            .await;
        EntryOutcome::Recorded(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{ChainCall, MockChainClient};
    use crate::config::{Config, TokenEntry};
    use crate::payload;
    use alloy::primitives::{Address, U256};
    use serde_json::json;
    use std::str::FromStr;

    const SERVICE_WALLET: &str = "0x9999999999999999999999999999999999999999";
    const USDC: &str = "0x1c7d4b196cb0c7b01d743fbc6116a902379c7238";
    const EURC: &str = "0x08210f9170f89ab7658f0b5e3ff39b0e03c594d4";
    const DEPOSITOR: &str = "0x1111111111111111111111111111111111111111";

    fn config() -> Config {
        Config {
            rpc_http_url: "http://localhost:8545".to_string(),
            tx_rpc_url: "http://localhost:8545".to_string(),
            db_path: ":memory:".to_string(),
            port: 3000,
            service_wallet: Address::from_str(SERVICE_WALLET).unwrap(),
            trigger_token: Address::from_str(USDC).unwrap(),
            minted_token: Address::from_str("0xc2c9a6d4c2699349f69de33df8ed8a90db908944")
                .unwrap(),
            minted_token_decimals: 18,
            mint_multiplier: 10,
            tokens: vec![
                TokenEntry {
                    address: USDC.to_string(),
                    symbol: "USDC".to_string(),
                    decimals: 6,
                },
                TokenEntry {
                    address: EURC.to_string(),
                    symbol: "EURC".to_string(),
                    decimals: 6,
                },
            ],
        }
    }

    fn pipeline(chain: MockChainClient) -> Pipeline<MockChainClient> {
        let cfg = config();
        let conn = Connection::open_in_memory().unwrap();
        db::run_migrations(&conn).unwrap();
        Pipeline::new(
            Arc::new(Mutex::new(conn)),
            TokenRegistry::from_entries(&cfg.tokens),
            SettlementEngine::new(chain, &cfg),
        )
    }

    fn log(contract: &str, receiver: &str, raw_value: u64, hash: &str) -> serde_json::Value {
        json!({
            "account": { "address": contract },
            "topics": [
                decoder::TRANSFER_TOPIC,
                format!("0x{:0>64}", DEPOSITOR.trim_start_matches("0x")),
                format!("0x{:0>64}", receiver.trim_start_matches("0x")),
            ],
            "data": format!("0x{raw_value:064x}"),
            "transaction": { "hash": hash, "status": 1 }
        })
    }

    fn delivery(logs: serde_json::Value) -> payload::Delivery {
        payload::decode_envelope(json!({
            "createdAt": "2024-06-01T12:00:00.000Z",
            "event": { "data": { "block": { "logs": logs } } }
        }))
        .unwrap()
    }

    fn stored_count(p: &Pipeline<MockChainClient>) -> u64 {
        let conn = p.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM transfers", [], |r| r.get::<_, i64>(0))
            .unwrap() as u64
    }

    #[tokio::test]
    async fn repeated_delivery_records_once() {
        let p = pipeline(MockChainClient::default());
        let logs = json!([log(EURC, DEPOSITOR, 5_000_000, "0xaa")]);

        let first = p.process_delivery(delivery(logs.clone())).await;
        assert_eq!(first.recorded, 1);

        let second = p.process_delivery(delivery(logs)).await;
        assert_eq!(second.recorded, 0);
        assert_eq!(second.duplicates, 1);
        assert_eq!(stored_count(&p), 1);
    }

    #[tokio::test]
    async fn duplicate_within_one_batch_records_once() {
        let p = pipeline(MockChainClient::default());
        let logs = json!([
            log(EURC, DEPOSITOR, 5_000_000, "0xaa"),
            log(EURC, DEPOSITOR, 5_000_000, "0xaa"),
        ]);
        let summary = p.process_delivery(delivery(logs)).await;
        assert_eq!(summary.recorded, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(stored_count(&p), 1);
    }

    #[tokio::test]
    async fn unknown_contract_never_reaches_decode_or_store() {
        let p = pipeline(MockChainClient::default());
        let logs = json!([log(
            "0x000000000000000000000000000000000000dead",
            DEPOSITOR,
            5_000_000,
            "0xaa"
        )]);
        let summary = p.process_delivery(delivery(logs)).await;
        assert_eq!(summary.unknown, 1);
        assert_eq!(summary.recorded, 0);
        assert_eq!(stored_count(&p), 0);
    }

    #[tokio::test]
    async fn corrupt_entry_does_not_abort_batch() {
        let p = pipeline(MockChainClient::default());
        let mut bad = log(EURC, DEPOSITOR, 1, "0xbad");
        bad["data"] = json!("0xnothex");
        let logs = json!([bad, log(EURC, DEPOSITOR, 5_000_000, "0xgood")]);

        let summary = p.process_delivery(delivery(logs)).await;
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.recorded, 1);
        assert_eq!(stored_count(&p), 1);
    }

    #[tokio::test]
    async fn qualifying_deposit_settles_with_exact_amounts() {
        let chain = MockChainClient::default();
        let p = pipeline(chain.clone());
        let logs = json!([log(USDC, SERVICE_WALLET, 5_000_000, "0xaa")]);

        let summary = p.process_delivery(delivery(logs)).await;
        assert_eq!(summary.recorded, 1);
        assert_eq!(summary.settled, 1);

        let expected = U256::from_str("50000000000000000000").unwrap();
        let calls = chain.recorded();
        assert_eq!(
            calls,
            vec![
                ChainCall::Mint {
                    to: Address::from_str(SERVICE_WALLET).unwrap(),
                    amount: expected,
                },
                ChainCall::Confirm {
                    tx: "0xmint".to_string(),
                },
                ChainCall::Forward {
                    to: Address::from_str(DEPOSITOR).unwrap(),
                    amount: expected,
                },
            ]
        );
    }

    #[tokio::test]
    async fn near_miss_deposits_trigger_nothing() {
        let chain = MockChainClient::default();
        let p = pipeline(chain.clone());
        let logs = json!([
            // right token, wrong receiver
            log(USDC, DEPOSITOR, 5_000_000, "0xaa"),
            // right receiver, wrong token
            log(EURC, SERVICE_WALLET, 5_000_000, "0xbb"),
        ]);

        let summary = p.process_delivery(delivery(logs)).await;
        assert_eq!(summary.recorded, 2);
        assert_eq!(summary.settled, 0);
        assert!(chain.recorded().is_empty());
    }

    #[tokio::test]
    async fn failed_settlement_keeps_the_record() {
        let chain = MockChainClient {
            fail_mint: true,
            ..Default::default()
        };
        let p = pipeline(chain.clone());
        let logs = json!([log(USDC, SERVICE_WALLET, 5_000_000, "0xaa")]);

        let summary = p.process_delivery(delivery(logs)).await;
        assert_eq!(summary.recorded, 1);
        assert_eq!(summary.settlement_failures, 1);
        assert_eq!(summary.settled, 0);
        assert_eq!(stored_count(&p), 1);
    }

    #[tokio::test]
    async fn stored_amount_is_normalized() {
        let p = pipeline(MockChainClient::default());
        let logs = json!([log(EURC, DEPOSITOR, 1_500_000, "0xaa")]);
        p.process_delivery(delivery(logs)).await;

        let conn = p.conn.lock().unwrap();
        let (amount, sender): (String, String) = conn
            .query_row(
                "SELECT amount, sender FROM transfers WHERE transaction_hash = '0xaa'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(amount, "1.5");
        assert_eq!(sender, DEPOSITOR);
    }
}
