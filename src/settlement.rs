// src/settlement.rs
use alloy::primitives::{Address, U256};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::chain::{ChainClient, ChainError};
use crate::config::Config;
use crate::decoder::{address_lc, DecodedTransfer};

/// Lifecycle of one settlement attempt. `NotTriggered` and `Settled` are the
/// happy terminals; `Failed` is reachable from the mint and forward steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementState {
    NotTriggered,
    MintPending,
    MintConfirmed,
    ForwardSubmitted,
    Settled,
    Failed,
}

/// Mint-then-forward settlement for qualifying deposits.
///
/// A deposit qualifies when it arrives on the trigger token and its receiver
/// is the service wallet. The wallet signs both transactions, so submission
/// is serialized process-wide: the lock spans the whole mint+forward
/// sequence of each attempt.
pub struct SettlementEngine<C> {
    chain: C,
    trigger_token: String, // lower-cased
    service_wallet: Address,
    minted_token_decimals: u8,
    mint_multiplier: u64,
    wallet_lock: Mutex<()>,
}

impl<C: ChainClient> SettlementEngine<C> {
    pub fn new(chain: C, cfg: &Config) -> Self {
        Self {
            chain,
            trigger_token: address_lc(&cfg.trigger_token),
            service_wallet: cfg.service_wallet,
            minted_token_decimals: cfg.minted_token_decimals,
            mint_multiplier: cfg.mint_multiplier,
            wallet_lock: Mutex::new(()),
        }
    }

    /// Evaluate one newly persisted transfer and, when it qualifies, run the
    /// full sequential settlement. Never retries; a failure leaves the
    /// deposit recorded but unsettled.
    pub async fn settle(
        &self,
        contract_address: &str,
        transfer: &DecodedTransfer,
        source_decimals: u8,
    ) -> SettlementState {
        if contract_address.to_lowercase() != self.trigger_token
            || transfer.receiver != self.service_wallet
        {
            return SettlementState::NotTriggered;
        }

        let mint_amount = match compute_mint_amount(
            transfer.raw_value,
            source_decimals,
            self.minted_token_decimals,
            self.mint_multiplier,
        ) {
            Some(amount) => amount,
            None => {
                error!(
                    "Settlement amount computation failed for deposit {} (source decimals {}, target decimals {})",
                    transfer.raw_value, source_decimals, self.minted_token_decimals
                );
                return SettlementState::Failed;
            }
        };

        let depositor = transfer.sender;

        // One signing wallet: hold the lock across both submissions so no
        // other settlement interleaves its nonce usage.
        let _wallet = self.wallet_lock.lock().await;

        info!(
            "Minting {} to service wallet for depositor {}",
            mint_amount,
            address_lc(&depositor)
        );

        transition(SettlementState::MintPending);
        let mint_tx = match self.chain.submit_mint(self.service_wallet, mint_amount).await {
            Ok(tx) => tx,
            Err(e) => return fail("mint submission", &e),
        };

        if let Err(e) = self.chain.await_confirmation(&mint_tx).await {
            return fail("mint confirmation", &e);
        }
        transition(SettlementState::MintConfirmed);

        let forward_tx = match self.chain.submit_forward(depositor, mint_amount).await {
            Ok(tx) => tx,
            Err(e) => return fail("forward submission", &e),
        };
        transition(SettlementState::ForwardSubmitted);

        info!(
            "Settlement complete. Mint TX: {}, Forward TX: {} ({} forwarded to {})",
            mint_tx.0,
            forward_tx.0,
            mint_amount,
            address_lc(&depositor)
        );
        transition(SettlementState::Settled)
    }
}

fn transition(state: SettlementState) -> SettlementState {
    tracing::debug!("Settlement state: {state:?}");
    state
}

fn fail(step: &str, err: &ChainError) -> SettlementState {
    error!("Settlement failed at {step}: {err}");
    SettlementState::Failed
}

/// Scale a raw deposit from the source token's precision to the minted
/// token's, then apply the mint multiplier. Exact power-of-ten scaling in
/// U256; None on overflow or when the target precision is narrower than the
/// source (a configuration error, not a rounding case).
pub fn compute_mint_amount(
    raw_value: U256,
    source_decimals: u8,
    target_decimals: u8,
    multiplier: u64,
) -> Option<U256> {
    let shift = target_decimals.checked_sub(source_decimals)?;
    let factor = U256::from(10u64).checked_pow(U256::from(shift))?;
    raw_value
        .checked_mul(factor)?
        .checked_mul(U256::from(multiplier))
}
