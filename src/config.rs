use alloy::primitives::Address;
use dotenvy::dotenv;
use eyre::{eyre, Result, WrapErr};
use std::env;

/// One tracked token contract: lower-cased address plus display metadata.
#[derive(Debug, Clone)]
pub struct TokenEntry {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_http_url: String, // public RPC: receipts + eth_call
    pub tx_rpc_url: String,   // wallet-backed RPC: transaction submission
    pub db_path: String,
    pub port: u16,
    pub service_wallet: Address,
    pub trigger_token: Address,
    pub minted_token: Address,
    pub minted_token_decimals: u8,
    pub mint_multiplier: u64,
    pub tokens: Vec<TokenEntry>,
}

// Sepolia deployment tracked by default: USDC and EURC deposits, CW-ERC20 mints.
const DEFAULT_TOKEN_REGISTRY: &str = "0x1c7d4b196cb0c7b01d743fbc6116a902379c7238:USDC:6,\
0x08210f9170f89ab7658f0b5e3ff39b0e03c594d4:EURC:6,\
0xc2c9a6d4c2699349f69de33df8ed8a90db908944:CW-ERC20:18";

const DEFAULT_TRIGGER_TOKEN: &str = "0x1c7d4b196cb0c7b01d743fbc6116a902379c7238";
const DEFAULT_MINTED_TOKEN: &str = "0xc2c9a6d4c2699349f69de33df8ed8a90db908944";

pub fn load() -> Result<Config> {
    dotenv().ok();

    let rpc_http_url = env::var("RPC_HTTP_URL")
        .or_else(|_| env::var("SEPOLIA_RPC_URL")) // alias support
        .unwrap_or_else(|_| "https://ethereum-sepolia-rpc.publicnode.com".to_string());

    // Submission may go through a dedicated wallet RPC; falls back to the public one.
    let tx_rpc_url = env::var("TX_RPC_URL").unwrap_or_else(|_| rpc_http_url.clone());

    let db_path = env::var("DATABASE_URL").unwrap_or_else(|_| "transfers.db".to_string());

    let port = env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .unwrap_or(3000);

    // The signing identity is the one value the process cannot default.
    let service_wallet = parse_address(
        &env::var("SERVICE_WALLET_ADDRESS")
            .map_err(|_| eyre!("SERVICE_WALLET_ADDRESS is not set"))?,
    )
    .wrap_err("invalid SERVICE_WALLET_ADDRESS")?;

    let trigger_token = parse_address(
        &env::var("TRIGGER_TOKEN_ADDRESS").unwrap_or_else(|_| DEFAULT_TRIGGER_TOKEN.to_string()),
    )
    .wrap_err("invalid TRIGGER_TOKEN_ADDRESS")?;

    let minted_token = parse_address(
        &env::var("MINTED_TOKEN_ADDRESS").unwrap_or_else(|_| DEFAULT_MINTED_TOKEN.to_string()),
    )
    .wrap_err("invalid MINTED_TOKEN_ADDRESS")?;

    let minted_token_decimals = env::var("MINTED_TOKEN_DECIMALS")
        .unwrap_or_else(|_| "18".to_string())
        .parse()
        .unwrap_or(18);

    let mint_multiplier = env::var("MINT_MULTIPLIER")
        .unwrap_or_else(|_| "10".to_string())
        .parse()
        .unwrap_or(10);

    let tokens = parse_token_registry(
        &env::var("TOKEN_REGISTRY").unwrap_or_else(|_| DEFAULT_TOKEN_REGISTRY.to_string()),
    );

    Ok(Config {
        rpc_http_url,
        tx_rpc_url,
        db_path,
        port,
        service_wallet,
        trigger_token,
        minted_token,
        minted_token_decimals,
        mint_multiplier,
        tokens,
    })
}

fn parse_address(s: &str) -> Result<Address> {
    s.trim()
        .to_lowercase()
        .parse::<Address>()
        .map_err(|e| eyre!("{e}"))
}

/// Parse `address:symbol:decimals` entries, comma separated. Malformed
/// entries are skipped rather than failing startup.
fn parse_token_registry(raw: &str) -> Vec<TokenEntry> {
    raw.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let mut parts = entry.split(':');
            let address = parts.next()?.trim().to_lowercase();
            let symbol = parts.next()?.trim().to_string();
            let decimals = parts.next()?.trim().parse::<u8>().ok()?;
            if address.is_empty() || symbol.is_empty() {
                return None;
            }
            Some(TokenEntry {
                address,
                symbol,
                decimals,
            })
        })
        .collect()
}
