use crate::config::TokenEntry;
use std::collections::HashMap;

/// Symbol and decimal precision of a tracked token contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub symbol: String,
    pub decimals: u8,
}

/// Static contract-address → token metadata map, built once at startup.
///
/// Lookups are case-insensitive; addresses absent from the registry are
/// simply unknown, which is the common case for unrelated events.
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    tokens: HashMap<String, TokenInfo>,
}

impl TokenRegistry {
    pub fn from_entries(entries: &[TokenEntry]) -> Self {
        let tokens = entries
            .iter()
            .map(|e| {
                (
                    e.address.to_lowercase(),
                    TokenInfo {
                        symbol: e.symbol.clone(),
                        decimals: e.decimals,
                    },
                )
            })
            .collect();
        Self { tokens }
    }

    pub fn resolve(&self, address: &str) -> Option<&TokenInfo> {
        self.tokens.get(&address.to_lowercase())
    }
}
