//! Chain id helpers and the `wallet_addEthereumChain` parameter table.

use alloy_chains::{Chain, NamedChain};
use alloy_primitives::ChainId;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, num::ParseIntError};

/// Parses a chain id given either as `0x` prefixed hex (the EIP-1193 representation) or as a
/// decimal string.
pub fn parse_chain_id(s: &str) -> Result<ChainId, ParseIntError> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => ChainId::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

/// Formats a chain id the way wallets expect it, `0x` prefixed lowercase hex.
pub fn chain_id_hex(chain_id: ChainId) -> String {
    format!("{chain_id:#x}")
}

/// Human readable chain name, falls back to the numeric id.
pub fn chain_name(chain_id: ChainId) -> String {
    Chain::from_id(chain_id).to_string()
}

/// Native currency of a chain, as used by [EIP-3085](https://eips.ethereum.org/EIPS/eip-3085).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Parameters of `wallet_addEthereumChain`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParameters {
    /// `0x` prefixed chain id.
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub block_explorer_urls: Vec<String>,
}

/// Chains this application can ask a wallet to add, keyed by chain id.
///
/// Serialized as a list of [`AddChainParameters`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<AddChainParameters>", into = "Vec<AddChainParameters>")]
pub struct ChainTable(BTreeMap<ChainId, AddChainParameters>);

impl From<Vec<AddChainParameters>> for ChainTable {
    fn from(chains: Vec<AddChainParameters>) -> Self {
        Self::new(chains)
    }
}

impl From<ChainTable> for Vec<AddChainParameters> {
    fn from(table: ChainTable) -> Self {
        table.0.into_values().collect()
    }
}

impl ChainTable {
    pub fn new(chains: impl IntoIterator<Item = AddChainParameters>) -> Self {
        Self(
            chains
                .into_iter()
                .filter_map(|params| {
                    let id = parse_chain_id(&params.chain_id).ok()?;
                    Some((id, params))
                })
                .collect(),
        )
    }

    /// Returns the add-chain parameters for the given chain.
    pub fn get(&self, chain_id: ChainId) -> Option<&AddChainParameters> {
        self.0.get(&chain_id)
    }

    pub fn insert(&mut self, params: AddChainParameters) -> Option<AddChainParameters> {
        let id = parse_chain_id(&params.chain_id).ok()?;
        self.0.insert(id, params)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChainId, &AddChainParameters)> {
        self.0.iter()
    }
}

impl Default for ChainTable {
    fn default() -> Self {
        Self::new([
            AddChainParameters {
                chain_id: chain_id_hex(NamedChain::Sepolia as u64),
                chain_name: "Sepolia".to_string(),
                native_currency: NativeCurrency {
                    name: "Sepolia Ether".to_string(),
                    symbol: "ETH".to_string(),
                    decimals: 18,
                },
                rpc_urls: vec!["https://rpc.sepolia.org".to_string()],
                block_explorer_urls: vec!["https://sepolia.etherscan.io".to_string()],
            },
            AddChainParameters {
                chain_id: chain_id_hex(NamedChain::PolygonAmoy as u64),
                chain_name: "Polygon Amoy".to_string(),
                native_currency: NativeCurrency {
                    name: "POL".to_string(),
                    symbol: "POL".to_string(),
                    decimals: 18,
                },
                rpc_urls: vec!["https://rpc-amoy.polygon.technology".to_string()],
                block_explorer_urls: vec!["https://amoy.polygonscan.com".to_string()],
            },
        ])
    }
}
