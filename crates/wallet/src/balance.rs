//! Native balance lookup.
//!
//! Injected providers regularly fail `eth_getBalance` (rate limits, unsupported networks), so a
//! failed query is retried against a public RPC endpoint of the active chain.

use alloy_primitives::{Address, ChainId, U256};
use alloy_provider::{Provider, ProviderBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{collections::BTreeMap, time::Duration};
use url::Url;

use crate::{
    error::BalanceError,
    provider::{self, Eip1193Provider, request_as},
};

/// Built-in fallback endpoints: chain id, environment override suffix, url.
pub const DEFAULT_RPC_ENDPOINTS: &[(ChainId, &str, &str)] = &[
    (1, "MAINNET", "https://ethereum-rpc.publicnode.com"),
    (11155111, "SEPOLIA", "https://ethereum-sepolia-rpc.publicnode.com"),
    (137, "POLYGON", "https://polygon-rpc.com"),
    (80002, "POLYGON_AMOY", "https://rpc-amoy.polygon.technology"),
    (56, "BSC", "https://bsc-dataseed.binance.org"),
    (8453, "BASE", "https://mainnet.base.org"),
];

/// One fallback endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcFallback {
    pub chain_id: ChainId,
    pub url: String,
}

/// Public RPC endpoints keyed by chain id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<RpcFallback>", into = "Vec<RpcFallback>")]
pub struct RpcFallbacks(BTreeMap<ChainId, String>);

impl Default for RpcFallbacks {
    fn default() -> Self {
        Self(DEFAULT_RPC_ENDPOINTS.iter().map(|(id, _, url)| (*id, url.to_string())).collect())
    }
}

impl From<Vec<RpcFallback>> for RpcFallbacks {
    fn from(endpoints: Vec<RpcFallback>) -> Self {
        Self(endpoints.into_iter().map(|e| (e.chain_id, e.url)).collect())
    }
}

impl From<RpcFallbacks> for Vec<RpcFallback> {
    fn from(fallbacks: RpcFallbacks) -> Self {
        fallbacks.0.into_iter().map(|(chain_id, url)| RpcFallback { chain_id, url }).collect()
    }
}

impl RpcFallbacks {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, chain_id: ChainId) -> Option<&str> {
        self.0.get(&chain_id).map(String::as_str)
    }

    pub fn set(&mut self, chain_id: ChainId, url: impl Into<String>) {
        self.0.insert(chain_id, url.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChainId, &str)> {
        self.0.iter().map(|(id, url)| (*id, url.as_str()))
    }

    /// Applies `FORESIGHT_RPC_<CHAIN>` overrides, e.g. `FORESIGHT_RPC_SEPOLIA`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (chain_id, suffix, _) in DEFAULT_RPC_ENDPOINTS {
            let name = format!("{}RPC_{suffix}", crate::config::ENV_PREFIX);
            if let Some(url) = lookup(&name).filter(|url| !url.trim().is_empty()) {
                debug!(chain_id, %url, "fallback rpc overridden by {name}");
                self.0.insert(*chain_id, url);
            }
        }
    }
}

/// Formats a wei amount as a fixed-point ether string.
///
/// Four decimals from 0.0001 upwards, six below so dust balances stay visibly non-zero.
pub fn format_balance(wei: U256) -> String {
    let threshold = U256::from(10u64).pow(U256::from(14));
    let decimals = if wei >= threshold { 4 } else { 6 };
    format_fixed(wei, 18, decimals)
}

/// Rounds `value / 10^unit_decimals` half-up to `decimals` places.
fn format_fixed(value: U256, unit_decimals: u32, decimals: u32) -> String {
    let scale = U256::from(10u64).pow(U256::from(unit_decimals - decimals));
    let half = scale / U256::from(2u64);
    let scaled = (value + half) / scale;
    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let int = scaled / divisor;
    let frac = scaled % divisor;
    let frac = frac.to_string();
    format!("{int}.{frac:0>width$}", width = decimals as usize)
}

/// Default timeout of a fallback RPC request.
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(15);

/// Fetches native balances through the wallet, falling back to public RPC endpoints.
#[derive(Clone, Debug)]
pub struct BalanceOracle {
    fallbacks: RpcFallbacks,
    timeout: Duration,
}

impl Default for BalanceOracle {
    fn default() -> Self {
        Self::new(RpcFallbacks::default())
    }
}

impl BalanceOracle {
    pub fn new(fallbacks: RpcFallbacks) -> Self {
        Self { fallbacks, timeout: DEFAULT_FALLBACK_TIMEOUT }
    }

    /// Bounds the fallback RPC request, a stalled public node must not leave the query pending.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn fallbacks(&self) -> &RpcFallbacks {
        &self.fallbacks
    }

    /// Returns the balance of `address` in wei.
    ///
    /// `last_known_chain` is used when the wallet cannot even report its chain id.
    pub async fn balance_of(
        &self,
        wallet: &dyn Eip1193Provider,
        address: Address,
        last_known_chain: Option<ChainId>,
    ) -> Result<U256, BalanceError> {
        let primary: Result<U256, _> =
            request_as(wallet, "eth_getBalance", json!([address, "latest"])).await;
        let err = match primary {
            Ok(balance) => return Ok(balance),
            Err(err) => err,
        };
        debug!(%address, %err, "wallet balance query failed, trying public rpc");

        let chain_id = match provider::chain_id(wallet).await {
            Ok(Some(chain_id)) => Some(chain_id),
            _ => last_known_chain,
        };
        let url = chain_id
            .and_then(|chain_id| self.fallbacks.get(chain_id))
            .ok_or(BalanceError::NoFallback { chain_id })?;
        let url = Url::parse(url)?;

        let rpc = ProviderBuilder::new().connect_http(url);
        let balance = tokio::time::timeout(self.timeout, rpc.get_balance(address))
            .await
            .map_err(|_| BalanceError::Timeout { timeout: self.timeout })??;
        Ok(balance)
    }

    /// Same as [`balance_of`](Self::balance_of), formatted with [`format_balance`].
    pub async fn get_balance(
        &self,
        wallet: &dyn Eip1193Provider,
        address: Address,
        last_known_chain: Option<ChainId>,
    ) -> Result<String, BalanceError> {
        self.balance_of(wallet, address, last_known_chain).await.map(format_balance)
    }
}
